//! DVB v5 property vocabulary used to configure an ISDB-T frontend.

use crate::types::{LayerConfig, LayerMask, SegmentCount, ISDBT_BANDWIDTH_HZ};

// linux/dvb/frontend.h
pub const DTV_TUNE: u32 = 1;
pub const DTV_CLEAR: u32 = 2;
pub const DTV_FREQUENCY: u32 = 3;
pub const DTV_BANDWIDTH_HZ: u32 = 5;
pub const DTV_INVERSION: u32 = 6;
pub const DTV_DELIVERY_SYSTEM: u32 = 17;
pub const DTV_ISDBT_PARTIAL_RECEPTION: u32 = 18;
pub const DTV_ISDBT_LAYERA_SEGMENT_COUNT: u32 = 25;
pub const DTV_ISDBT_LAYER_ENABLED: u32 = 41;

/// `SYS_ISDBT` in `enum fe_delivery_system`.
pub const SYS_ISDBT: u32 = 8;

// linux/dvb/dmx.h
pub const DMX_PID_ALL: u16 = 0x2000;
pub const DMX_IN_FRONTEND: u32 = 0;
pub const DMX_OUT_TS_TAP: u32 = 2;
pub const DMX_PES_OTHER: u32 = 20;
pub const DMX_IMMEDIATE_START: u32 = 4;

/// Spectral inversion mode (`enum fe_spectral_inversion`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inversion {
    Off,
    Auto,
}

impl Inversion {
    pub fn raw(self) -> u32 {
        match self {
            Inversion::Off => 0,
            Inversion::Auto => 2,
        }
    }
}

/// One entry of a property transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Clear,
    DeliverySystem(u32),
    Frequency(u32),
    PartialReception(bool),
    LayerASegmentCount(SegmentCount),
    EnabledLayers(LayerMask),
    Bandwidth(u32),
    Inversion(Inversion),
    Tune,
}

impl Property {
    pub fn cmd(&self) -> u32 {
        match self {
            Property::Clear => DTV_CLEAR,
            Property::DeliverySystem(_) => DTV_DELIVERY_SYSTEM,
            Property::Frequency(_) => DTV_FREQUENCY,
            Property::PartialReception(_) => DTV_ISDBT_PARTIAL_RECEPTION,
            Property::LayerASegmentCount(_) => DTV_ISDBT_LAYERA_SEGMENT_COUNT,
            Property::EnabledLayers(_) => DTV_ISDBT_LAYER_ENABLED,
            Property::Bandwidth(_) => DTV_BANDWIDTH_HZ,
            Property::Inversion(_) => DTV_INVERSION,
            Property::Tune => DTV_TUNE,
        }
    }

    pub fn data(&self) -> u32 {
        match *self {
            Property::Clear | Property::Tune => 0,
            Property::DeliverySystem(sys) => sys,
            Property::Frequency(hz) => hz,
            Property::PartialReception(on) => on as u32,
            Property::LayerASegmentCount(count) => count.raw(),
            Property::EnabledLayers(mask) => mask.bits(),
            Property::Bandwidth(hz) => hz,
            Property::Inversion(inv) => inv.raw(),
        }
    }
}

/// Ordered transaction that configures and commits an ISDB-T tune.
///
/// The layer-A segment count is only sent when partial reception is requested.
pub fn tune_transaction(frequency_hz: u32, layers: &LayerConfig, inversion: Inversion) -> Vec<Property> {
    let mut props = Vec::with_capacity(9);
    props.push(Property::Clear);
    props.push(Property::DeliverySystem(SYS_ISDBT));
    props.push(Property::Frequency(frequency_hz));
    props.push(Property::PartialReception(layers.partial_reception));
    if layers.partial_reception {
        props.push(Property::LayerASegmentCount(layers.segment_count));
    }
    props.push(Property::EnabledLayers(layers.enabled_layers));
    props.push(Property::Bandwidth(ISDBT_BANDWIDTH_HZ));
    props.push(Property::Inversion(inversion));
    props.push(Property::Tune);
    props
}

/// Transaction that resets the frontend configuration.
pub fn clear_transaction() -> [Property; 1] {
    [Property::Clear]
}

/// Demux filter parameters (`struct dmx_pes_filter_params`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesFilter {
    pub pid: u16,
    pub input: u32,
    pub output: u32,
    pub pes_type: u32,
    pub flags: u32,
}

impl PesFilter {
    /// Forward every PID from the frontend to the dvr tap, starting immediately.
    pub fn full_transport_stream() -> Self {
        Self {
            pid: DMX_PID_ALL,
            input: DMX_IN_FRONTEND,
            output: DMX_OUT_TS_TAP,
            pes_type: DMX_PES_OTHER,
            flags: DMX_IMMEDIATE_START,
        }
    }
}
