//! Shared types for channel requests, layer configuration and frontend state.

use std::fmt;
use std::path::PathBuf;

/// Fixed ISDB-T channel bandwidth.
pub const ISDBT_BANDWIDTH_HZ: u32 = 6_000_000;

/// Which hierarchical transmission layers are demodulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReceptionMode {
    /// All layers (A+B+C).
    #[default]
    Full,
    /// Layer A only (one-segment partial reception).
    LayerA,
    /// Layer B only.
    LayerB,
    /// Layer C only.
    LayerC,
}

impl fmt::Display for ReceptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReceptionMode::Full => "full",
            ReceptionMode::LayerA => "A",
            ReceptionMode::LayerB => "B",
            ReceptionMode::LayerC => "C",
        };
        f.write_str(s)
    }
}

/// Bit mask of enabled ISDB-T layers as understood by `DTV_ISDBT_LAYER_ENABLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const A: LayerMask = LayerMask(0x1);
    pub const B: LayerMask = LayerMask(0x2);
    pub const C: LayerMask = LayerMask(0x4);
    pub const ALL: LayerMask = LayerMask(0x7);

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Layer-A segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentCount {
    /// Let the demodulator detect it (encoded as -1).
    Auto,
    Fixed(u32),
}

impl SegmentCount {
    /// Raw property value; AUTO is -1 reinterpreted as u32.
    pub fn raw(self) -> u32 {
        match self {
            SegmentCount::Auto => u32::MAX,
            SegmentCount::Fixed(n) => n,
        }
    }
}

/// Layer parameters derived from a [`ReceptionMode`]. Never built directly by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerConfig {
    pub enabled_layers: LayerMask,
    pub partial_reception: bool,
    pub segment_count: SegmentCount,
}

impl From<ReceptionMode> for LayerConfig {
    fn from(mode: ReceptionMode) -> Self {
        match mode {
            ReceptionMode::Full => LayerConfig {
                enabled_layers: LayerMask::ALL,
                partial_reception: true,
                segment_count: SegmentCount::Auto,
            },
            ReceptionMode::LayerA => LayerConfig {
                enabled_layers: LayerMask::A,
                partial_reception: true,
                segment_count: SegmentCount::Fixed(1),
            },
            ReceptionMode::LayerB => LayerConfig {
                enabled_layers: LayerMask::B,
                partial_reception: false,
                segment_count: SegmentCount::Auto,
            },
            ReceptionMode::LayerC => LayerConfig {
                enabled_layers: LayerMask::C,
                partial_reception: false,
                segment_count: SegmentCount::Auto,
            },
        }
    }
}

/// A channel to tune. Immutable once handed to the tuner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub frequency_hz: u64,
    pub reception_mode: ReceptionMode,
    /// Explicit device root such as `/dev/dvb/adapter1`; discovery is used when absent.
    pub device_path: Option<PathBuf>,
}

impl ChannelRequest {
    pub fn new(frequency_hz: u64, reception_mode: ReceptionMode) -> Self {
        Self {
            frequency_hz,
            reception_mode,
            device_path: None,
        }
    }

    pub fn with_device(mut self, device_path: impl Into<PathBuf>) -> Self {
        self.device_path = Some(device_path.into());
        self
    }

    pub fn layer_config(&self) -> LayerConfig {
        LayerConfig::from(self.reception_mode)
    }
}

/// Frontend family reported by `FE_GET_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendType {
    /// Satellite (DVB-S / ISDB-S).
    Qpsk,
    /// Cable.
    Qam,
    /// Terrestrial (DVB-T / ISDB-T).
    Ofdm,
    Atsc,
    Unknown(u32),
}

impl From<u32> for FrontendType {
    fn from(raw: u32) -> Self {
        match raw {
            0 => FrontendType::Qpsk,
            1 => FrontendType::Qam,
            2 => FrontendType::Ofdm,
            3 => FrontendType::Atsc,
            other => FrontendType::Unknown(other),
        }
    }
}

impl FrontendType {
    pub fn is_terrestrial(self) -> bool {
        self == FrontendType::Ofdm
    }
}

impl fmt::Display for FrontendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontendType::Qpsk => f.write_str("QPSK"),
            FrontendType::Qam => f.write_str("QAM"),
            FrontendType::Ofdm => f.write_str("OFDM"),
            FrontendType::Atsc => f.write_str("ATSC"),
            FrontendType::Unknown(raw) => write!(f, "unknown({})", raw),
        }
    }
}

/// Capability bit: the frontend can detect spectral inversion itself.
pub const FE_CAN_INVERSION_AUTO: u32 = 0x1;

/// Subset of `struct dvb_frontend_info` the tuner cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendInfo {
    pub name: String,
    pub fe_type: FrontendType,
    pub caps: u32,
}

impl FrontendInfo {
    pub fn can_auto_invert(&self) -> bool {
        self.caps & FE_CAN_INVERSION_AUTO != 0
    }
}

/// Frontend status bits (`fe_status_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontendStatus(pub u32);

impl FrontendStatus {
    pub const HAS_SIGNAL: u32 = 0x01;
    pub const HAS_CARRIER: u32 = 0x02;
    pub const HAS_VITERBI: u32 = 0x04;
    pub const HAS_SYNC: u32 = 0x08;
    pub const HAS_LOCK: u32 = 0x10;

    pub fn has_signal(self) -> bool {
        self.0 & Self::HAS_SIGNAL != 0
    }

    pub fn has_lock(self) -> bool {
        self.0 & Self::HAS_LOCK != 0
    }
}

/// The three endpoints under one device root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Frontend,
    Demux,
    Capture,
}

impl Endpoint {
    /// Node name under the adapter root.
    pub fn node_name(self) -> &'static str {
        match self {
            Endpoint::Frontend => "frontend0",
            Endpoint::Demux => "demux0",
            Endpoint::Capture => "dvr0",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Frontend => f.write_str("frontend"),
            Endpoint::Demux => f.write_str("demux"),
            Endpoint::Capture => f.write_str("dvr"),
        }
    }
}

/// One adapter found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub index: u32,
    pub name: String,
    pub root: PathBuf,
}

/// Rescale a raw 16-bit driver metric to 0..=100.
pub fn normalize_metric(raw: u16) -> u8 {
    (u32::from(raw) * 100 / 65535) as u8
}
