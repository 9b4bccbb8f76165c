//! The hardware seam between [`TunerResource`](super::TunerResource) and a device driver.

use std::io;
use std::path::{Path, PathBuf};

use crate::tuner::property::{PesFilter, Property};
use crate::types::{FrontendInfo, FrontendStatus};

/// Opens the endpoints of a DVB adapter.
pub trait DeviceBackend {
    type Frontend: Frontend;
    type Demux: Demux;
    type Capture: CaptureSource;

    /// Root of the adapter with the given index, e.g. `/dev/dvb/adapter0`.
    fn adapter_root(&self, index: u32) -> PathBuf;

    fn open_frontend(&self, path: &Path) -> io::Result<Self::Frontend>;

    fn open_demux(&self, path: &Path) -> io::Result<Self::Demux>;

    /// Opens the data-capture endpoint in non-blocking mode.
    fn open_capture(&self, path: &Path) -> io::Result<Self::Capture>;
}

/// Demodulator control.
pub trait Frontend: Send {
    fn info(&self) -> io::Result<FrontendInfo>;

    /// Applies the properties as one batched transaction.
    fn set_properties(&mut self, props: &[Property]) -> io::Result<()>;

    fn read_status(&self) -> io::Result<FrontendStatus>;

    /// Raw signal strength in the driver's 0..=65535 range.
    fn read_signal_strength(&self) -> io::Result<u16>;

    /// Raw signal-to-noise ratio in the driver's 0..=65535 range.
    fn read_snr(&self) -> io::Result<u16>;
}

/// PID filter control.
pub trait Demux: Send {
    fn set_pes_filter(&mut self, filter: &PesFilter) -> io::Result<()>;
}

/// Readable transport-stream endpoint shared with the capture producer.
pub trait CaptureSource: Send + Sync {
    /// Non-blocking read. `Ok(0)` or `ErrorKind::WouldBlock` mean no data yet.
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Blocks until the endpoint is readable. No timeout.
    fn wait_readable(&self) -> io::Result<()>;
}

impl<T: CaptureSource + ?Sized> CaptureSource for std::sync::Arc<T> {
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_chunk(buf)
    }

    fn wait_readable(&self) -> io::Result<()> {
        (**self).wait_readable()
    }
}
