use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::tuner::backend::{CaptureSource, DeviceBackend, Demux, Frontend};
use crate::tuner::property::{PesFilter, Property};
use crate::types::{FrontendInfo, FrontendStatus};

const UNSUPPORTED_MSG: &str = "DVB device access is not supported on this platform (supported: Linux)";

fn unsupported() -> io::Error {
    io::Error::new(ErrorKind::Unsupported, UNSUPPORTED_MSG)
}

/// Backend for platforms without a DVB API. Every open fails.
#[derive(Debug, Clone, Default)]
pub struct UnsupportedBackend;

/// Never constructed.
pub enum NoDevice {}

impl DeviceBackend for UnsupportedBackend {
    type Frontend = NoDevice;
    type Demux = NoDevice;
    type Capture = NoDevice;

    fn adapter_root(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("/dev/dvb/adapter{}", index))
    }

    fn open_frontend(&self, _path: &Path) -> io::Result<NoDevice> {
        Err(unsupported())
    }

    fn open_demux(&self, _path: &Path) -> io::Result<NoDevice> {
        Err(unsupported())
    }

    fn open_capture(&self, _path: &Path) -> io::Result<NoDevice> {
        Err(unsupported())
    }
}

impl Frontend for NoDevice {
    fn info(&self) -> io::Result<FrontendInfo> {
        match *self {}
    }

    fn set_properties(&mut self, _props: &[Property]) -> io::Result<()> {
        match *self {}
    }

    fn read_status(&self) -> io::Result<FrontendStatus> {
        match *self {}
    }

    fn read_signal_strength(&self) -> io::Result<u16> {
        match *self {}
    }

    fn read_snr(&self) -> io::Result<u16> {
        match *self {}
    }
}

impl Demux for NoDevice {
    fn set_pes_filter(&mut self, _filter: &PesFilter) -> io::Result<()> {
        match *self {}
    }
}

impl CaptureSource for NoDevice {
    fn read_chunk(&self, _buf: &mut [u8]) -> io::Result<usize> {
        match *self {}
    }

    fn wait_readable(&self) -> io::Result<()> {
        match *self {}
    }
}
