//! In-memory backend used by the unit tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::tuner::backend::{CaptureSource, DeviceBackend, Demux, Frontend};
use crate::tuner::property::{PesFilter, Property};
use crate::types::{FrontendInfo, FrontendStatus, FrontendType};

const ENOENT: i32 = 2;
const EIO: i32 = 5;
const EINVAL: i32 = 22;

#[derive(Debug, Clone)]
pub(crate) struct MockAdapter {
    pub name: String,
    pub fe_type: FrontendType,
    pub caps: u32,
}

impl MockAdapter {
    pub fn new(name: &str, fe_type: FrontendType) -> Self {
        Self {
            name: name.to_string(),
            fe_type,
            caps: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub adapters: Vec<MockAdapter>,
    /// Every frontend path `open_frontend` was called with.
    pub opened: Vec<PathBuf>,
    /// Handles currently alive.
    pub open_handles: i32,
    pub transactions: Vec<Vec<Property>>,
    pub set_property_calls: u32,
    pub pes_filters: Vec<PesFilter>,
    pub status_calls: u32,
    /// Status reads before lock is reported; `None` never locks.
    pub lock_after: Option<u32>,
    pub strength: u16,
    pub snr: u16,
    pub fail_demux_filter: bool,
    pub fail_capture_open: bool,
    pub fail_set_properties: bool,
    pub fail_status: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new(adapters: Vec<MockAdapter>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                adapters,
                ..MockState::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }
}

fn adapter_index(path: &Path) -> Option<usize> {
    path.parent()?
        .file_name()?
        .to_str()?
        .strip_prefix("adapter")?
        .parse()
        .ok()
}

impl DeviceBackend for MockBackend {
    type Frontend = MockFrontend;
    type Demux = MockDemux;
    type Capture = MockCapture;

    fn adapter_root(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("/mock/adapter{}", index))
    }

    fn open_frontend(&self, path: &Path) -> io::Result<MockFrontend> {
        let mut state = self.state();
        state.opened.push(path.to_path_buf());
        let index = adapter_index(path)
            .filter(|i| *i < state.adapters.len())
            .ok_or_else(|| io::Error::from_raw_os_error(ENOENT))?;
        state.open_handles += 1;
        Ok(MockFrontend {
            state: Arc::clone(&self.inner),
            adapter: state.adapters[index].clone(),
        })
    }

    fn open_demux(&self, _path: &Path) -> io::Result<MockDemux> {
        self.state().open_handles += 1;
        Ok(MockDemux {
            state: Arc::clone(&self.inner),
        })
    }

    fn open_capture(&self, _path: &Path) -> io::Result<MockCapture> {
        let mut state = self.state();
        if state.fail_capture_open {
            return Err(io::Error::from_raw_os_error(ENOENT));
        }
        state.open_handles += 1;
        Ok(MockCapture {
            state: Arc::clone(&self.inner),
        })
    }
}

pub(crate) struct MockFrontend {
    state: Arc<Mutex<MockState>>,
    adapter: MockAdapter,
}

impl Frontend for MockFrontend {
    fn info(&self) -> io::Result<FrontendInfo> {
        Ok(FrontendInfo {
            name: self.adapter.name.clone(),
            fe_type: self.adapter.fe_type,
            caps: self.adapter.caps,
        })
    }

    fn set_properties(&mut self, props: &[Property]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.set_property_calls += 1;
        if state.fail_set_properties {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        state.transactions.push(props.to_vec());
        Ok(())
    }

    fn read_status(&self) -> io::Result<FrontendStatus> {
        let mut state = self.state.lock().unwrap();
        if state.fail_status {
            return Err(io::Error::from_raw_os_error(EIO));
        }
        let call = state.status_calls;
        state.status_calls += 1;
        match state.lock_after {
            Some(n) if call >= n => Ok(FrontendStatus(
                FrontendStatus::HAS_SIGNAL | FrontendStatus::HAS_CARRIER | FrontendStatus::HAS_LOCK,
            )),
            _ => Ok(FrontendStatus(FrontendStatus::HAS_SIGNAL)),
        }
    }

    fn read_signal_strength(&self) -> io::Result<u16> {
        Ok(self.state.lock().unwrap().strength)
    }

    fn read_snr(&self) -> io::Result<u16> {
        Ok(self.state.lock().unwrap().snr)
    }
}

impl Drop for MockFrontend {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}

pub(crate) struct MockDemux {
    state: Arc<Mutex<MockState>>,
}

impl Demux for MockDemux {
    fn set_pes_filter(&mut self, filter: &PesFilter) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_demux_filter {
            return Err(io::Error::from_raw_os_error(EINVAL));
        }
        state.pes_filters.push(*filter);
        Ok(())
    }
}

impl Drop for MockDemux {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}

pub(crate) struct MockCapture {
    state: Arc<Mutex<MockState>>,
}

impl CaptureSource for MockCapture {
    fn read_chunk(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn wait_readable(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        self.state.lock().unwrap().open_handles -= 1;
    }
}
