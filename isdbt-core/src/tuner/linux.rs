//! Linux DVB v5 backend (`/dev/dvb/adapterN/{frontend0,demux0,dvr0}`).

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::mem::size_of;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::tuner::backend::{CaptureSource, DeviceBackend, Demux, Frontend};
use crate::tuner::property::{PesFilter, Property};
use crate::types::{FrontendInfo, FrontendStatus, FrontendType};

/// `struct dvb_frontend_info`
#[repr(C)]
struct DvbFrontendInfo {
    name: [u8; 128],
    fe_type: u32,
    frequency_min: u32,
    frequency_max: u32,
    frequency_stepsize: u32,
    frequency_tolerance: u32,
    symbol_rate_min: u32,
    symbol_rate_max: u32,
    symbol_rate_tolerance: u32,
    notifier_delay: u32,
    caps: u32,
}

impl DvbFrontendInfo {
    fn zeroed() -> Self {
        Self {
            name: [0; 128],
            fe_type: 0,
            frequency_min: 0,
            frequency_max: 0,
            frequency_stepsize: 0,
            frequency_tolerance: 0,
            symbol_rate_min: 0,
            symbol_rate_max: 0,
            symbol_rate_tolerance: 0,
            notifier_delay: 0,
            caps: 0,
        }
    }

    fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Size of the `u` union in `struct dtv_property` (largest member is `buffer`).
const DTV_PROPERTY_UNION_SIZE: usize = 48 + size_of::<usize>();

#[repr(C)]
#[derive(Clone, Copy)]
union DtvPropertyValue {
    data: u32,
    buffer: [u8; DTV_PROPERTY_UNION_SIZE],
}

/// `struct dtv_property` (packed in the kernel header).
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct DtvProperty {
    cmd: u32,
    reserved: [u32; 3],
    u: DtvPropertyValue,
    result: i32,
}

const _: () = assert!(size_of::<DtvProperty>() == 20 + DTV_PROPERTY_UNION_SIZE);

impl From<&Property> for DtvProperty {
    fn from(p: &Property) -> Self {
        let mut u = DtvPropertyValue {
            buffer: [0; DTV_PROPERTY_UNION_SIZE],
        };
        u.data = p.data();
        DtvProperty {
            cmd: p.cmd(),
            reserved: [0; 3],
            u,
            result: 0,
        }
    }
}

/// `struct dtv_properties`
#[repr(C)]
struct DtvProperties {
    num: u32,
    props: *mut DtvProperty,
}

/// `struct dmx_pes_filter_params`
#[repr(C)]
struct DmxPesFilterParams {
    pid: u16,
    input: u32,
    output: u32,
    pes_type: u32,
    flags: u32,
}

mod ioctl {
    use super::{DmxPesFilterParams, DtvProperties, DvbFrontendInfo};

    nix::ioctl_read!(fe_get_info, b'o', 61, DvbFrontendInfo);
    nix::ioctl_read!(fe_read_status, b'o', 69, u32);
    nix::ioctl_read!(fe_read_signal_strength, b'o', 71, u16);
    nix::ioctl_read!(fe_read_snr, b'o', 72, u16);
    nix::ioctl_write_ptr!(fe_set_property, b'o', 82, DtvProperties);
    nix::ioctl_write_ptr!(dmx_set_pes_filter, b'o', 44, DmxPesFilterParams);
}

/// Opens DVB character devices under a device directory (default `/dev/dvb`).
#[derive(Debug, Clone)]
pub struct LinuxBackend {
    dev_root: PathBuf,
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self::with_dev_root("/dev/dvb")
    }

    pub fn with_dev_root(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
        }
    }
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for LinuxBackend {
    type Frontend = LinuxFrontend;
    type Demux = LinuxDemux;
    type Capture = LinuxCapture;

    fn adapter_root(&self, index: u32) -> PathBuf {
        self.dev_root.join(format!("adapter{}", index))
    }

    fn open_frontend(&self, path: &Path) -> io::Result<LinuxFrontend> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(LinuxFrontend { file })
    }

    fn open_demux(&self, path: &Path) -> io::Result<LinuxDemux> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(LinuxDemux { file })
    }

    fn open_capture(&self, path: &Path) -> io::Result<LinuxCapture> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        Ok(LinuxCapture { file })
    }
}

pub struct LinuxFrontend {
    file: File,
}

impl Frontend for LinuxFrontend {
    fn info(&self) -> io::Result<FrontendInfo> {
        let mut raw = DvbFrontendInfo::zeroed();
        unsafe { ioctl::fe_get_info(self.file.as_raw_fd(), &mut raw) }?;
        Ok(FrontendInfo {
            name: raw.name(),
            fe_type: FrontendType::from(raw.fe_type),
            caps: raw.caps,
        })
    }

    fn set_properties(&mut self, props: &[Property]) -> io::Result<()> {
        let mut raw: Vec<DtvProperty> = props.iter().map(DtvProperty::from).collect();
        let cmdseq = DtvProperties {
            num: raw.len() as u32,
            props: raw.as_mut_ptr(),
        };
        unsafe { ioctl::fe_set_property(self.file.as_raw_fd(), &cmdseq) }?;
        Ok(())
    }

    fn read_status(&self) -> io::Result<FrontendStatus> {
        let mut status: u32 = 0;
        unsafe { ioctl::fe_read_status(self.file.as_raw_fd(), &mut status) }?;
        Ok(FrontendStatus(status))
    }

    fn read_signal_strength(&self) -> io::Result<u16> {
        let mut strength: u16 = 0;
        unsafe { ioctl::fe_read_signal_strength(self.file.as_raw_fd(), &mut strength) }?;
        Ok(strength)
    }

    fn read_snr(&self) -> io::Result<u16> {
        let mut snr: u16 = 0;
        unsafe { ioctl::fe_read_snr(self.file.as_raw_fd(), &mut snr) }?;
        Ok(snr)
    }
}

pub struct LinuxDemux {
    file: File,
}

impl Demux for LinuxDemux {
    fn set_pes_filter(&mut self, filter: &PesFilter) -> io::Result<()> {
        let params = DmxPesFilterParams {
            pid: filter.pid,
            input: filter.input,
            output: filter.output,
            pes_type: filter.pes_type,
            flags: filter.flags,
        };
        unsafe { ioctl::dmx_set_pes_filter(self.file.as_raw_fd(), &params) }?;
        Ok(())
    }
}

/// The dvr endpoint, opened `O_NONBLOCK`.
pub struct LinuxCapture {
    file: File,
}

impl CaptureSource for LinuxCapture {
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn wait_readable(&self) -> io::Result<()> {
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
