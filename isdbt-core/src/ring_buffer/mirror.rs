//! One `memfd` region mapped twice, back to back.

use std::ffi::{c_void, CStr};
use std::io;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use log::{debug, warn};
use nix::sys::memfd::{memfd_create, MemFdCreateFlag};
use nix::sys::mman::{mmap, mmap_anonymous, munmap, MapFlags, ProtFlags};
use nix::unistd::ftruncate;

const MEMFD_NAME: &CStr = c"isdbt-ring";

pub(super) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// `2 * capacity` bytes of address space where `[capacity, 2 * capacity)`
/// aliases `[0, capacity)`.
pub(super) struct MirrorMap {
    base: NonNull<u8>,
    capacity: usize,
}

// The mapping is plain shared memory owned by this value; access is
// serialized through `&mut` on the owning buffer.
unsafe impl Send for MirrorMap {}
unsafe impl Sync for MirrorMap {}

impl MirrorMap {
    /// `capacity` must be a non-zero multiple of the page size.
    pub(super) fn new(capacity: usize) -> io::Result<Self> {
        let len = NonZeroUsize::new(capacity)
            .filter(|_| capacity % page_size() == 0)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        let total = capacity
            .checked_mul(2)
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        let file_len = libc::off_t::try_from(capacity)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        let fd = memfd_create(MEMFD_NAME, MemFdCreateFlag::MFD_CLOEXEC)?;
        ftruncate(&fd, file_len)?;

        // Reserve the whole window first so both halves land contiguously.
        let reservation = unsafe {
            mmap_anonymous(None, total, ProtFlags::PROT_NONE, MapFlags::MAP_PRIVATE)
        }?;
        let base = reservation.cast::<u8>();

        let map_half = |offset: usize| -> io::Result<()> {
            let addr = NonZeroUsize::new(base.as_ptr() as usize + offset)
                .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
            unsafe {
                mmap(
                    Some(addr),
                    len,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED | MapFlags::MAP_FIXED,
                    &fd,
                    0,
                )
            }?;
            Ok(())
        };

        if let Err(e) = map_half(0).and_then(|_| map_half(capacity)) {
            if let Err(unmap) = unsafe { munmap(reservation, total.get()) } {
                warn!("[RingBuffer] munmap after failed mirror setup: {}", unmap);
            }
            return Err(e);
        }

        // The mappings keep the memory alive; the descriptor can go.
        drop(fd);
        debug!(
            "[RingBuffer] Mirrored {} bytes at {:p}",
            capacity,
            base.as_ptr()
        );
        Ok(Self { base, capacity })
    }

    pub(super) fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

impl Drop for MirrorMap {
    fn drop(&mut self) {
        let addr = self.base.cast::<c_void>();
        if let Err(e) = unsafe { munmap(addr, self.capacity * 2) } {
            warn!("[RingBuffer] munmap failed: {}", e);
        }
    }
}
