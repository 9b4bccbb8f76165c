//! External player fed through a named pipe.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use log::{debug, info, warn};

/// A spawned player and the FIFO it reads from.
pub(crate) struct Player {
    child: Child,
    fifo: PathBuf,
}

impl Player {
    /// Recreates the FIFO and runs `sh -c "<command> <fifo>"` in the background.
    pub(crate) fn spawn(command: &str, fifo: &Path) -> io::Result<Self> {
        create_fifo(fifo)?;
        let cmdline = format!("{} {}", command, fifo.display());
        info!("[Player] Running: {}", cmdline);
        let child = Command::new("sh").arg("-c").arg(&cmdline).spawn()?;
        Ok(Self {
            child,
            fifo: fifo.to_path_buf(),
        })
    }

    /// Opens the FIFO for writing. Blocks until the player opens it for reading.
    pub(crate) fn open_writer(&self) -> io::Result<File> {
        info!("[Player] Waiting for the player to open {}", self.fifo.display());
        let file = OpenOptions::new().write(true).open(&self.fifo)?;
        info!("[Player] FIFO {} opened", self.fifo.display());
        Ok(file)
    }

    /// Removes the FIFO. The player keeps running until it sees end of stream.
    pub(crate) fn finish(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!("[Player] Exited with {}", status),
            Ok(None) => debug!("[Player] Still running (pid {})", self.child.id()),
            Err(e) => warn!("[Player] Could not query player status: {}", e),
        }
        if let Err(e) = fs::remove_file(&self.fifo) {
            debug!("[Player] Removing {}: {}", self.fifo.display(), e);
        }
    }
}

/// Replaces whatever is at `path` with a fresh FIFO.
#[cfg(unix)]
pub(crate) fn create_fifo(path: &Path) -> io::Result<()> {
    use nix::sys::stat::Mode;

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    nix::unistd::mkfifo(path, Mode::S_IRWXU | Mode::S_IRWXG | Mode::S_IRWXO)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn create_fifo(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes are not supported on this platform",
    ))
}
