//! Tuner resource management.
//!
//! [`TunerResource`] owns the frontend, demux and dvr handles of one DVB
//! adapter. It is driven through `open -> tune -> (poll) -> close`; the
//! three handles are held together or not at all.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{LastError, TunerError};
use crate::pipeline::SignalMonitor;
use crate::types::{
    normalize_metric, AdapterInfo, ChannelRequest, Endpoint, FrontendInfo,
};

pub use self::backend::{CaptureSource, DeviceBackend, Demux, Frontend};
pub use self::lock::{wait_for_lock, LockOutcome, LockPolicy};
pub use self::property::{Inversion, PesFilter, Property};

#[cfg(target_os = "linux")]
pub use self::linux::{LinuxBackend as PlatformBackend, LinuxBackend, LinuxCapture, LinuxDemux, LinuxFrontend};
#[cfg(not(target_os = "linux"))]
pub use self::unsupported::UnsupportedBackend as PlatformBackend;

pub mod backend;
pub mod lock;
pub mod property;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

#[cfg(test)]
pub(crate) mod mock;

/// Upper bound on adapter indices probed during discovery.
const MAX_ADAPTERS: u32 = 64;

struct Handles<B: DeviceBackend> {
    root: PathBuf,
    info: FrontendInfo,
    frontend: B::Frontend,
    demux: B::Demux,
    capture: Arc<B::Capture>,
}

/// Owns the three hardware handles of one adapter.
pub struct TunerResource<B: DeviceBackend> {
    backend: B,
    handles: Option<Handles<B>>,
    last_error: Option<LastError>,
}

impl<B: DeviceBackend> TunerResource<B> {
    /// Creates an empty (unset) resource.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handles: None,
            last_error: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handles.is_some()
    }

    /// Last failure observed on this resource, cleared on success.
    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    /// Root of the bound adapter, e.g. `/dev/dvb/adapter1`.
    pub fn device_root(&self) -> Option<&Path> {
        self.handles.as_ref().map(|h| h.root.as_path())
    }

    pub fn frontend_info(&self) -> Option<&FrontendInfo> {
        self.handles.as_ref().map(|h| &h.info)
    }

    /// Shared handle to the data-capture endpoint for the pipeline producer.
    pub fn capture_source(&self) -> Option<Arc<B::Capture>> {
        self.handles.as_ref().map(|h| Arc::clone(&h.capture))
    }

    /// Acquires frontend, demux and dvr.
    ///
    /// Without `device_path` the adapters are probed from index 0 and the
    /// first terrestrial one is used. With a path, that device must itself
    /// be terrestrial. Handles acquired before a failure are released.
    pub fn open(&mut self, device_path: Option<&Path>) -> Result<(), TunerError> {
        if self.handles.is_some() {
            return self.record(Err(TunerError::AlreadyOpen));
        }
        let result = self.acquire(device_path);
        let result = result.map(|handles| {
            info!(
                "[Tuner] Opened {} ({})",
                handles.root.display(),
                handles.info.name
            );
            self.handles = Some(handles);
        });
        self.record(result)
    }

    fn acquire(&self, device_path: Option<&Path>) -> Result<Handles<B>, TunerError> {
        let (root, frontend, info) = match device_path {
            None => self.discover()?,
            Some(root) => self.open_explicit(root)?,
        };

        // Dropping `frontend` (and `demux`) on any early return closes them.
        let demux_path = root.join(Endpoint::Demux.node_name());
        let mut demux = self
            .backend
            .open_demux(&demux_path)
            .map_err(|source| TunerError::Open {
                endpoint: Endpoint::Demux,
                path: demux_path,
                source,
            })?;

        demux
            .set_pes_filter(&PesFilter::full_transport_stream())
            .map_err(|source| TunerError::Configuration {
                stage: "setting up the PES filter",
                source,
            })?;

        let capture_path = root.join(Endpoint::Capture.node_name());
        let capture = self
            .backend
            .open_capture(&capture_path)
            .map_err(|source| TunerError::Open {
                endpoint: Endpoint::Capture,
                path: capture_path,
                source,
            })?;

        Ok(Handles {
            root,
            info,
            frontend,
            demux,
            capture: Arc::new(capture),
        })
    }

    fn discover(&self) -> Result<(PathBuf, B::Frontend, FrontendInfo), TunerError> {
        for index in 0..MAX_ADAPTERS {
            let root = self.backend.adapter_root(index);
            let path = root.join(Endpoint::Frontend.node_name());

            let frontend = match self.backend.open_frontend(&path) {
                Ok(fe) => fe,
                Err(source) if index == 0 => {
                    return Err(TunerError::Discovery { path, source });
                }
                Err(e) => {
                    debug!("[Tuner] Discovery exhausted at {}: {}", path.display(), e);
                    return Err(TunerError::NoMatchingAdapter);
                }
            };

            let info = frontend
                .info()
                .map_err(|source| TunerError::Discovery {
                    path: path.clone(),
                    source,
                })?;

            if info.fe_type.is_terrestrial() {
                debug!("[Tuner] Adapter {} is terrestrial: {}", index, info.name);
                return Ok((root, frontend, info));
            }
            debug!(
                "[Tuner] Skipping adapter {} ({}, type {})",
                index, info.name, info.fe_type
            );
        }
        Err(TunerError::NoMatchingAdapter)
    }

    fn open_explicit(&self, root: &Path) -> Result<(PathBuf, B::Frontend, FrontendInfo), TunerError> {
        let path = root.join(Endpoint::Frontend.node_name());
        let frontend = self
            .backend
            .open_frontend(&path)
            .map_err(|source| TunerError::Open {
                endpoint: Endpoint::Frontend,
                path: path.clone(),
                source,
            })?;

        let info = frontend.info().map_err(|source| TunerError::Query {
            what: "frontend info",
            source,
        })?;

        if !info.fe_type.is_terrestrial() {
            return Err(TunerError::TypeMismatch {
                path,
                found: info.fe_type,
            });
        }
        Ok((root.to_path_buf(), frontend, info))
    }

    /// Configures the frontend for the request and commits the tune in one transaction.
    pub fn tune(&mut self, request: &ChannelRequest) -> Result<(), TunerError> {
        let result = Self::apply_tune(self.handles.as_mut(), request);
        self.record(result)
    }

    fn apply_tune(handles: Option<&mut Handles<B>>, request: &ChannelRequest) -> Result<(), TunerError> {
        let handles = handles.ok_or(TunerError::NotOpen)?;

        let frequency = u32::try_from(request.frequency_hz).map_err(|_| TunerError::Configuration {
            stage: "validating the frequency",
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} Hz does not fit the frequency property", request.frequency_hz),
            ),
        })?;

        let layers = request.layer_config();
        let inversion = if handles.info.can_auto_invert() {
            Inversion::Auto
        } else {
            Inversion::Off
        };
        let props = property::tune_transaction(frequency, &layers, inversion);

        debug!(
            "[Tuner] Tuning {} Hz, mode={}, layers={:#x}, partial={}, inversion={:?}",
            frequency,
            request.reception_mode,
            layers.enabled_layers.bits(),
            layers.partial_reception,
            inversion
        );
        handles
            .frontend
            .set_properties(&props)
            .map_err(|source| TunerError::Configuration {
                stage: "setting tuning properties",
                source,
            })
    }

    pub fn signal_present(&mut self) -> Result<bool, TunerError> {
        let result = self.status().map(|s| s.has_signal());
        self.record(result)
    }

    pub fn signal_locked(&mut self) -> Result<bool, TunerError> {
        let result = self.status().map(|s| s.has_lock());
        self.record(result)
    }

    fn status(&self) -> Result<crate::types::FrontendStatus, TunerError> {
        let handles = self.handles.as_ref().ok_or(TunerError::NotOpen)?;
        handles
            .frontend
            .read_status()
            .map_err(|source| TunerError::Query {
                what: "frontend status",
                source,
            })
    }

    /// Signal strength rescaled to 0..=100.
    pub fn signal_strength(&mut self) -> Result<u8, TunerError> {
        let result = self
            .handles
            .as_ref()
            .ok_or(TunerError::NotOpen)
            .and_then(|h| {
                h.frontend
                    .read_signal_strength()
                    .map_err(|source| TunerError::Query {
                        what: "signal strength",
                        source,
                    })
            })
            .map(normalize_metric);
        self.record(result)
    }

    /// Signal quality (SNR) rescaled to 0..=100.
    pub fn signal_quality(&mut self) -> Result<u8, TunerError> {
        let result = self
            .handles
            .as_ref()
            .ok_or(TunerError::NotOpen)
            .and_then(|h| {
                h.frontend.read_snr().map_err(|source| TunerError::Query {
                    what: "signal quality",
                    source,
                })
            })
            .map(normalize_metric);
        self.record(result)
    }

    /// Resets the frontend configuration and releases all handles.
    ///
    /// A failed reset is reported, but the handles are released anyway.
    /// Closing an unset resource succeeds.
    pub fn close(&mut self) -> Result<(), TunerError> {
        let Some(handles) = self.handles.take() else {
            return self.record(Ok(()));
        };
        let Handles {
            root,
            mut frontend,
            demux,
            capture,
            ..
        } = handles;

        let reset = frontend
            .set_properties(&property::clear_transaction())
            .map_err(|source| TunerError::Configuration {
                stage: "resetting the tuner",
                source,
            });
        if let Err(e) = &reset {
            warn!("[Tuner] {} ({})", e, root.display());
        }

        if Arc::strong_count(&capture) > 1 {
            debug!("[Tuner] Capture handle still shared; it closes with its last user");
        }
        drop(frontend);
        drop(demux);
        drop(capture);
        info!("[Tuner] Closed {}", root.display());

        self.record(reset)
    }

    fn record<T>(&mut self, result: Result<T, TunerError>) -> Result<T, TunerError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(LastError::from(e)),
        }
        result
    }
}

impl<B: DeviceBackend> Drop for TunerResource<B> {
    fn drop(&mut self) {
        if self.handles.is_some() {
            if let Err(e) = self.close() {
                warn!("[Tuner] Close on drop failed: {}", e);
            }
        }
    }
}

impl<B: DeviceBackend> SignalMonitor for TunerResource<B> {
    fn signal_strength(&mut self) -> Result<u8, TunerError> {
        TunerResource::signal_strength(self)
    }
}

/// Lists adapters by probing indices from 0.
///
/// Failing to open adapter 0 is an error; failing at a later index ends the list.
pub fn enumerate_adapters<B: DeviceBackend>(backend: &B) -> Result<Vec<AdapterInfo>, TunerError> {
    let mut adapters = Vec::new();
    for index in 0..MAX_ADAPTERS {
        let root = backend.adapter_root(index);
        let path = root.join(Endpoint::Frontend.node_name());

        let frontend = match backend.open_frontend(&path) {
            Ok(fe) => fe,
            Err(source) if index == 0 => return Err(TunerError::Discovery { path, source }),
            Err(_) => break,
        };
        let info = frontend
            .info()
            .map_err(|source| TunerError::Discovery { path, source })?;

        adapters.push(AdapterInfo {
            index,
            name: info.name.replace('\t', " "),
            root,
        });
    }
    Ok(adapters)
}

/// Renders adapters as `"<N>: <name>\t<root>"` entries separated by tabs.
pub fn format_adapter_list(adapters: &[AdapterInfo]) -> String {
    adapters
        .iter()
        .map(|a| format!("{}: {}\t{}", a.index, a.name, a.root.display()))
        .collect::<Vec<_>>()
        .join("\t")
}
