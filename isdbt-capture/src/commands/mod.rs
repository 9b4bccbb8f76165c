//! Subcommand handlers.

pub(crate) mod capture;
pub(crate) mod checksignal;
pub(crate) mod devices;
pub(crate) mod scan;

use std::path::Path;

use isdbt_core::tuner::{DeviceBackend, TunerResource};
use isdbt_core::{ChannelRequest, TunerError};
use log::{debug, error, info};

use crate::channels::channel_frequency;
use crate::context::TuneTarget;

pub(crate) type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Builds the request from `-c`/`-f`, `-l` and the effective device.
pub(crate) fn channel_request(
    target: &TuneTarget,
    device: Option<&Path>,
) -> Result<ChannelRequest, Box<dyn std::error::Error>> {
    let frequency = match (target.channel, target.frequency) {
        (_, Some(hz)) => hz,
        (Some(ch), None) => channel_frequency(ch)
            .ok_or_else(|| format!("Channel {} is outside the 7-69 plan", ch))?,
        (None, None) => return Err("Either a channel or a frequency is required".into()),
    };
    if let Some(ch) = target.channel {
        info!("Frequency {} Hz (CH {}) selected", frequency, ch);
    }

    let request = ChannelRequest::new(frequency, target.layer.into());
    Ok(match device {
        Some(root) => request.with_device(root),
        None => request,
    })
}

/// Opens the adapter named by the request (or discovers one) and tunes it.
pub(crate) fn open_and_tune<B: DeviceBackend>(
    tuner: &mut TunerResource<B>,
    request: &ChannelRequest,
) -> Result<(), TunerError> {
    let result = tuner.open(request.device_path.as_deref()).and_then(|()| {
        if let Some(info) = tuner.frontend_info() {
            debug!("Using frontend \"{}\"", info.name);
        }
        tuner.tune(request)
    });
    if result.is_err() {
        if let Some(last) = tuner.last_error() {
            error!("{} (code {})", last.message, last.code);
        }
    }
    result
}

/// Logs strength and quality once; zero readings are skipped.
pub(crate) fn report_signal<B: DeviceBackend>(tuner: &mut TunerResource<B>) {
    match tuner.signal_strength() {
        Ok(0) => {}
        Ok(power) => info!("Signal power = {}%", power),
        Err(e) => debug!("{}", e),
    }
    match tuner.signal_quality() {
        Ok(0) => {}
        Ok(snr) => info!("Signal quality = {}%", snr),
        Err(e) => debug!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LayerArg;
    use isdbt_core::ReceptionMode;
    use std::path::PathBuf;

    fn target(channel: Option<u32>, frequency: Option<u64>) -> TuneTarget {
        TuneTarget {
            channel,
            frequency,
            layer: LayerArg::A,
            device: None,
        }
    }

    #[test]
    fn test_channel_request_from_channel() {
        let request = channel_request(&target(Some(35), None), None).unwrap();
        assert_eq!(request.frequency_hz, 599_142_000);
        assert_eq!(request.reception_mode, ReceptionMode::LayerA);
        assert_eq!(request.device_path, None);
    }

    #[test]
    fn test_channel_request_from_frequency_with_device() {
        let request = channel_request(
            &target(None, Some(599_142_857)),
            Some(Path::new("/dev/dvb/adapter1")),
        )
        .unwrap();
        assert_eq!(request.frequency_hz, 599_142_857);
        assert_eq!(request.device_path, Some(PathBuf::from("/dev/dvb/adapter1")));
    }

    #[test]
    fn test_channel_request_rejects_missing_target() {
        assert!(channel_request(&target(None, None), None).is_err());
        assert!(channel_request(&target(Some(99), None), None).is_err());
    }
}
