use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use isdbt_core::tuner::{wait_for_lock, DeviceBackend, LockPolicy, PlatformBackend, TunerResource};
use isdbt_core::{ChannelRequest, ReceptionMode};
use log::{info, warn};

use super::{open_and_tune, report_signal, CommandResult};
use crate::channels::{channel_frequency, scan_channels};
use crate::config::Settings;
use crate::context::ScanArgs;

/// A channel that locked during the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanHit {
    /// 1-based position among the locked channels.
    pub id: u32,
    pub channel: u32,
    pub frequency_hz: u64,
}

impl fmt::Display for ScanHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {:02} name Canal_{:02} frequency {} segment 1SEG",
            self.id, self.channel, self.frequency_hz
        )
    }
}

pub(crate) fn run(args: ScanArgs, settings: &Settings) -> CommandResult {
    let file = File::create(&args.output)
        .map_err(|e| format!("Error opening {}: {}", args.output.display(), e))?;
    let mut out = BufWriter::new(file);

    let channels: Vec<u32> = scan_channels(args.vhf).collect();
    let bar = ProgressBar::new(channels.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let hits = scan(
        &PlatformBackend::default(),
        &channels,
        settings.device.as_deref(),
        &settings.lock,
        &mut out,
        &bar,
    )?;
    out.flush()?;

    bar.finish_with_message(format!("{} channel(s) found", hits.len()));
    info!(
        "Scan finished: {} of {} channel(s) locked, written to {}",
        hits.len(),
        channels.len(),
        args.output.display()
    );
    Ok(())
}

/// Tunes every channel in layer-A mode and writes one line per locked channel.
///
/// A channel without lock is skipped; failing to open or tune the adapter
/// aborts the scan. The tuner is closed before the next channel either way.
fn scan<B, W>(
    backend: &B,
    channels: &[u32],
    device: Option<&Path>,
    lock: &LockPolicy,
    out: &mut W,
    bar: &ProgressBar,
) -> Result<Vec<ScanHit>, Box<dyn std::error::Error>>
where
    B: DeviceBackend + Clone,
    W: Write,
{
    let mut hits = Vec::new();

    for &channel in channels {
        let frequency_hz = channel_frequency(channel)
            .ok_or_else(|| format!("Channel {} is outside the 7-69 plan", channel))?;
        bar.set_message(format!("CH {} ({} Hz)", channel, frequency_hz));

        let mut request = ChannelRequest::new(frequency_hz, ReceptionMode::LayerA);
        if let Some(root) = device {
            request = request.with_device(root);
        }

        let mut tuner = TunerResource::new(backend.clone());
        open_and_tune(&mut tuner, &request)?;

        if wait_for_lock(&mut tuner, lock).is_locked() {
            let hit = ScanHit {
                id: hits.len() as u32 + 1,
                channel,
                frequency_hz,
            };
            info!("CH {}: signal locked", channel);
            writeln!(out, "{}", hit)?;
            report_signal(&mut tuner);
            hits.push(hit);
        } else {
            info!("CH {}: signal not locked, next channel", channel);
        }

        if let Err(e) = tuner.close() {
            warn!("CH {}: {}", channel, e);
        }
        bar.inc(1);
    }

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use isdbt_core::tuner::{CaptureSource, Demux, Frontend, PesFilter, Property};
    use isdbt_core::{FrontendInfo, FrontendStatus, FrontendType};

    #[derive(Default)]
    struct Record {
        open_handles: i32,
        transactions: Vec<Vec<Property>>,
        fail_open: bool,
    }

    /// One terrestrial adapter at `/fake/adapter0` that locks on `locked` frequencies.
    #[derive(Clone, Default)]
    struct FakeBackend {
        locked: Vec<u32>,
        record: Arc<Mutex<Record>>,
    }

    impl FakeBackend {
        fn new(locked: &[u64]) -> Self {
            Self {
                locked: locked.iter().map(|&f| f as u32).collect(),
                record: Arc::default(),
            }
        }

        fn release(&self) {
            self.record.lock().unwrap().open_handles -= 1;
        }
    }

    impl DeviceBackend for FakeBackend {
        type Frontend = FakeFrontend;
        type Demux = FakeEndpoint;
        type Capture = FakeEndpoint;

        fn adapter_root(&self, index: u32) -> PathBuf {
            PathBuf::from(format!("/fake/adapter{}", index))
        }

        fn open_frontend(&self, path: &Path) -> io::Result<FakeFrontend> {
            let mut record = self.record.lock().unwrap();
            if record.fail_open || !path.starts_with("/fake/adapter0") {
                return Err(io::ErrorKind::NotFound.into());
            }
            record.open_handles += 1;
            Ok(FakeFrontend {
                backend: self.clone(),
                tuned: None,
            })
        }

        fn open_demux(&self, _path: &Path) -> io::Result<FakeEndpoint> {
            self.record.lock().unwrap().open_handles += 1;
            Ok(FakeEndpoint(self.clone()))
        }

        fn open_capture(&self, _path: &Path) -> io::Result<FakeEndpoint> {
            self.record.lock().unwrap().open_handles += 1;
            Ok(FakeEndpoint(self.clone()))
        }
    }

    struct FakeFrontend {
        backend: FakeBackend,
        tuned: Option<u32>,
    }

    impl Frontend for FakeFrontend {
        fn info(&self) -> io::Result<FrontendInfo> {
            Ok(FrontendInfo {
                name: "Fake ISDB-T".to_string(),
                fe_type: FrontendType::Ofdm,
                caps: 0,
            })
        }

        fn set_properties(&mut self, props: &[Property]) -> io::Result<()> {
            for p in props {
                if let Property::Frequency(f) = p {
                    self.tuned = Some(*f);
                }
            }
            self.backend
                .record
                .lock()
                .unwrap()
                .transactions
                .push(props.to_vec());
            Ok(())
        }

        fn read_status(&self) -> io::Result<FrontendStatus> {
            let locked = self.tuned.is_some_and(|f| self.backend.locked.contains(&f));
            Ok(FrontendStatus(if locked {
                FrontendStatus::HAS_SIGNAL | FrontendStatus::HAS_LOCK
            } else {
                0
            }))
        }

        fn read_signal_strength(&self) -> io::Result<u16> {
            Ok(65535)
        }

        fn read_snr(&self) -> io::Result<u16> {
            Ok(32768)
        }
    }

    impl Drop for FakeFrontend {
        fn drop(&mut self) {
            self.backend.release();
        }
    }

    struct FakeEndpoint(FakeBackend);

    impl Demux for FakeEndpoint {
        fn set_pes_filter(&mut self, _filter: &PesFilter) -> io::Result<()> {
            Ok(())
        }
    }

    impl CaptureSource for FakeEndpoint {
        fn read_chunk(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }

        fn wait_readable(&self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for FakeEndpoint {
        fn drop(&mut self) {
            self.0.release();
        }
    }

    fn instant_lock() -> LockPolicy {
        LockPolicy {
            attempts: 2,
            interval: Duration::ZERO,
        }
    }

    fn run_scan(backend: &FakeBackend, channels: &[u32]) -> (Result<Vec<ScanHit>, String>, String) {
        let mut out = Vec::new();
        let result = scan(
            backend,
            channels,
            None,
            &instant_lock(),
            &mut out,
            &ProgressBar::hidden(),
        )
        .map_err(|e| e.to_string());
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_scan_skips_unlocked_channels() {
        let backend = FakeBackend::new(&[479_142_000, 497_142_000]);
        let (result, out) = run_scan(&backend, &[14, 15, 16, 17, 18]);

        let hits = result.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(
            out,
            "id 01 name Canal_15 frequency 479142000 segment 1SEG\n\
             id 02 name Canal_18 frequency 497142000 segment 1SEG\n"
        );
        assert_eq!(backend.record.lock().unwrap().open_handles, 0);
    }

    #[test]
    fn test_scan_tunes_layer_a_and_closes_every_channel() {
        let backend = FakeBackend::new(&[]);
        let (result, out) = run_scan(&backend, &[7, 8]);
        assert!(result.unwrap().is_empty());
        assert!(out.is_empty());

        let record = backend.record.lock().unwrap();
        // tune + clear per channel
        assert_eq!(record.transactions.len(), 4);
        assert!(record.transactions[0].contains(&Property::PartialReception(true)));
        assert!(record.transactions[0].contains(&Property::Frequency(177_142_000)));
        assert_eq!(record.transactions[1], vec![Property::Clear]);
        assert!(record.transactions[2].contains(&Property::Frequency(183_142_000)));
        assert_eq!(record.open_handles, 0);
    }

    #[test]
    fn test_scan_aborts_when_open_fails() {
        let backend = FakeBackend::new(&[473_142_000]);
        backend.record.lock().unwrap().fail_open = true;
        let (result, out) = run_scan(&backend, &[14, 15]);
        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_scan_hit_format() {
        let hit = ScanHit {
            id: 3,
            channel: 7,
            frequency_hz: 177_142_000,
        };
        assert_eq!(
            hit.to_string(),
            "id 03 name Canal_07 frequency 177142000 segment 1SEG"
        );
    }
}
