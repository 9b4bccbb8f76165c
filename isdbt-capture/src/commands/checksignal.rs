use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use isdbt_core::tuner::{PlatformBackend, TunerResource};
use isdbt_core::TunerError;
use log::{debug, info};

use super::{channel_request, open_and_tune, CommandResult};
use crate::config::Settings;
use crate::context::CheckSignalArgs;

pub(crate) fn run(args: CheckSignalArgs, settings: &Settings) -> CommandResult {
    let request = channel_request(&args.target, settings.device.as_deref())?;
    let interval = Duration::try_from_secs_f64(args.interval)
        .map_err(|_| format!("Invalid interval: {}", args.interval))?;

    let mut tuner = TunerResource::new(PlatformBackend::default());
    open_and_tune(&mut tuner, &request)?;
    if let Some(root) = tuner.device_root() {
        info!("Checking signal on {} at {} Hz", root.display(), request.frequency_hz);
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc::set_handler({
        let running = Arc::clone(&running);
        move || running.store(false, Ordering::SeqCst)
    })?;

    let mut stderr = io::stderr();
    while running.load(Ordering::SeqCst) {
        let line = status_line(
            reading("lock status", tuner.signal_locked()),
            reading("signal strength", tuner.signal_strength()),
            reading("signal quality", tuner.signal_quality()),
        );
        write!(stderr, "\r{}", line)?;
        stderr.flush()?;
        thread::sleep(interval);
    }
    writeln!(stderr)?;

    tuner.close()?;
    Ok(())
}

/// Logs a failed query and turns it into "no value".
fn reading<T>(what: &str, result: Result<T, TunerError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{} unavailable: {} (code {})", what, e, e.code());
            None
        }
    }
}

fn status_line(locked: Option<bool>, strength: Option<u8>, quality: Option<u8>) -> String {
    let lock = match locked {
        Some(true) => "LOCKED".green().bold(),
        Some(false) => "NO LOCK".red().bold(),
        None => "UNKNOWN".yellow(),
    };
    let percent = |v: Option<u8>| v.map_or_else(|| "--".to_string(), |v| format!("{:3}%", v));
    format!(
        "{}  strength {}  quality {}",
        lock,
        percent(strength),
        percent(quality)
    )
}
