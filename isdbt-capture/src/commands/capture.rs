use std::fs::File;
use std::io;
use std::thread;
use std::time::Duration;

use isdbt_core::tuner::{wait_for_lock, PlatformBackend, TunerResource};
use isdbt_core::{CapturePipeline, Sink, SinkSet};
use log::{error, info, warn};

use super::{channel_request, open_and_tune, report_signal, CommandResult};
use crate::config::Settings;
use crate::context::CaptureArgs;
use crate::player::Player;

pub(crate) fn run(args: CaptureArgs, settings: &Settings) -> CommandResult {
    let request = channel_request(&args.target, settings.device.as_deref())?;

    let mut tuner = TunerResource::new(PlatformBackend::default());
    info!("Opening DVB devices");
    open_and_tune(&mut tuner, &request)?;

    info!("Tuning...");
    let outcome = wait_for_lock(&mut tuner, &settings.lock);
    if !outcome.is_locked() {
        tuner.close()?;
        return Err(format!(
            "Signal not locked on {} Hz after {} check(s)",
            request.frequency_hz, settings.lock.attempts
        )
        .into());
    }
    info!("Signal locked!");

    let mut sinks = SinkSet::new();
    let player = match &args.player {
        Some(command) => {
            let player = Player::spawn(command, &settings.fifo_path)?;
            sinks.push(Sink::new("player", player.open_writer()?));
            Some(player)
        }
        None => None,
    };
    match args.output.as_deref() {
        Some("-") => sinks.push(Sink::new("stdout", io::stdout())),
        Some(path) => {
            let file = File::create(path).map_err(|e| format!("Error opening file {}: {}", path, e))?;
            info!("File {} opened", path);
            sinks.push(Sink::new(path, file));
        }
        None => {}
    }

    report_signal(&mut tuner);

    let source = tuner
        .capture_source()
        .ok_or("Capture endpoint is not open")?;
    let mut pipeline = CapturePipeline::new(settings.pipeline);
    pipeline.start(source)?;

    let stop = pipeline.stop_handle();
    ctrlc::set_handler({
        let stop = stop.clone();
        move || {
            eprintln!("\nExiting...");
            stop.stop();
        }
    })?;
    if let Some(seconds) = args.time.filter(|t| *t > 0.0) {
        let limit = Duration::try_from_secs_f64(seconds)
            .map_err(|_| format!("Invalid recording time: {}", seconds))?;
        info!("Recording for {} seconds", seconds);
        thread::spawn(move || {
            thread::sleep(limit);
            stop.stop();
        });
    }

    info!("Capturing. To quit press Ctrl+C.");
    let consumed = pipeline.run_consumer(&mut sinks, &mut tuner);
    let stats = pipeline.stop()?;
    consumed?;
    info!(
        "Captured {} bytes ({} short writes)",
        stats.bytes_delivered, stats.short_writes
    );
    if stats.bytes_dropped > 0 {
        warn!("{} bytes were not delivered", stats.bytes_dropped);
    }

    drop(sinks);
    if let Some(player) = player {
        player.finish();
    }
    if let Err(e) = tuner.close() {
        error!("{} (code {})", e, e.code());
        return Err(e.into());
    }
    Ok(())
}
