//! Configuration file and its merge with the command line.
//!
//! Precedence: command line > configuration file > built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use isdbt_core::tuner::LockPolicy;
use isdbt_core::PipelineConfig;

use crate::context::{Cli, Commands};

const DEFAULT_CONFIG_FILE: &str = "isdbt-capture.toml";
const DEFAULT_BUFFER_ORDER: u32 = 28;
const DEFAULT_FIFO_PATH: &str = "/tmp/isdbt-capture.ts";
const DEFAULT_RETENTION_DAYS: u64 = 7;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub tuner: TunerSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct TunerSection {
    pub device: Option<PathBuf>,
    pub lock_attempts: Option<u32>,
    pub lock_interval_ms: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct CaptureSection {
    pub buffer_order: Option<u32>,
    pub chunk_size: Option<usize>,
    pub block_size: Option<usize>,
    pub status_interval: Option<u64>,
    pub fifo_path: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct LoggingSection {
    pub log_dir: Option<PathBuf>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

pub(crate) fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Explicit path, else `isdbt-capture.toml` in the working directory if present.
pub(crate) fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    })
}

/// Effective settings for one invocation.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub device: Option<PathBuf>,
    pub lock: LockPolicy,
    pub pipeline: PipelineConfig,
    pub fifo_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub log_level: String,
}

impl Settings {
    pub(crate) fn resolve(file: &ConfigFile, cli: &Cli) -> Self {
        let defaults = PipelineConfig::default();
        let default_lock = LockPolicy::default();

        let (device, retries, buffer_order, fifo) = match &cli.command {
            Commands::Capture(args) => (
                args.target.device.clone(),
                args.retries,
                args.buffer_order,
                args.fifo.clone(),
            ),
            Commands::Checksignal(args) => (args.target.device.clone(), None, None, None),
            Commands::Scan(args) => (args.device.clone(), args.retries, None, None),
            Commands::Devices => (None, None, None, None),
        };

        let buffer_order = buffer_order
            .or(file.capture.buffer_order)
            .unwrap_or(DEFAULT_BUFFER_ORDER);
        let pipeline = PipelineConfig {
            // An order too large for usize yields 0, which the pipeline rejects.
            buffer_capacity: 1usize.checked_shl(buffer_order).unwrap_or(0),
            chunk_size: file.capture.chunk_size.unwrap_or(defaults.chunk_size),
            block_size: file.capture.block_size.unwrap_or(defaults.block_size),
            status_interval: file
                .capture
                .status_interval
                .unwrap_or(defaults.status_interval),
        };

        let lock = LockPolicy {
            attempts: retries
                .or(file.tuner.lock_attempts)
                .unwrap_or(default_lock.attempts),
            interval: file
                .tuner
                .lock_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default_lock.interval),
        };

        let log_level = if cli.verbose {
            "debug".to_string()
        } else {
            file.logging
                .level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        };

        Self {
            device: device.or_else(|| file.tuner.device.clone()),
            lock,
            pipeline,
            fifo_path: fifo
                .or_else(|| file.capture.fifo_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FIFO_PATH)),
            log_dir: cli.log_dir.clone().or_else(|| file.logging.log_dir.clone()),
            retention_days: file
                .logging
                .retention_days
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let cli = parse(&["isdbt-capture", "capture", "-c", "20", "-o", "x.ts"]);
        let settings = Settings::resolve(&ConfigFile::default(), &cli);
        assert_eq!(settings.device, None);
        assert_eq!(settings.lock, LockPolicy::default());
        assert_eq!(settings.pipeline.buffer_capacity, 1 << 28);
        assert_eq!(settings.pipeline.chunk_size, 4096);
        assert_eq!(settings.fifo_path, PathBuf::from(DEFAULT_FIFO_PATH));
        assert_eq!(settings.log_dir, None);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_file_values_and_cli_precedence() {
        let file: ConfigFile = toml::from_str(
            r#"
            [tuner]
            device = "/dev/dvb/adapter2"
            lock_attempts = 6
            lock_interval_ms = 500

            [capture]
            buffer_order = 22
            block_size = 8192
            fifo_path = "/run/player.ts"

            [logging]
            log_dir = "/var/log/isdbt"
            level = "warn"
            "#,
        )
        .unwrap();

        let cli = parse(&["isdbt-capture", "capture", "-c", "20", "-o", "x.ts"]);
        let settings = Settings::resolve(&file, &cli);
        assert_eq!(settings.device, Some(PathBuf::from("/dev/dvb/adapter2")));
        assert_eq!(settings.lock.attempts, 6);
        assert_eq!(settings.lock.interval, Duration::from_millis(500));
        assert_eq!(settings.pipeline.buffer_capacity, 1 << 22);
        assert_eq!(settings.pipeline.block_size, 8192);
        assert_eq!(settings.fifo_path, PathBuf::from("/run/player.ts"));
        assert_eq!(settings.log_dir, Some(PathBuf::from("/var/log/isdbt")));
        assert_eq!(settings.log_level, "warn");

        let cli = parse(&[
            "isdbt-capture",
            "capture",
            "-c",
            "20",
            "-o",
            "x.ts",
            "-i",
            "/dev/dvb/adapter0",
            "--retries",
            "3",
            "--buffer-order",
            "20",
            "--fifo",
            "/tmp/f.ts",
            "--log-dir",
            "logs",
            "-v",
        ]);
        let settings = Settings::resolve(&file, &cli);
        assert_eq!(settings.device, Some(PathBuf::from("/dev/dvb/adapter0")));
        assert_eq!(settings.lock.attempts, 3);
        assert_eq!(settings.pipeline.buffer_capacity, 1 << 20);
        assert_eq!(settings.fifo_path, PathBuf::from("/tmp/f.ts"));
        assert_eq!(settings.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_unknown_sections_and_empty_file() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert!(file.tuner.device.is_none());
        assert!(toml::from_str::<ConfigFile>("[capture]\nbuffer_order = \"big\"").is_err());
    }

    #[test]
    fn test_load_config_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[tuner]\nlock_attempts = 4").unwrap();
        let file = load_config(tmp.path()).unwrap();
        assert_eq!(file.tuner.lock_attempts, Some(4));

        assert_eq!(
            resolve_config_path(Some(tmp.path().to_path_buf())),
            Some(tmp.path().to_path_buf())
        );
        assert!(load_config(Path::new("/nonexistent/isdbt-capture.toml")).is_err());
    }
}
