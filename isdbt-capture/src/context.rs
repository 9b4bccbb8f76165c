use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use isdbt_core::ReceptionMode;

#[derive(Debug, Parser)]
#[clap(name = "isdbt-capture")]
#[clap(about = "isdbt-capture tunes an ISDB-T DVB v5 frontend and streams the transport stream to a file or a player.", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    /// Configuration file (TOML).{n}
    /// When omitted, `isdbt-capture.toml` in the working directory is used if it exists.
    #[clap(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug-level logging.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Also write daily-rotated log files into this directory.
    #[clap(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Which hierarchical layers to receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LayerArg {
    /// All layers (full-segment reception)
    #[default]
    Full,
    /// Layer A only (one-segment partial reception)
    A,
    /// Layer B only
    B,
    /// Layer C only
    C,
}

impl From<LayerArg> for ReceptionMode {
    fn from(layer: LayerArg) -> Self {
        match layer {
            LayerArg::Full => ReceptionMode::Full,
            LayerArg::A => ReceptionMode::LayerA,
            LayerArg::B => ReceptionMode::LayerB,
            LayerArg::C => ReceptionMode::LayerC,
        }
    }
}

/// Channel selection shared by `capture` and `checksignal`.
#[derive(Debug, Args)]
#[clap(group(
    ArgGroup::new("target")
    .args(& ["channel", "frequency"])
    .required(true)
))]
pub(crate) struct TuneTarget {
    /// Physical channel number (7-69, ISDB-T International 6 MHz plan).
    #[clap(short, long, value_parser = clap::value_parser!(u32).range(7..=69))]
    pub channel: Option<u32>,

    /// Carrier frequency in Hz, instead of a channel number.
    #[clap(short, long, value_name = "HZ")]
    pub frequency: Option<u64>,

    /// Layer reception mode.
    #[clap(short, long, value_enum, default_value_t = LayerArg::Full)]
    pub layer: LayerArg,

    /// Adapter root, e.g. `/dev/dvb/adapter1`.{n}
    /// When omitted, the first terrestrial adapter is used.
    #[clap(short = 'i', long, value_name = "DEVICE_ROOT")]
    pub device: Option<PathBuf>,
}

#[derive(Debug, Args)]
#[clap(group(
    ArgGroup::new("sink")
    .args(& ["output", "player"])
    .required(true)
    .multiple(true)
))]
pub(crate) struct CaptureArgs {
    #[clap(flatten)]
    pub target: TuneTarget,

    /// Output TS file. `-` writes to stdout.
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Player command fed through a FIFO, e.g. "mplayer -vf yadif" or "vlc".
    #[clap(short, long, value_name = "COMMAND")]
    pub player: Option<String>,

    /// FIFO path used with `--player`.
    #[clap(long, value_name = "PATH")]
    pub fifo: Option<PathBuf>,

    /// Recording duration in seconds.{n}
    /// If omitted, zero or negative, capture runs until Ctrl-C.
    #[clap(short, long, value_name = "seconds")]
    pub time: Option<f64>,

    /// Number of signal-lock checks (one per lock interval).
    #[clap(long)]
    pub retries: Option<u32>,

    /// Ring buffer size as a power of two (28 = 256 MiB).
    #[clap(long, value_name = "ORDER")]
    pub buffer_order: Option<u32>,
}

#[derive(Debug, Args)]
pub(crate) struct ScanArgs {
    /// Where to write the channel list.
    #[clap(short, long, value_name = "FILE", required = true)]
    pub output: PathBuf,

    /// Also scan VHF channels 7-13.
    #[clap(long)]
    pub vhf: bool,

    /// Adapter root, e.g. `/dev/dvb/adapter1`.
    #[clap(short = 'i', long, value_name = "DEVICE_ROOT")]
    pub device: Option<PathBuf>,

    /// Number of signal-lock checks per channel.
    #[clap(long)]
    pub retries: Option<u32>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckSignalArgs {
    #[clap(flatten)]
    pub target: TuneTarget,

    /// Seconds between two readings.
    #[clap(long, value_name = "seconds", default_value_t = 1.0)]
    pub interval: f64,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Tune to a channel and capture its transport stream.{n}
    /// The stream goes to a file (`-o`), stdout (`-o -`) and/or
    /// a player (`-p`) reading from a FIFO.
    #[clap(name = "capture")]
    Capture(CaptureArgs),

    /// Scan for channels.{n}
    /// Every channel is tuned in one-segment (layer A) mode; locked
    /// channels are written to the output file.
    #[clap(name = "scan")]
    Scan(ScanArgs),

    /// List DVB adapters.
    #[clap(name = "devices")]
    Devices,

    /// Signal test.{n}
    /// Tunes to a channel and prints strength, quality and lock state
    /// until Ctrl-C.
    #[clap(name = "checksignal")]
    Checksignal(CheckSignalArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_args() {
        let cli = Cli::try_parse_from([
            "isdbt-capture", "capture", "-c", "35", "-l", "a", "-o", "out.ts", "-t", "10",
        ])
        .unwrap();
        let Commands::Capture(args) = cli.command else {
            panic!("expected capture");
        };
        assert_eq!(args.target.channel, Some(35));
        assert_eq!(args.target.layer, LayerArg::A);
        assert_eq!(args.output.as_deref(), Some("out.ts"));
        assert_eq!(args.time, Some(10.0));
        assert!(args.player.is_none());
    }

    #[test]
    fn test_capture_requires_target_and_sink() {
        assert!(Cli::try_parse_from(["isdbt-capture", "capture", "-o", "out.ts"]).is_err());
        assert!(Cli::try_parse_from(["isdbt-capture", "capture", "-c", "20"]).is_err());
        assert!(Cli::try_parse_from([
            "isdbt-capture", "capture", "-c", "20", "-f", "599142857", "-o", "x.ts"
        ])
        .is_err());
    }

    #[test]
    fn test_channel_range() {
        assert!(Cli::try_parse_from(["isdbt-capture", "checksignal", "-c", "6"]).is_err());
        assert!(Cli::try_parse_from(["isdbt-capture", "checksignal", "-c", "70"]).is_err());
        assert!(Cli::try_parse_from(["isdbt-capture", "checksignal", "-c", "69"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "isdbt-capture", "devices", "-v", "--log-dir", "/tmp/logs",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert!(matches!(cli.command, Commands::Devices));
    }

    #[test]
    fn test_layer_arg_mapping() {
        assert_eq!(ReceptionMode::from(LayerArg::Full), ReceptionMode::Full);
        assert_eq!(ReceptionMode::from(LayerArg::A), ReceptionMode::LayerA);
        assert_eq!(ReceptionMode::from(LayerArg::C), ReceptionMode::LayerC);
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
