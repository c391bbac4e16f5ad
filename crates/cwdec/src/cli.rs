use std::fmt::Display;

use clap::{error::ErrorKind, value_parser, CommandFactory, Parser};

use cwrx::{CwReceiverBuilder, Speaker, DEFAULT_TURN_PROSIGNS};

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program accepts raw PCM samples in signed 16-bit (i16) format, at the given sampling --rate, and decodes any Morse code (CW) that is present. Decoded text is printed as it arrives.

See --help for more details.
"#;

const USAGE_LONG: &str = r#"
This program accepts raw PCM samples in signed 16-bit (i16) format, at the given sampling --rate, and decodes any Morse code (CW) that is present. Decoded text is printed as it arrives.

You can pipe in an audio file with sox

    sox input.wav -t raw -r 8k -e signed -b 16 -c 1 - \
        | cwdec -r 8000

or listen to a sound card

    parec --channels 1 --format s16ne \
      --rate 8000 --latency-msec 100 \
        | cwdec -r 8000 --turns

By default, the decoder scans for the strongest tone between --scan-low and --scan-high and follows the sender's speed. If you know the tone frequency, set it with --tone.

With --turns, the text of a two-way contact is also split into turns. A turn ends with one of the --prosigns, a change of tone frequency, or a long silence. Each turn is printed on its own line once it ends:

  [remote 12.34–15.67 s @ 700 Hz] CQ CQ DE W1AW K
"#;

const ADVANCED: &str = "Advanced Detector Options";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even decoded text
    #[arg(short, long)]
    pub quiet: bool,

    /// Sampling rate (Hz)
    ///
    /// Set to the sampling rate of your audio source. CW needs
    /// very little bandwidth, so 8000 Hz is plenty.
    #[arg(short, long, default_value_t = 8000)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    pub rate: u32,

    /// Input file (or "-" for stdin)
    ///
    /// The input must be one-channel (mono), signed 16-bit
    /// native-endian at --rate.
    #[arg(long, default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Samples per analysis block
    ///
    /// Frequency resolution is --rate / --block-size. Blocks
    /// should be much shorter than a dit.
    #[arg(long, default_value_t = 80)]
    pub block_size: usize,

    /// Listen only to this tone frequency (Hz)
    ///
    /// Disables scanning.
    #[arg(long, value_name = "HZ")]
    pub tone: Option<f32>,

    /// Lowest tone frequency to scan (Hz)
    #[arg(long, default_value_t = 400.0)]
    pub scan_low: f32,

    /// Highest tone frequency to scan (Hz)
    #[arg(long, default_value_t = 1000.0)]
    pub scan_high: f32,

    /// Spacing of scanned frequencies (Hz)
    #[arg(long, default_value_t = 50.0)]
    pub scan_step: f32,

    /// Sending speed (WPM)
    ///
    /// The initial speed estimate. With --fixed-wpm, the only
    /// speed which is decoded.
    #[arg(long, default_value_t = 20.0)]
    pub wpm: f32,

    /// Do not adapt to the sender's speed
    #[arg(long)]
    pub fixed_wpm: bool,

    /// Slowest speed to adapt to (WPM)
    #[arg(long, default_value_t = 5.0)]
    pub min_wpm: f32,

    /// Fastest speed to adapt to (WPM)
    #[arg(long, default_value_t = 60.0)]
    pub max_wpm: f32,

    /// Print each conversation turn when it ends
    #[arg(long)]
    pub turns: bool,

    /// Words which end a turn
    #[arg(long, value_delimiter = ',', default_values_t = default_prosigns())]
    pub prosigns: Vec<String>,

    /// Who sends the first turn
    #[arg(long, default_value_t = Speaker::Remote)]
    pub first_speaker: Speaker,

    /// Tone-to-noise ratio for key down
    #[arg(long, default_value_t = 3.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub on_ratio: f32,

    /// Tone-to-noise ratio for key up
    #[arg(long, default_value_t = 2.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub off_ratio: f32,

    /// Blocks needed to confirm a key transition
    #[arg(long, default_value_t = 2)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub confirm_blocks: u32,

    /// Blocks of noise measurement at startup
    #[arg(long, default_value_t = 10)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub calibration_blocks: u32,

    /// Blocks of dominance needed to lock to a tone
    #[arg(long, default_value_t = 3)]
    #[arg(value_parser = value_parser!(u32).range(1..))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub lock_acquire_blocks: u32,

    /// Silence which drops the tone lock (s)
    #[arg(long, default_value_t = 3.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub lock_timeout: f64,

    /// Frequency change which ends a turn (Hz)
    #[arg(long, default_value_t = 50.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub turn_tolerance: f32,

    /// Silence which ends a turn (s)
    #[arg(long, default_value_t = 5.0)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub turn_idle: f64,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }

    /// Receiver configuration for these arguments
    pub fn receiver_builder(&self) -> CwReceiverBuilder {
        let mut bld = CwReceiverBuilder::new(self.rate);
        bld.with_block_size(self.block_size)
            .with_key_ratios(self.on_ratio, self.off_ratio)
            .with_confirm_blocks(self.confirm_blocks)
            .with_calibration_blocks(self.calibration_blocks)
            .with_lock_acquire_blocks(self.lock_acquire_blocks)
            .with_lock_timeout(self.lock_timeout)
            .with_turn_prosigns(&self.prosigns)
            .with_turn_tolerance(self.turn_tolerance)
            .with_turn_idle_timeout(self.turn_idle)
            .with_first_speaker(self.first_speaker);

        match self.tone {
            Some(hz) => bld.with_fixed_frequency(hz),
            None => bld.with_scan_range(self.scan_low, self.scan_high, self.scan_step),
        };

        if self.fixed_wpm {
            bld.with_fixed_wpm(self.wpm);
        } else {
            bld.with_adaptive_wpm(self.wpm, self.min_wpm, self.max_wpm);
        }

        bld
    }
}

fn default_prosigns() -> Vec<String> {
    DEFAULT_TURN_PROSIGNS.iter().map(|p| p.to_string()).collect()
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cwrx::{SpeedMode, TrackingMode};

    #[test]
    fn test_clap() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_receiver_builder() {
        let args = Args::try_parse_from(["cwdec"]).expect("parse");
        assert!(args.input_is_stdin());
        assert_eq!(CwReceiverBuilder::new(8000), args.receiver_builder());

        let args = Args::try_parse_from([
            "cwdec",
            "--tone",
            "650",
            "--fixed-wpm",
            "--wpm",
            "25",
            "--prosigns",
            "k,<sk>",
            "--first-speaker",
            "local",
        ])
        .expect("parse");
        let bld = args.receiver_builder();
        assert_eq!(TrackingMode::Fixed { frequency: 650.0 }, bld.tracking_mode());
        assert_eq!(SpeedMode::Fixed { wpm: 25.0 }, bld.speed_mode());
        assert_eq!(&["K", "<SK>"], bld.turn_prosigns());
        assert_eq!(Speaker::Local, bld.first_speaker());
    }
}
