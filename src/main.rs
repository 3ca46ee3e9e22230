use clap::{Parser, Subcommand};
use loop2midi::config::{load_config, validate_config};
use loop2midi::{validate_input, Config, LoopToMidi, OutputMode, PreSeparated};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Loop-to-MIDI Transcription System
#[derive(Parser)]
#[command(name = "loop2midi")]
#[command(about = "Find the strongest loop in a track's drum stem and transcribe it to MIDI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Separate, select a loop and transcribe (or export the raw stem)
    Process {
        /// Input audio file
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stem to separate (drums, bass, vocals, ...)
        #[arg(long)]
        stem: Option<String>,

        /// What to produce
        #[arg(long, value_enum, default_value_t = OutputMode::Transcribe)]
        mode: OutputMode,

        /// Quantization grid in notes per whole note (0 disables)
        #[arg(long)]
        quantize: Option<u32>,

        /// Loop length in bars
        #[arg(long)]
        bars: Option<u32>,

        /// Input already is the isolated stem; skip separation
        #[arg(long)]
        pre_separated: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            config,
            stem,
            mode,
            quantize,
            bars,
            pre_separated,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }
            init_tracing(verbose, quiet);

            let mut config = match config {
                Some(path) => load_config(path)?,
                None => Config::default(),
            };
            if let Some(stem) = stem {
                config.separation.stem = stem;
            }
            if let Some(division) = quantize {
                config.schedule.quantization_division = division;
            }
            if let Some(bars) = bars {
                config.loop_window.bars = bars;
            }

            validate_input(&input, &config)?;

            let processor = if pre_separated {
                LoopToMidi::new(config, Box::new(PreSeparated))
            } else {
                LoopToMidi::with_demucs(config)
            };

            if !quiet {
                println!("Processing {}...", input.display());
            }

            let mut report = |percent: u8, message: &str| {
                if !quiet {
                    println!("[{:>3}%] {}", percent, message);
                }
            };
            let result = processor.process(&input, &output, mode, &mut report)?;

            if !quiet {
                match mode {
                    OutputMode::Transcribe => {
                        if let Some(window) = result.loop_window {
                            println!(
                                "Tempo {:.1} BPM, loop {:.2}s - {:.2}s, {} notes",
                                result.tempo_bpm, window.start_sec, window.end_sec, result.note_count
                            );
                        }
                        if let Some(midi) = &result.midi_path {
                            println!("MIDI saved to {}", midi.display());
                        }
                    }
                    OutputMode::RawStem => {
                        println!("Stem at {}", result.stem_path.display());
                        if let Some(image) = &result.spectrogram_path {
                            println!("Spectrogram saved to {}", image.display());
                        }
                    }
                }
            }
        }
        Commands::ValidateConfig { config } => {
            let config = load_config(config)?;
            validate_config(&config)?;
            println!("Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
