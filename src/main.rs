//! P300 oddball recorder.
//!
//! # Usage
//!
//! ```bash
//! # Record one session with the default shuffled sequence
//! p300 record --config config.yaml
//!
//! # Replay an earlier recording through the acquisition path
//! p300 record --playback recordings/p300.csv --policy bernoulli
//!
//! # Filter and balance recordings for training
//! p300 process recordings/*.csv --layout train --seed 7
//!
//! # Write the default configuration
//! p300 init-config config.yaml
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use p300_oddball::acquisition::acquisition_loop::LabelingPolicy;
use p300_oddball::acquisition::build_gateway;
use p300_oddball::conditioning::layout::ColumnLayout;
use p300_oddball::config::{load_config, save_config, Config, GatewayConfig, SequencePolicyConfig};
use p300_oddball::local::{process_file, record};
use p300_oddball::stimulus::display::ConsoleDisplay;
use p300_oddball::utils::log::init_tracing;
use p300_oddball::{P300Error, Result};

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(name = "p300")]
#[command(author, version, about = "P300 oddball experiment recorder and preprocessor", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one tagged acquisition session
    Record {
        /// Configuration file (defaults to ./config.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Recording output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stimulus sequence policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// How a drained marker is spread over its poll batch
        #[arg(long, value_enum)]
        labeling: Option<LabelingArg>,

        /// Replay this CSV instead of the synthetic board
        #[arg(long)]
        playback: Option<PathBuf>,
    },

    /// Filter and balance recordings, one output per input
    Process {
        /// Recordings to condition
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Configuration file (defaults to ./config.yaml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Column layout of the inputs
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Seed for the balancer
        #[arg(long)]
        seed: Option<u64>,

        /// Filter only, keep every marker as recorded
        #[arg(long)]
        no_balance: bool,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Bernoulli,
    Shuffled,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LabelingArg {
    StampFirst,
    StampAll,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Default,
    Fusion,
    Train,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match execute(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Record {
            config,
            output,
            policy,
            labeling,
            playback,
        } => {
            let mut config = resolve_config(config.as_deref())?;
            if let Some(output) = output {
                config.persistence.output_path = output;
            }
            if let Some(policy) = policy {
                config.stimulus.policy = select_policy(config.stimulus.policy, policy);
            }
            if let Some(labeling) = labeling {
                config.acquisition.labeling = match labeling {
                    LabelingArg::StampFirst => LabelingPolicy::StampFirst,
                    LabelingArg::StampAll => LabelingPolicy::StampAll,
                };
            }
            if let Some(path) = playback {
                config.acquisition.gateway = GatewayConfig::Playback {
                    path,
                    layout: ColumnLayout::Train,
                };
            }
            config.validate()?;

            let gateway = build_gateway(&config.acquisition);
            let mut display = ConsoleDisplay::stdout();
            let report = record::run_session(&config, gateway, &mut display, record::spawn_enter_listener)?;
            record::print_report(&report);

            if report.acquisition_failed() {
                return Err(P300Error::hardware(
                    "acquisition",
                    "session ended early after repeated gateway failures; partial data was saved",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Process {
            files,
            config,
            layout,
            seed,
            no_balance,
        } => {
            let mut config = resolve_config(config.as_deref())?;
            if let Some(layout) = layout {
                config.conditioning.layout = match layout {
                    LayoutArg::Default => ColumnLayout::Default,
                    LayoutArg::Fusion => ColumnLayout::Fusion,
                    LayoutArg::Train => ColumnLayout::Train,
                };
            }
            if seed.is_some() {
                config.conditioning.balance_seed = seed;
            }
            if no_balance {
                config.conditioning.balance = false;
            }

            let failures = process_file::run(&config, &files);
            if failures > 0 {
                eprintln!(
                    "{} {} of {} recordings failed",
                    "error:".red().bold(),
                    failures,
                    files.len()
                );
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitConfig { file } => {
            save_config(&Config::default(), &file)?;
            println!("{} {}", "wrote".green(), file.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads the named config, or ./config.yaml when it exists, or the defaults.
fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(DEFAULT_CONFIG),
        None => {
            info!("no configuration file, using defaults");
            Ok(Config::default())
        }
    }
}

/// Keeps configured parameters when the requested policy kind already matches.
fn select_policy(current: SequencePolicyConfig, requested: PolicyArg) -> SequencePolicyConfig {
    match (current, requested) {
        (SequencePolicyConfig::Bernoulli { .. }, PolicyArg::Bernoulli)
        | (SequencePolicyConfig::Shuffled { .. }, PolicyArg::Shuffled) => current,
        (_, PolicyArg::Bernoulli) => SequencePolicyConfig::Bernoulli {
            p_target: 0.2,
            p_flash: 0.5,
        },
        (_, PolicyArg::Shuffled) => SequencePolicyConfig::default(),
    }
}
