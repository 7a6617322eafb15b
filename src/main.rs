use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "trainloop")]
#[command(
    version,
    about = "Automated endurance-training pipeline: ingest, analyze, adapt, push"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize trainloop in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Fetch tracker data and update storage
    Sync {
        #[arg(long, help = "Fetch only data newer than the last sync")]
        delta: bool,
    },

    /// Analyze training load and revise the plan when warranted
    Adapt {
        #[arg(long = "dry-run", help = "Write the patched plan but don't push it")]
        dry_run: bool,
    },

    /// Run the cron-driven scheduler until Ctrl-C
    Run,

    /// Show pipeline status
    Status {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
        #[arg(short = 'd', long, help = "Show detailed information")]
        detailed: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Edit configuration file with $EDITOR
    Edit {
        #[arg(long, short, help = "Edit global config")]
        global: bool,
    },
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mTrainloop encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }

        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Init { force } => {
            trainloop::cli::commands::init::run(force)?;
        }
        Commands::Sync { delta } => {
            let rt = Runtime::new()?;
            rt.block_on(trainloop::cli::commands::sync::run(delta))?;
        }
        Commands::Adapt { dry_run } => {
            let rt = Runtime::new()?;
            rt.block_on(trainloop::cli::commands::adapt::run(dry_run))?;
        }
        Commands::Run => {
            let rt = Runtime::new()?;
            rt.block_on(trainloop::cli::commands::run::run())?;
        }
        Commands::Status { format, detailed } => {
            trainloop::cli::commands::status::run(&format, detailed)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                trainloop::cli::commands::config::show(global, &format)?;
            }
            ConfigAction::Path => {
                trainloop::cli::commands::config::path()?;
            }
            ConfigAction::Edit { global } => {
                trainloop::cli::commands::config::edit(global)?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    trainloop::cli::commands::config::init_global(force)?;
                } else {
                    trainloop::cli::commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
