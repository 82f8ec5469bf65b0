use std::path::PathBuf;

use clap::{Parser, Subcommand};
use healthlake::cli::{commands, OutputFormat};
use healthlake::config::PipelineConfig;
use healthlake::models::Domain;
use healthlake::pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "healthlake")]
#[command(author, version, about = "Personal health and training data pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Data directory (default: ~/.local/share/healthlake)
    #[arg(long, global = true, env = "HEALTHLAKE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: ~/.config/healthlake/config.json)
    #[arg(long, global = true, env = "HEALTHLAKE_CONFIG")]
    config: Option<PathBuf>,

    /// IANA time zone used to derive calendar dates
    #[arg(long, global = true, env = "HEALTHLAKE_TZ")]
    timezone: Option<String>,

    /// Entity the marts are built for
    #[arg(long, global = true, env = "HEALTHLAKE_ENTITY")]
    entity: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Move landed records into the staged partitions
    Stage {
        /// Domain to stage (health, workouts, activities). Stages all when omitted
        #[arg(short, long)]
        domain: Option<Domain>,

        /// Ignore the lookback window and stage everything landed
        #[arg(long)]
        all: bool,
    },
    /// Rebuild the daily marts and exercise records from staged data
    Transform,
    /// Show the window cutoff date in the configured zone
    Cutoff {
        /// Number of days to look back
        #[arg(short, long, default_value = "15")]
        days: u32,
    },
    /// Show personal-record progression per exercise
    Records {
        /// Filter by exercise name (case-insensitive substring)
        #[arg(short, long)]
        exercise: Option<String>,
    },
    /// Show landing, staged and mart status
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> healthlake::Result<PipelineConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => PipelineConfig::default_path()?,
    };
    let mut config = PipelineConfig::load(&path)?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(tz) = &cli.timezone {
        config.timezone = tz.clone();
    }
    if let Some(entity) = &cli.entity {
        config.entity = entity.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> healthlake::Result<()> {
    let pipeline = Pipeline::open(load_config(&cli)?)?;
    let format = cli.format;

    match cli.command {
        Commands::Stage { domain, all } => commands::stage(&pipeline, domain, all, format),
        Commands::Transform => commands::transform(&pipeline, format),
        Commands::Cutoff { days } => commands::cutoff(&pipeline, days, format),
        Commands::Records { exercise } => commands::personal_records(&pipeline, exercise, format),
        Commands::Status => commands::status(&pipeline, format),
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", healthlake::error::format_user_error(&e));
        std::process::exit(1);
    }
}
