mod cmd;
mod output;

use birthdays_core::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "birthdays",
    about = "Manage a birthday list kept in a CSV file and published by pull request",
    version,
    propagate_version = true
)]
struct Cli {
    /// CSV data file (default: birthdays.csv)
    #[arg(long, global = true, env = "DATA_PATH")]
    data: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: $PORT or 3000)
        #[arg(long)]
        port: Option<u16>,
        /// Open a browser on the health page once listening
        #[arg(long)]
        open: bool,
    },

    /// Parse and validate a CSV file
    Validate {
        /// File to check (default: the data file)
        file: Option<PathBuf>,
    },

    /// Show the table of records with age and next birthday
    Upcoming {
        /// all, today, this-week, next-week, this-month, next-month,
        /// this-quarter, next-quarter, this-year, next-year
        #[arg(long)]
        period: Option<String>,
        /// Keep only ages divisible by 5 or 10
        #[arg(long)]
        modulo: Option<String>,
        /// Sort keys, e.g. `month:asc,day:asc`
        #[arg(long)]
        sort: Option<String>,
    },

    /// Open a pull request that replaces the committed CSV with a local file
    Publish {
        /// File to publish (default: the data file)
        file: Option<PathBuf>,
    },
}

fn load_config(data: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(path) = data {
        config.data_path = path;
    }
    Ok(config)
}

fn main() {
    // A missing .env is normal; only the variables it sets matter.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = load_config(cli.data).and_then(|config| match cli.command {
        Commands::Serve { port, open } => cmd::serve::run(config, port, open),
        Commands::Validate { file } => cmd::validate::run(&config, file.as_deref(), cli.json),
        Commands::Upcoming {
            period,
            modulo,
            sort,
        } => cmd::upcoming::run(
            &config,
            period.as_deref(),
            modulo.as_deref(),
            sort.as_deref(),
            cli.json,
        ),
        Commands::Publish { file } => cmd::publish::run(&config, file.as_deref(), cli.json),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
