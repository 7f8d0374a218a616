use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "epx")]
#[command(about = "Exam proctoring integrity CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> exam -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Replay a recorded signal log (JSONL) through the integrity engine
    Replay {
        /// JSONL file, one signal envelope per line
        #[arg(long)]
        signals: String,

        /// Layered config paths in merge order (defaults when omitted)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Derive elapsed session time from signal timestamps (first line = 0s)
        #[arg(long, default_value_t = false)]
        elapsed_from_ts: bool,

        /// Fail when the config carries keys replay never reads
        #[arg(long, default_value_t = false)]
        strict_config: bool,

        /// Print the final attempt state as JSON after the summary
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Compute a submission's final score from integrity + AI likelihoods
    FinalScore {
        /// Integrity score at submission
        #[arg(long)]
        score: i64,

        /// Per-question AI likelihood (repeatable)
        #[arg(long = "likelihood")]
        likelihoods: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = epx_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Replay {
            signals,
            config_paths,
            elapsed_from_ts,
            strict_config,
            json,
        } => {
            commands::replay::run(commands::replay::ReplayArgs {
                signals_path: signals,
                config_paths,
                elapsed_from_ts,
                strict_config,
                json,
            })?;
        }

        Commands::FinalScore { score, likelihoods } => {
            commands::final_score(score, &likelihoods);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
