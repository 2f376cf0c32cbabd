use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "dirk")]
#[command(about = "Multi-service user reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// List every configured service and print one identity per person
    Merge {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true, num_args = 1..)]
        config_paths: Vec<String>,

        /// Keep identities with no user in a valid service
        #[arg(long, default_value_t = false)]
        allow_non_valid: bool,
    },

    /// Start from one user and discover its counterparts in every service
    Fetch {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true, num_args = 1..)]
        config_paths: Vec<String>,

        /// Tag of the service holding the seed user
        #[arg(long)]
        service: String,

        /// Seed user id, in the service's own string form
        #[arg(long)]
        user_id: String,
    },
}

fn init_tracing() {
    // stdout carries the JSON results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = dirk_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Merge {
            config_paths,
            allow_non_valid,
        } => commands::merge::run(&config_paths, allow_non_valid).await?,

        Commands::Fetch {
            config_paths,
            service,
            user_id,
        } => commands::fetch::run(&config_paths, &service, &user_id).await?,
    }

    Ok(())
}
