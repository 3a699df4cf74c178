use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;

use ledstate_rs::config::{ServerConfig, StoreConfig};
use ledstate_rs::server;
use ledstate_rs::state::{ProposedUpdate, StateService, StateStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML file describing the storage layout
    #[arg(short, long, global = true, env = "LEDSTATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the state file (overrides the config file)
    #[arg(short, long, global = true, env = "LEDSTATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0", env = "LEDSTATE_HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 5000, env = "LEDSTATE_PORT")]
        port: u16,

        /// Directory of front-end files served outside /api
        #[arg(long, env = "LEDSTATE_STATIC_DIR")]
        static_dir: Option<PathBuf>,

        /// Origin allowed to call the API (repeatable; default: any)
        #[arg(long = "allow-origin", env = "LEDSTATE_ALLOW_ORIGINS", value_delimiter = ',')]
        allow_origins: Vec<String>,
    },
    /// Print the current state
    Get,
    /// Propose a new color and LED count
    Set {
        /// Color as #RRGGBB
        #[arg(long)]
        color: String,

        /// Number of lit LEDs
        #[arg(long, allow_hyphen_values = true)]
        count: String,
    },
}

fn store_config(args: &Args) -> anyhow::Result<StoreConfig> {
    let config = match &args.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StoreConfig::default(),
    };
    Ok(match &args.data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let store_config = store_config(&args)?;
    log::info!("Using state file {}", store_config.state_path().display());
    let service = StateService::new(StateStore::new(store_config));

    match args.command {
        Commands::Serve {
            host,
            port,
            static_dir,
            allow_origins,
        } => {
            let config = ServerConfig {
                host,
                port,
                static_dir,
                allowed_origins: allow_origins,
            };
            server::serve(service, config).await?;
        }
        Commands::Get => {
            let record = tokio::task::spawn_blocking(move || service.get_state()).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Set { color, count } => {
            let update = ProposedUpdate {
                color: Some(Value::String(color)),
                count: Some(Value::String(count)),
            };
            let record = tokio::task::spawn_blocking(move || service.set_state(&update)).await??;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
