use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use revos::config::{ConfigLoader, EnvPrefixes};
use revos::observability::metrics::Metrics;
use revos::server::{self, AppState};
use revos::tokens::TokenManager;
use revos::utils::logging::{self, LogLevel};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML or JSON config file
    #[arg(short, long, env = "REVOS_CONFIG")]
    config: Option<PathBuf>,
    /// KEY=VALUE file layered under the process environment
    #[arg(long, env = "REVOS_ENV_FILE")]
    env_file: Option<PathBuf>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    #[arg(long)]
    auth_prefix: Option<String>,
    #[arg(long)]
    llm_prefix: Option<String>,
    #[arg(long)]
    log_prefix: Option<String>,
    #[arg(long)]
    token_prefix: Option<String>,
    #[arg(long)]
    server_prefix: Option<String>,
}

impl Args {
    fn prefixes(&self) -> EnvPrefixes {
        let mut prefixes = EnvPrefixes::default();
        if let Some(prefix) = &self.auth_prefix {
            prefixes = prefixes.with_auth(prefix.as_str());
        }
        if let Some(prefix) = &self.llm_prefix {
            prefixes = prefixes.with_llm(prefix.as_str());
        }
        if let Some(prefix) = &self.log_prefix {
            prefixes = prefixes.with_logging(prefix.as_str());
        }
        if let Some(prefix) = &self.token_prefix {
            prefixes = prefixes.with_token(prefix.as_str());
        }
        if let Some(prefix) = &self.server_prefix {
            prefixes = prefixes.with_server(prefix.as_str());
        }
        prefixes
    }

    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new().prefixes(self.prefixes());
        if let Some(path) = &self.config {
            loader = loader.file(path);
        }
        if let Some(path) = &self.env_file {
            loader = loader.env_file(path);
        }
        loader
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load config and init logging
    // -------------------------------

    let args = Args::parse();
    let config = args.loader().load()?;
    logging::init_logging(&logging::resolve(&config.logging, args.log_level))?;
    info!(
        token_url = %config.auth.token_url,
        models = ?config.models().keys().collect::<Vec<_>>(),
        "configuration loaded"
    );

    // -------------------------------
    // 2. Token manager and metrics observer
    // -------------------------------

    let metrics = Metrics::new()?;
    let tokens = TokenManager::new(&config)?;
    let observer = tokio::spawn(metrics.clone().observe(tokens.subscribe()));

    // -------------------------------
    // 3. Warm the token, start periodic refresh
    // -------------------------------

    match tokens.get_token().await {
        Ok(_) => info!("initial token acquired"),
        Err(err) => warn!("initial token acquisition failed, will retry on demand: {err}"),
    }
    tokens.start_background_service();

    // -------------------------------
    // 4. Serve until Ctrl-C
    // -------------------------------

    let state = AppState::new(tokens.clone(), config, metrics);
    let served = server::start(state, shutdown_signal()).await;

    tokens.stop_background_service().await;
    observer.abort();
    info!("revos stopped");
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
