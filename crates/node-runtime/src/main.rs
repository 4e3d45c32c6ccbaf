//! # Clearnode
//!
//! Entry point of the clearing node.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (JSON file named by `CLEARNODE_CONFIG`, then
//!    `CLEARNODE_*` environment overrides) and validate it
//! 2. Install the tracing subscriber at the configured level
//! 3. Load the node key
//! 4. Wire in-memory stores into the gateway and serve
//! 5. On Ctrl-C, close every client connection and stop the listener

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cn_01_signature_verification::{EcdsaSigner, Signer};
use cn_03_rpc_gateway::{ClearnodeConfig, ClearnodeService, Stores};

/// Environment variable naming an optional JSON configuration file.
const ENV_CONFIG_FILE: &str = "CLEARNODE_CONFIG";

/// Load configuration from an optional file and the process environment.
fn load_config() -> Result<ClearnodeConfig> {
    let file = std::env::var(ENV_CONFIG_FILE).ok();
    build_config(file.as_deref(), |key| std::env::var(key).ok())
}

fn build_config<F>(file: Option<&str>, lookup: F) -> Result<ClearnodeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {path}"))?;
            ClearnodeConfig::from_json_str(&raw)
                .with_context(|| format!("parsing config file {path}"))?
        }
        None => ClearnodeConfig::default(),
    };
    config
        .apply_env(lookup)
        .context("applying environment overrides")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_signer(config: &ClearnodeConfig) -> Result<EcdsaSigner> {
    let key = config
        .signer
        .private_key
        .as_deref()
        .context("node private key not set (CLEARNODE_PRIVATE_KEY)")?;
    EcdsaSigner::from_hex(key).context("loading node private key")
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log level {level:?}"))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.log_level.0)?;

    let signer = load_signer(&config)?;
    info!(
        node = %signer.address(),
        addr = %config.bind_addr(),
        assets = config.assets.len(),
        networks = config.networks.len(),
        "Starting clearnode"
    );

    let service = Arc::new(
        ClearnodeService::new(config, Arc::new(signer), Stores::in_memory())
            .context("creating gateway")?,
    );

    let mut server = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.start().await })
    };

    info!("Clearnode is running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for Ctrl-C")?;
            info!("Initiating graceful shutdown...");
            service.shutdown();
        }
        finished = &mut server => {
            return finished
                .context("server task panicked")?
                .context("gateway stopped with an error");
        }
    }

    server
        .await
        .context("server task panicked")?
        .context("gateway stopped with an error")?;
    info!("Shutdown complete");
    Ok(())
}
