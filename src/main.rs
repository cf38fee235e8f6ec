use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use miraie_bridge::config::BridgeConfig;
use miraie_bridge::mqtt::{ConnectionManager, FileCredentialSource, Payload};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Connects MirAIe air conditioners to a home-automation hub over MQTT.
#[derive(Parser, Debug)]
#[command(name = "miraie-bridge", version)]
struct Cli {
    /// Configuration file. Defaults to the user config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MirAIe account user id used as MQTT username.
    #[arg(short, long)]
    username: Option<String>,

    /// File holding the current access token. Re-read on every reconnect.
    #[arg(short, long)]
    token_file: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_error_reporting()?;
    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(BridgeConfig::default_path)
        .ok_or_else(|| eyre!("No --config given and no user config directory available"))?;
    let config = BridgeConfig::load_or_default(&config_path).await?;

    if cli.dump_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    setup_logging(&config.logging.level);

    let username = cli
        .username
        .ok_or_else(|| eyre!("--username is required"))?;
    let token_file = cli
        .token_file
        .ok_or_else(|| eyre!("--token-file is required"))?;

    let credentials = FileCredentialSource::new(token_file);
    let token = credentials.read_token().await?;

    let manager = Arc::new(ConnectionManager::<Payload>::with_rumqttc(
        config.into_mqtt_config(),
    ));
    register_status_logging(&manager).await;

    let cancel = manager.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
            Err(e) => warn!("Unable to listen for interrupt: {}", e),
        }
    });

    info!(
        "Starting bridge as {} ({} topics)",
        manager.config().client_id,
        manager.config().subbed_topics.len()
    );
    manager.connect(&username, token, &credentials).await?;
    Ok(())
}

fn install_error_reporting() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()
}

/// `RUST_LOG` wins over the configured level.
fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Until device objects take over, every configured topic just logs what it receives.
async fn register_status_logging(manager: &ConnectionManager<Payload>) {
    let dispatch = manager.dispatch();
    for topic in &manager.config().subbed_topics {
        let name = topic.clone();
        dispatch
            .register(topic.clone(), move |status: Payload| {
                info!("Status on {}: {}", name, serde_json::Value::Object(status));
            })
            .await;
    }
}
