use pr_trigger_relay::api::create_router;
use pr_trigger_relay::logging::{FileLogger, setup_logging};
use pr_trigger_relay::{AppState, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_CONFIG_PATH: &str = "relay_config.toml";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    // An explicitly named config file must exist; the default one is optional.
    let explicit_config = std::env::var("RELAY_CONFIG").ok();
    let config_path = PathBuf::from(
        explicit_config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
    );

    let config = match load_config(&config_path, explicit_config.is_some()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let file_logger = config.log_dir.clone().map(FileLogger::new);
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging setup error: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("Startup error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Forwarding builds to {}", state.trigger_client.url());
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
