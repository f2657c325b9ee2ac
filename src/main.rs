use std::env;
use std::fs;

use serde::Serialize;
use serde_json::json;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use trade_guard::ControlPlane;
use trade_guard::config::Config;
use trade_guard::domain::ExchangePosition;

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_flag(name: &str) -> Option<String> {
    let prefix = format!("--{}=", name);
    env::args()
        .skip(1)
        .find_map(|arg| arg.strip_prefix(&prefix).map(str::to_string))
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!(error = %e, "Failed to serialize output"),
    }
}

fn load_positions(path: &str) -> Result<Vec<ExchangePosition>, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path, e))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_flag("config").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let loaded = Config::load(&config_path);
    init_tracing(
        loaded
            .as_ref()
            .ok()
            .and_then(|c| c.app.log_level.as_deref()),
    );
    let config = loaded.unwrap_or_else(|e| {
        warn!(path = %config_path, error = %e, "Config unusable, falling back to defaults");
        Config::default()
    });

    info!(
        config = %config_path,
        app = %config.app.name,
        log_level = ?config.app.log_level,
        "Configuration loaded"
    );

    let plane = ControlPlane::from_config(&config);

    if let Some(path) = parse_flag("scan") {
        let positions = match load_positions(&path) {
            Ok(positions) => positions,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        let classifications = plane.tracker().scan_and_classify_positions(&positions);
        info!(positions = positions.len(), classified = classifications.len(), "Scan complete");
        print_json(&classifications);
    }

    if env::args().any(|arg| arg == "--report") {
        print_json(&json!({
            "tracker": plane.tracker().get_stats(),
            "neural": plane.tracker().get_neural_data(),
            "risk": plane.risk().get_risk_report(),
            "emergency": plane.emergency().get_status_report(),
            "config": {
                "risk": config.risk(),
                "balance": config.balance(),
                "emergency": config.emergency(),
                "tracker": config.tracker(),
            },
        }));
    }

    if let Err(e) = plane.notifier().close().await {
        error!(error = %e, "Failed to close notifier");
    }
}
