// src/bin/s4_server.rs

//! The main entry point for the s4 storage node.

use anyhow::Result;
use s4::config::ServerConfig;
use s4::server;
use std::env;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    // stabilizes formatting of the shell commands the map family and eval
    // fork-exec.
    unsafe {
        env::set_var("LC_ALL", "C");
    }

    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("s4 server version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "-c" || arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("s4.toml");

    let config = match ServerConfig::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(config).await {
        error!("server runtime error: {e}");
        return Err(e);
    }

    Ok(())
}
