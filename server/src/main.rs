use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::runtime::Handle;

use mobile_server::config::{ServerConfig, TlsConfig};
use mobile_server::monitor::{MonitorFixture, StaticMonitor};
use mobile_server::tls::{build_acceptor, load_tls_material};
use mobile_server::{MobileServer, ServerState};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (for development)
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("server/.env").ok();
    }

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        match command.as_str() {
            "hash-password" => {
                let Some(password) = args.next() else {
                    bail!("usage: mobile-server hash-password <password>");
                };
                println!("{}", bcrypt::hash(password, bcrypt::DEFAULT_COST)?);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => bail!("unknown argument: {}\nUse --help for usage.", other),
        }
    }

    log::info!("Starting mobile status server...");
    log::info!("Protocol version: {}", mobile_protocol::protocol_version());

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "server/config/mobile.toml".to_string());
    let config = ServerConfig::load_from_file(&config_path).unwrap_or_else(|e| {
        log::warn!(
            "Failed to load config from '{}': {}. Falling back to defaults.",
            config_path,
            e
        );
        ServerConfig::default()
    });

    let fixture_path = std::env::var("MONITOR_FIXTURE_PATH")
        .unwrap_or_else(|_| "server/config/monitor.toml".to_string());
    let fixture = MonitorFixture::load_from_file(&fixture_path)
        .with_context(|| format!("failed to load monitor fixture '{}'", fixture_path))?;
    let monitor = StaticMonitor::new(fixture);
    log::info!(
        "Loaded monitor fixture with {} accounts",
        monitor.account_count()
    );

    let tls_config = resolve_tls_config(&config)?;
    if tls_config.is_none() {
        log::warn!("No TLS certificate configured; generating a self-signed localhost certificate");
    }
    let material = load_tls_material(tls_config.as_ref())?;
    let tls = build_acceptor(material)?;

    let server = MobileServer::new(config, Arc::new(monitor), tls, Handle::current());
    let mut states = server.subscribe();
    server.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    log::info!("Shutdown requested");
    server.stop();

    let stopped = tokio::time::timeout(
        SHUTDOWN_GRACE,
        states.wait_for(|state| *state == ServerState::Stopped),
    )
    .await;
    if stopped.is_err() {
        log::warn!("Accept loop did not stop within {:?}", SHUTDOWN_GRACE);
    }

    Ok(())
}

/// Environment variables take precedence over the `[tls]` config section.
fn resolve_tls_config(config: &ServerConfig) -> anyhow::Result<Option<TlsConfig>> {
    let cert_path = std::env::var("MOBILE_TLS_CERT").ok();
    let key_path = std::env::var("MOBILE_TLS_KEY").ok();

    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert: PathBuf::from(cert),
            key: PathBuf::from(key),
        })),
        (None, None) => Ok(config.tls.clone()),
        (Some(_), None) | (None, Some(_)) => {
            bail!("TLS is misconfigured. Set both MOBILE_TLS_CERT and MOBILE_TLS_KEY, or neither.")
        }
    }
}

fn print_help() {
    println!(
        "mobile-server [hash-password <password>]

Serves the monitoring status tree to mobile clients over TLS.

Environment:
  CONFIG_PATH            server config (default server/config/mobile.toml)
  MONITOR_FIXTURE_PATH   static monitor fixture (default server/config/monitor.toml)
  MOBILE_TLS_CERT        PEM certificate chain (with MOBILE_TLS_KEY)
  MOBILE_TLS_KEY         PEM private key
  RUST_LOG               log filter (default info)"
    );
}
