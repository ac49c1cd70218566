#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mobile_protocol::{AlertLevel, NodeSnapshot};
use mobile_server::client::build_connector;
use mobile_server::config::{ListenerConfig, RetryConfig, ServerConfig};
use mobile_server::monitor::{FixtureAccount, MonitorFixture, StaticMonitor};
use mobile_server::tls::{build_acceptor, load_tls_material};
use mobile_server::ServerState;
use tokio::sync::watch;
use tokio_rustls::{TlsAcceptor, TlsConnector};

pub const USERNAME: &str = "noc";
pub const PASSWORD: &str = "changeme";
pub const SERVER_NAME: &str = "localhost";

/// Acceptor with a fresh self-signed certificate and a connector trusting it.
pub fn tls_pair() -> (TlsAcceptor, TlsConnector) {
    let material = load_tls_material(None).expect("self-signed material");
    let roots = material.cert_chain.clone();
    (
        build_acceptor(material).expect("acceptor"),
        build_connector(roots).expect("connector"),
    )
}

pub fn sample_tree() -> NodeSnapshot {
    NodeSnapshot::branch(
        "Monitoring",
        AlertLevel::High,
        vec![
            NodeSnapshot::branch(
                "Servers",
                AlertLevel::High,
                vec![
                    NodeSnapshot::leaf("web01", AlertLevel::High).with_message("HTTP 503"),
                    NodeSnapshot::leaf("db01", AlertLevel::None),
                ],
            ),
            NodeSnapshot::branch("Networks", AlertLevel::None, vec![]),
        ],
    )
}

pub fn fixture_monitor() -> Arc<StaticMonitor> {
    Arc::new(StaticMonitor::new(MonitorFixture {
        accounts: vec![FixtureAccount {
            username: USERNAME.to_string(),
            password_hash: Some(bcrypt::hash(PASSWORD, 4).expect("hash")),
            password: None,
        }],
        tree: sample_tree(),
    }))
}

pub fn loopback_config(port: u16, delay_ms: u64) -> ServerConfig {
    ServerConfig {
        listener: ListenerConfig {
            bind_address: Some("127.0.0.1".to_string()),
            port,
            ..ListenerConfig::default()
        },
        retry: RetryConfig { delay_ms },
        ..ServerConfig::default()
    }
}

/// Picks a loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("free port")
}

pub async fn wait_for_state(states: &mut watch::Receiver<ServerState>, expected: ServerState) {
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == expected),
    )
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {:?}", expected))
    .expect("state channel closed");
}
