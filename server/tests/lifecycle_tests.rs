mod common;

use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{
    fixture_monitor, free_port, loopback_config, sample_tree, tls_pair, wait_for_state, PASSWORD,
    SERVER_NAME, USERNAME,
};
use mobile_server::client::fetch_status;
use mobile_server::monitor::{Monitor, MonitorError, RootNode, StaticMonitor};
use mobile_server::{MobileServer, ServerState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

async fn running_server(port: u16) -> (MobileServer, tokio_rustls::TlsConnector, SocketAddr) {
    let (acceptor, connector) = tls_pair();
    let server = MobileServer::new(
        loopback_config(port, 100),
        fixture_monitor(),
        acceptor,
        Handle::current(),
    );
    let mut states = server.subscribe();
    assert!(server.start());
    wait_for_state(&mut states, ServerState::Running).await;
    let addr = server.local_addr().expect("listening address");
    (server, connector, addr)
}

#[tokio::test]
async fn serves_status_tree_over_tls() {
    let (server, connector, addr) = running_server(0).await;

    let tree = fetch_status(&connector, addr, SERVER_NAME, USERNAME, PASSWORD)
        .await
        .expect("exchange");
    assert_eq!(tree, Some(sample_tree()));

    assert!(server.stop());
}

#[tokio::test]
async fn rejected_logins_get_no_tree() {
    let (_server, connector, addr) = running_server(0).await;

    let wrong_password = fetch_status(&connector, addr, SERVER_NAME, USERNAME, "nope")
        .await
        .expect("exchange");
    let unknown_user = fetch_status(&connector, addr, SERVER_NAME, "ghost", PASSWORD)
        .await
        .expect("exchange");

    assert_eq!(wrong_password, None);
    assert_eq!(unknown_user, None);
}

#[tokio::test]
async fn concurrent_clients_are_served_independently() {
    let (_server, connector, addr) = running_server(0).await;

    let mut clients = Vec::new();
    for i in 0..8 {
        let connector = connector.clone();
        let password = if i % 2 == 0 { PASSWORD } else { "wrong" };
        clients.push(tokio::spawn(async move {
            fetch_status(&connector, addr, SERVER_NAME, USERNAME, password).await
        }));
    }

    for (i, client) in clients.into_iter().enumerate() {
        let tree = client.await.unwrap().expect("exchange");
        assert_eq!(tree.is_some(), i % 2 == 0);
    }
}

#[tokio::test]
async fn start_is_idempotent_while_running() {
    let (server, _connector, addr) = running_server(0).await;

    assert!(!server.start());
    assert_eq!(server.state(), ServerState::Running);
    assert_eq!(server.local_addr(), Some(addr));
}

#[tokio::test]
async fn stop_without_start_is_a_no_op() {
    let (acceptor, _) = tls_pair();
    let server = MobileServer::new(
        loopback_config(0, 100),
        fixture_monitor(),
        acceptor,
        Handle::current(),
    );

    assert!(!server.stop());
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn stop_closes_the_listener() {
    let (server, _connector, addr) = running_server(0).await;
    let mut states = server.subscribe();

    assert!(server.stop());
    assert!(!server.stop());
    wait_for_state(&mut states, ServerState::Stopped).await;

    assert_eq!(server.local_addr(), None);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn dropping_the_server_stops_the_loop() {
    let (server, _connector, addr) = running_server(0).await;
    let mut states = server.subscribe();

    drop(server);
    wait_for_state(&mut states, ServerState::Stopped).await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn garbage_client_does_not_disturb_the_next_one() {
    let (_server, connector, addr) = running_server(0).await;

    let mut garbage = TcpStream::connect(addr).await.unwrap();
    garbage.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    let mut sink = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), garbage.read_to_end(&mut sink)).await;

    let tree = fetch_status(&connector, addr, SERVER_NAME, USERNAME, PASSWORD)
        .await
        .expect("exchange");
    assert_eq!(tree, Some(sample_tree()));
}

#[tokio::test]
async fn failed_bind_is_retried_until_the_port_frees_up() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let (acceptor, connector) = tls_pair();
    let server = MobileServer::new(
        loopback_config(port, 100),
        fixture_monitor(),
        acceptor,
        Handle::current(),
    );
    let mut states = server.subscribe();
    assert!(server.start());

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(server.state(), ServerState::Starting);
    assert_eq!(server.local_addr(), None);

    drop(blocker);
    wait_for_state(&mut states, ServerState::Running).await;
    let addr = server.local_addr().unwrap();
    assert_eq!(addr.port(), port);

    let tree = fetch_status(&connector, addr, SERVER_NAME, USERNAME, PASSWORD)
        .await
        .expect("exchange");
    assert!(tree.is_some());
}

#[tokio::test]
async fn bind_retries_are_spaced_by_the_fixed_delay() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    let delay = Duration::from_millis(200);

    let (acceptor, _) = tls_pair();
    let server = MobileServer::new(
        loopback_config(port, delay.as_millis() as u64),
        fixture_monitor(),
        acceptor,
        Handle::current(),
    );
    assert!(server.start());
    let mut states = server.subscribe();

    // Every failed bind republishes `Starting` right before the pause.
    let mut attempts = Vec::new();
    for _ in 0..4 {
        tokio::time::timeout(Duration::from_secs(2), states.changed())
            .await
            .expect("no retry within two delays")
            .unwrap();
        assert_eq!(*states.borrow_and_update(), ServerState::Starting);
        attempts.push(Instant::now());
    }

    for pair in attempts.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay - Duration::from_millis(20), "retried after {:?}", gap);
        assert!(gap < delay * 2, "retry delay grew to {:?}", gap);
    }
    assert_eq!(server.local_addr(), None);

    assert!(server.stop());
    drop(blocker);
}

#[tokio::test]
async fn stop_interrupts_the_retry_delay() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let (acceptor, _) = tls_pair();
    let server = MobileServer::new(
        loopback_config(port, 60_000),
        fixture_monitor(),
        acceptor,
        Handle::current(),
    );
    let mut states = server.subscribe();
    assert!(server.start());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(server.stop());
    wait_for_state(&mut states, ServerState::Stopped).await;

    // The stopped loop must not grab the port once it is released.
    drop(blocker);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    assert_eq!(server.state(), ServerState::Stopped);
}

/// Holds every login until the test releases it.
struct GatedMonitor {
    inner: Arc<StaticMonitor>,
    entered: mpsc::UnboundedSender<()>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl Monitor for GatedMonitor {
    fn login(
        &self,
        locale: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn RootNode>, MonitorError> {
        let _ = self.entered.send(());
        let _ = self.release.lock().unwrap().recv();
        self.inner.login(locale, username, password)
    }
}

#[tokio::test]
async fn restart_leaves_in_flight_sessions_running() {
    let port = free_port();
    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let monitor = Arc::new(GatedMonitor {
        inner: fixture_monitor(),
        entered: entered_tx,
        release: Mutex::new(release_rx),
    });

    let (acceptor, connector) = tls_pair();
    let server = MobileServer::new(
        loopback_config(port, 100),
        monitor,
        acceptor,
        Handle::current(),
    );
    let mut states = server.subscribe();
    assert!(server.start());
    wait_for_state(&mut states, ServerState::Running).await;
    let addr = server.local_addr().unwrap();

    let old_connector = connector.clone();
    let in_flight = tokio::spawn(async move {
        fetch_status(&old_connector, addr, SERVER_NAME, USERNAME, PASSWORD).await
    });
    entered_rx.recv().await.unwrap();

    assert!(server.stop());
    assert!(server.start());
    wait_for_state(&mut states, ServerState::Running).await;
    assert_eq!(server.local_addr(), Some(addr));

    release_tx.send(()).unwrap();
    let old_tree = in_flight.await.unwrap().expect("in-flight exchange");
    assert_eq!(old_tree, Some(sample_tree()));

    // The superseded generation finishing must not disturb its successor.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state(), ServerState::Running);

    release_tx.send(()).unwrap();
    let new_tree = fetch_status(&connector, addr, SERVER_NAME, USERNAME, PASSWORD)
        .await
        .expect("exchange");
    assert_eq!(new_tree, Some(sample_tree()));
}
