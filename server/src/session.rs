//! One login exchange per accepted connection.
//!
//! Steps, strictly in order: read username, read password, authenticate,
//! write the compressed response, close. Failures end only this session.

use std::net::SocketAddr;
use std::sync::Arc;

use mobile_protocol::{decode_modified_utf8, encode_response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use uuid::Uuid;

use crate::error::Result;
use crate::monitor::{Monitor, RootNode};

/// State shared by every session of a server.
pub struct SessionContext {
    monitor: Arc<dyn Monitor>,
    locale: String,
}

impl SessionContext {
    pub fn new(monitor: Arc<dyn Monitor>, locale: impl Into<String>) -> Self {
        Self {
            monitor,
            locale: locale.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Login succeeded and a tree of `nodes` nodes was sent.
    Authenticated { nodes: usize },
    /// Login failed; a single `false` flag was sent.
    Rejected,
}

/// Completes the TLS handshake for `socket` and runs one session on it.
///
/// Every error is logged here; nothing propagates to the acceptor.
pub async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    tls: TlsAcceptor,
    context: Arc<SessionContext>,
) {
    let session_id = Uuid::new_v4();
    log::debug!("[{}] connection from {}", session_id, peer);

    let stream = match tls.accept(socket).await {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("[{}] TLS handshake with {} failed: {}", session_id, peer, err);
            return;
        }
    };

    match handle_session(stream, &context).await {
        Ok(SessionOutcome::Authenticated { nodes }) => {
            log::debug!("[{}] sent {} nodes to {}", session_id, nodes, peer);
        }
        Ok(SessionOutcome::Rejected) => {
            log::debug!("[{}] rejected login from {}", session_id, peer);
        }
        Err(err) => {
            log::error!("[{}] session with {} failed: {}", session_id, peer, err);
        }
    }
}

/// Runs the exchange on an established stream and closes it afterwards,
/// whether or not the exchange succeeded.
pub async fn handle_session<S>(mut stream: S, context: &SessionContext) -> Result<SessionOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = exchange(&mut stream, context).await;
    if let Err(err) = stream.shutdown().await {
        log::debug!("session stream did not close cleanly: {}", err);
    }
    result
}

async fn exchange<S>(stream: &mut S, context: &SessionContext) -> Result<SessionOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let username = read_utf(stream).await?;
    let password = read_utf(stream).await?;

    let (response, outcome) = match authenticate(context, &username, password).await? {
        Some(root) => {
            // Snapshot and encoding both happen off the reactor; a protocol
            // limit error here means no bytes are sent at all.
            let (response, nodes) = tokio::task::spawn_blocking(move || -> Result<_> {
                let tree = root.snapshot()?;
                let nodes = tree.node_count();
                Ok((encode_response(Some(&tree))?, nodes))
            })
            .await??;
            (response, SessionOutcome::Authenticated { nodes })
        }
        None => (encode_response(None)?, SessionOutcome::Rejected),
    };

    stream.write_all(&response).await?;
    stream.flush().await?;
    Ok(outcome)
}

/// Returns `None` for every login failure; the cause is only logged.
async fn authenticate(
    context: &SessionContext,
    username: &str,
    password: String,
) -> Result<Option<Arc<dyn RootNode>>> {
    let monitor = context.monitor.clone();
    let locale = context.locale.clone();
    let login_name = username.to_string();

    let login =
        tokio::task::spawn_blocking(move || monitor.login(&locale, &login_name, &password))
            .await?;

    match login {
        Ok(root) => Ok(Some(root)),
        Err(err) => {
            log::warn!("Authentication failed for user {}: {}", username, err);
            Ok(None)
        }
    }
}

async fn read_utf<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16().await?;
    let mut buffer = vec![0u8; usize::from(len)];
    reader.read_exact(&mut buffer).await?;
    Ok(decode_modified_utf8(&buffer)?)
}
