use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::config::ListenerConfig;
use crate::error::{MobileServerError, Result};
use crate::lifecycle::WorkerClaim;
use crate::session::{serve_connection, SessionContext};

/// Owns one listening socket and hands every connection to its own task.
pub struct Acceptor {
    listener: TcpListener,
    tls: TlsAcceptor,
    context: Arc<SessionContext>,
}

impl Acceptor {
    pub async fn bind(
        config: &ListenerConfig,
        tls: TlsAcceptor,
        context: Arc<SessionContext>,
    ) -> Result<Self> {
        let addr = resolve_bind_address(config).await?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;

        Ok(Self {
            listener,
            tls,
            context,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts until stopped or superseded.
    ///
    /// Returns `Ok(())` on a clean exit; an accept error is returned so the
    /// caller can drop this socket and back off. Sessions already dispatched
    /// keep running either way.
    pub async fn run(
        &self,
        claim: &WorkerClaim,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if !claim.is_authoritative() {
                return Ok(());
            }

            let (socket, peer) = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return Ok(()),
                accepted = self.listener.accept() => accepted?,
            };

            if !claim.is_authoritative() {
                log::debug!("worker {} superseded, dropping connection from {}", claim.id(), peer);
                return Ok(());
            }

            tokio::spawn(serve_connection(
                socket,
                peer,
                self.tls.clone(),
                self.context.clone(),
            ));
        }
    }
}

async fn resolve_bind_address(config: &ListenerConfig) -> Result<SocketAddr> {
    match &config.bind_address {
        None => Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port))),
        Some(host) => lookup_host((host.as_str(), config.port))
            .await?
            .next()
            .ok_or_else(|| MobileServerError::UnresolvedAddress(host.clone())),
    }
}
