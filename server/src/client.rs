//! Minimal client for the mobile protocol, used by `sim-client` and the
//! integration tests. One connection, one login, no retries.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use mobile_protocol::{decode_response, encode_credentials, NodeSnapshot};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Builds a connector trusting exactly `roots`.
pub fn build_connector(roots: Vec<CertificateDer<'static>>) -> anyhow::Result<TlsConnector> {
    let mut store = rustls::RootCertStore::empty();
    for cert in roots {
        store
            .add(cert)
            .map_err(|e| anyhow!("invalid CA certificate: {}", e))?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("unsupported TLS protocol versions")?
        .with_root_certificates(store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

pub fn load_ca_certificates(path: &Path) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read CA certificate '{}'", path.display()))?;

    let mut reader = Cursor::new(bytes);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse CA certificate")?;

    if certs.is_empty() {
        bail!("no certificate found in '{}'", path.display());
    }
    Ok(certs)
}

/// Logs in and returns the status tree, or `None` if the server rejected
/// the credentials.
pub async fn fetch_status(
    connector: &TlsConnector,
    addr: SocketAddr,
    server_name: &str,
    username: &str,
    password: &str,
) -> anyhow::Result<Option<NodeSnapshot>> {
    let name = ServerName::try_from(server_name.to_string())
        .with_context(|| format!("invalid server name '{}'", server_name))?;

    let tcp = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let mut stream = connector
        .connect(name, tcp)
        .await
        .context("TLS handshake failed")?;

    let mut request = Vec::new();
    encode_credentials(&mut request, username, password)?;
    stream
        .write_all(&request)
        .await
        .context("failed to send credentials")?;
    stream.flush().await?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .context("failed to read response")?;

    decode_response(response.as_slice()).context("invalid response stream")
}
