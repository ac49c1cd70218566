use std::io::Cursor;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// Certificate chain plus private key served to clients.
#[derive(Debug)]
pub struct TlsMaterial {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Loads PEM material, or generates a self-signed `localhost` certificate
/// when no `[tls]` section is configured.
pub fn load_tls_material(tls: Option<&TlsConfig>) -> anyhow::Result<TlsMaterial> {
    match tls {
        Some(config) => read_pem_material(config),
        None => self_signed_material(),
    }
}

pub fn build_acceptor(material: TlsMaterial) -> anyhow::Result<TlsAcceptor> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("unsupported TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(material.cert_chain, material.key)
        .context("invalid TLS material for mobile listener")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn read_pem_material(config: &TlsConfig) -> anyhow::Result<TlsMaterial> {
    let cert_pem = std::fs::read(&config.cert).with_context(|| {
        format!(
            "cannot read mobile listener certificate '{}'",
            config.cert.display()
        )
    })?;
    let key_pem = std::fs::read(&config.key).with_context(|| {
        format!(
            "cannot read mobile listener private key '{}'",
            config.key.display()
        )
    })?;

    let cert_chain = rustls_pemfile::certs(&mut Cursor::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("malformed PEM in '{}'", config.cert.display()))?;
    if cert_chain.is_empty() {
        bail!(
            "'{}' holds no certificate for the mobile listener",
            config.cert.display()
        );
    }

    let key = rustls_pemfile::private_key(&mut Cursor::new(key_pem))
        .with_context(|| format!("malformed PEM in '{}'", config.key.display()))?
        .ok_or_else(|| anyhow!("'{}' holds no private key", config.key.display()))?;

    Ok(TlsMaterial { cert_chain, key })
}

/// Development fallback for deployments without a `[tls]` section.
fn self_signed_material() -> anyhow::Result<TlsMaterial> {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .context("cannot generate a self-signed certificate for the mobile listener")?;

    Ok(TlsMaterial {
        cert_chain: vec![certified.cert.der().clone()],
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        )),
    })
}
