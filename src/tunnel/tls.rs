//! TLS client configuration for local services that speak HTTPS.
//!
//! Certificates and keys are read from disk each time a configuration is
//! built, so a pairer picks up replaced files on its next attempt.

use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::config::PairerConfig;
use crate::error::TunnelError;

/// Builds the client configuration for one local connection attempt.
pub async fn client_config(config: &PairerConfig) -> Result<ClientConfig, TunnelError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    if config.allow_invalid_cert {
        tracing::debug!("Allowing invalid certificates");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth());
    }

    let roots = match &config.local_ca {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(path).await? {
                roots.add(cert)?;
            }
            roots
        }
        None => RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        },
    };
    let builder = builder.with_root_certificates(roots);

    match (&config.local_cert, &config.local_key) {
        (Some(cert), Some(key)) => {
            let certs = load_certs(cert).await?;
            let key = load_private_key(key).await?;
            Ok(builder.with_client_auth_cert(certs, key)?)
        }
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(TunnelError::InvalidTlsMaterial(
            "local_cert and local_key must be provided together".to_string(),
        )),
    }
}

/// SNI / verification name for the local host.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TunnelError> {
    ServerName::try_from(host.to_string())
        .map_err(|_| TunnelError::InvalidServerName(host.to_string()))
}

async fn read_material(path: &Path) -> Result<Vec<u8>, TunnelError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| TunnelError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })
}

async fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TunnelError> {
    let pem = read_material(path).await?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            TunnelError::InvalidTlsMaterial(format!("{}: {}", path.display(), e))
        })?;

    if certs.is_empty() {
        return Err(TunnelError::InvalidTlsMaterial(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TunnelError> {
    let pem = read_material(path).await?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| TunnelError::InvalidTlsMaterial(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| {
            TunnelError::InvalidTlsMaterial(format!("no private key found in {}", path.display()))
        })
}

/// Verifier used with `allow_invalid_cert`: accepts any certificate chain
/// but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
