//! TLS connector resolution, done once per connection attempt.

use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_tungstenite::Connector;
use tracing::{debug, info, warn};

use crate::types::TlsPolicy;
use crate::ws_client::WsError;

/// Builds the rustls connector for the given policy.
pub(crate) fn connector_for(policy: &TlsPolicy) -> Result<Connector, WsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| WsError::Tls(e.to_string()))?;

    let config = match policy {
        TlsPolicy::NoVerify => {
            warn!("TLS certificate verification is disabled, the hub connection is not authenticated");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
                .with_no_client_auth()
        }
        TlsPolicy::SystemTrust => {
            info!("verifying hub certificate against the system trust store");
            builder
                .with_root_certificates(system_roots()?)
                .with_no_client_auth()
        }
        TlsPolicy::CustomCa(path) => {
            info!(path = %path.display(), "verifying hub certificate against CA bundle");
            builder
                .with_root_certificates(load_ca_bundle(path)?)
                .with_no_client_auth()
        }
    };

    Ok(Connector::Rustls(Arc::new(config)))
}

fn system_roots() -> Result<RootCertStore, WsError> {
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        debug!("skipping system certificate: {err}");
    }
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    if added == 0 {
        return Err(WsError::Tls(
            "no usable certificates in the system trust store".into(),
        ));
    }
    debug!(added, ignored, "system trust store loaded");
    Ok(roots)
}

fn load_ca_bundle(path: &Path) -> Result<RootCertStore, WsError> {
    let pem = std::fs::read(path)?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        roots.add(cert?).map_err(|e| {
            WsError::Tls(format!("invalid CA certificate in {}: {e}", path.display()))
        })?;
    }
    if roots.is_empty() {
        return Err(WsError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

/// Verifier that accepts any server certificate but still checks handshake
/// signatures.
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
