// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! TLS contexts for the HTTP plane (rustls).
//!
//! Chain validation is delegated to rustls against `webpki-roots` plus any
//! configured site anchors; the SDC-specific trust predicate then runs over
//! the validated peer's subject and subject-alternative names.

use super::{TransportError, TrustPredicate};
use crate::config::TlsSettings;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::sync::Arc;

/// Subject and SAN entries of a validated TLS peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    /// RFC 2253 rendering of the certificate subject.
    pub subject: String,
    pub san_dns: Vec<String>,
    pub san_uris: Vec<String>,
}

/// Client-side TLS context shared by the connection pool.
pub struct TlsClientContext {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) predicate: Option<TrustPredicate>,
}

/// Server-side TLS context shared by the accept loop.
pub struct TlsServerContext {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) predicate: Option<TrustPredicate>,
    pub(crate) mutual: bool,
}

fn tls_err(detail: impl std::fmt::Display) -> TransportError {
    TransportError::Tls(detail.to_string())
}

fn root_store(settings: &TlsSettings) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for pem in &settings.extra_roots_pem {
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(tls_err)?;
            roots.add(cert).map_err(tls_err)?;
        }
    }
    Ok(roots)
}

fn identity(
    settings: &TlsSettings,
) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>, TransportError> {
    let (Some(chain_pem), Some(key_pem)) = (&settings.cert_chain_pem, &settings.private_key_pem)
    else {
        return Ok(None);
    };
    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(chain_pem)
        .collect::<Result<_, _>>()
        .map_err(tls_err)?;
    if certs.is_empty() {
        return Err(tls_err("no certificates in configured chain"));
    }
    let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(tls_err)?;
    Ok(Some((certs, key)))
}

/// Build the client context for `tls_mode != off`.
pub fn build_client_context(settings: &TlsSettings) -> Result<TlsClientContext, TransportError> {
    let roots = root_store(settings)?;
    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match identity(settings)? {
        Some((certs, key)) => builder.with_client_auth_cert(certs, key).map_err(tls_err)?,
        None => builder.with_no_client_auth(),
    };
    Ok(TlsClientContext {
        config: Arc::new(config),
        predicate: settings.trust_predicate.clone(),
    })
}

/// Build the server context; `mutual` demands and validates client
/// certificates.
pub fn build_server_context(
    settings: &TlsSettings,
    mutual: bool,
) -> Result<TlsServerContext, TransportError> {
    let (certs, key) = identity(settings)?
        .ok_or_else(|| tls_err("server TLS requires a certificate and key"))?;
    let builder = if mutual {
        let roots = Arc::new(root_store(settings)?);
        let verifier = rustls::server::WebPkiClientVerifier::builder(roots)
            .build()
            .map_err(tls_err)?;
        ServerConfig::builder().with_client_cert_verifier(verifier)
    } else {
        ServerConfig::builder().with_no_client_auth()
    };
    let config = builder.with_single_cert(certs, key).map_err(tls_err)?;
    Ok(TlsServerContext {
        config: Arc::new(config),
        predicate: settings.trust_predicate.clone(),
        mutual,
    })
}

/// Extract subject and SANs from the peer's end-entity certificate.
#[must_use]
pub fn peer_identity(certs: &[CertificateDer<'_>]) -> Option<PeerIdentity> {
    let leaf = certs.first()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(leaf.as_ref()).ok()?;
    let mut identity = PeerIdentity {
        subject: parsed.subject().to_string(),
        ..PeerIdentity::default()
    };
    if let Ok(Some(san)) = parsed.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                x509_parser::extensions::GeneralName::DNSName(dns) => {
                    identity.san_dns.push((*dns).to_string());
                }
                x509_parser::extensions::GeneralName::URI(uri) => {
                    identity.san_uris.push((*uri).to_string());
                }
                _ => {}
            }
        }
    }
    Some(identity)
}

/// Apply the trust predicate to a completed handshake's peer certificates.
///
/// With no predicate configured, any chain-valid peer passes. A peer that
/// presented no certificate fails only in mutual mode (rustls has already
/// rejected it there, this is the second line).
pub(crate) fn check_peer(
    predicate: Option<&TrustPredicate>,
    certs: Option<&[CertificateDer<'_>]>,
    mutual: bool,
) -> Result<(), TransportError> {
    let Some(predicate) = predicate else {
        return Ok(());
    };
    let identity = certs.and_then(peer_identity);
    match identity {
        Some(id) => {
            if predicate(&id) {
                Ok(())
            } else {
                Err(tls_err(format!("peer \"{}\" rejected by trust predicate", id.subject)))
            }
        }
        None if mutual => Err(tls_err("peer presented no certificate")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_predicate_accepts_anything() {
        assert!(check_peer(None, None, true).is_ok());
    }

    #[test]
    fn predicate_rejection_is_tls_error() {
        let predicate: TrustPredicate = Arc::new(|_id: &PeerIdentity| false);
        // No certificate in mutual mode is rejected before the predicate runs.
        let err = check_peer(Some(&predicate), None, true).expect_err("rejected");
        assert!(matches!(err, TransportError::Tls(_)));
        // No certificate in server-only mode passes (nothing to judge).
        assert!(check_peer(Some(&predicate), None, false).is_ok());
    }
}
