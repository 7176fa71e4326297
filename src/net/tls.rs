//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    Config(#[source] std::io::Error),
}

/// Load TLS configuration from certificate and key files.
///
/// Both files are checked for usable PEM content first so a bad pair fails
/// with a precise error instead of a generic rustls one.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let cert_count = count_certificates(cert_path)?;
    if cert_count == 0 {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }
    if !has_private_key(key_path)? {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(TlsError::Config)?;

    tracing::info!(cert = ?cert_path, certificates = cert_count, "TLS configuration loaded");
    Ok(config)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn count_certificates(path: &Path) -> Result<usize, TlsError> {
    let mut reader = open(path)?;
    let count = rustls_pemfile::certs(&mut reader)
        .try_fold(0, |n, cert| cert.map(|_| n + 1))
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        });
    count
}

fn has_private_key(path: &Path) -> Result<bool, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map(|key| key.is_some())
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_read_error() {
        let err = load_tls_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
    }

    #[tokio::test]
    async fn pem_without_certificates_is_rejected() {
        let path = std::env::temp_dir().join(format!("trace-proxy-empty-{}.pem", std::process::id()));
        std::fs::write(&path, "not a certificate\n").unwrap();

        let err = load_tls_config(&path, &path).await.unwrap_err();
        std::fs::remove_file(&path).unwrap_or_default();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[test]
    fn counts_every_certificate_block() {
        let path = std::env::temp_dir().join(format!("trace-proxy-chain-{}.pem", std::process::id()));
        let block = "-----BEGIN CERTIFICATE-----\nAAECAwQFBgcI\n-----END CERTIFICATE-----\n";
        std::fs::write(&path, format!("{block}{block}")).unwrap();

        let count = count_certificates(&path);
        std::fs::remove_file(&path).unwrap_or_default();
        assert_eq!(count.unwrap(), 2);
    }
}
