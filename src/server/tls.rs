use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls::ServerConfig;
use rustls_pemfile::{ certs, pkcs8_private_keys };
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

pub fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let key = match pkcs8_private_keys(&mut key_reader).next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

/// Both paths when TLS is enabled, `None` when it is not.
pub fn tls_paths(
    enable_tls: bool,
    cert_path: &Option<String>,
    key_path: &Option<String>
) -> Result<Option<(String, String)>, Box<dyn Error + Send + Sync>> {
    if !enable_tls {
        return Ok(None);
    }
    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some((cert.clone(), key.clone()))),
        (Some(_), None) | (None, Some(_)) =>
            Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into()),
        (None, None) => Err("--enable-tls was set but no certificate/key paths provided.".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_paths_require_both_files() {
        assert!(tls_paths(false, &None, &None).unwrap().is_none());
        assert!(tls_paths(true, &Some("cert.pem".into()), &None).is_err());
        assert!(tls_paths(true, &None, &None).is_err());
        assert_eq!(
            tls_paths(true, &Some("c.pem".into()), &Some("k.pem".into())).unwrap(),
            Some(("c.pem".to_string(), "k.pem".to_string()))
        );
    }

    #[test]
    fn test_missing_certificate_file_is_reported() {
        let err = load_tls_config("/nonexistent/cert.pem", "/nonexistent/key.pem").unwrap_err();
        assert!(err.to_string().contains("Failed to open TLS certificate file"));
    }
}
