use std::path::{Path, PathBuf};

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use tracing::info;

use crate::{set_owner_only_mode, CertBundle, CertError};

/// Load a self-signed cert/key pair from `cert_path`/`key_path` if present,
/// generating and atomically writing a fresh one (valid for `hostname`)
/// otherwise. Matches S1's expectation that both files exist with mode
/// 0600 after the gateway starts.
pub async fn load_or_generate(
    hostname: &str,
    cert_path: &Path,
    key_path: &Path,
) -> Result<CertBundle, CertError> {
    if cert_path.exists() && key_path.exists() {
        let cert_pem = tokio::fs::read(cert_path).await?;
        let key_pem = tokio::fs::read(key_path).await?;
        return Ok(CertBundle {
            cert_pem,
            key_pem,
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
        });
    }

    info!(hostname, "generating self-signed certificate");
    let bundle = generate(hostname, cert_path, key_path)?;

    bmc_atomicfile::atomic_write(cert_path, &bundle.cert_pem).await?;
    bmc_atomicfile::atomic_write(key_path, &bundle.key_pem).await?;
    set_owner_only_mode(cert_path)?;
    set_owner_only_mode(key_path)?;

    Ok(bundle)
}

fn generate(hostname: &str, cert_path: &Path, key_path: &Path) -> Result<CertBundle, CertError> {
    let mut params = CertificateParams::new(vec![hostname.to_owned()])
        .map_err(|e| CertError::Generation(e.to_string()))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, hostname);
    params.distinguished_name = dn;

    let key_pair = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok(CertBundle {
        cert_pem: cert.pem().into_bytes(),
        key_pem: key_pair.serialize_pem().into_bytes(),
        cert_path: cert_path.to_path_buf(),
        key_path: key_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_and_caches_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");

        let bundle = load_or_generate("localhost", &cert_path, &key_path).await.unwrap();
        assert!(!bundle.cert_pem.is_empty());
        assert!(cert_path.exists());
        assert!(key_path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&cert_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        // Second call reuses the cached copy rather than regenerating.
        let reloaded = load_or_generate("localhost", &cert_path, &key_path).await.unwrap();
        assert_eq!(bundle.cert_pem, reloaded.cert_pem);
    }
}
