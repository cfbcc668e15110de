// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Self-signed and ACME-provisioned X.509 with on-disk caching (spec.md
//! §1, out of scope as a feature, but the gateway's TLS depends on its
//! contract). Certificate and key files are written with mode 0600 via
//! the atomic-file helper and are never logged.

pub mod acme;
pub mod selfsigned;

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("atomic file error: {0}")]
    AtomicFile(#[from] bmc_atomicfile::AtomicFileError),
    #[error("certificate generation failed: {0}")]
    Generation(String),
    #[error("acme provisioning failed: {0}")]
    Acme(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loaded or freshly generated certificate material. The key bytes are
/// intentionally not `Debug`/`Display`-able.
pub struct CertBundle {
    pub cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl CertBundle {
    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }
}

#[cfg(unix)]
pub(crate) fn set_owner_only_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub(crate) fn set_owner_only_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
