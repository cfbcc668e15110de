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

//! Crash-safe create/update of small files, and the stable per-install
//! UUID built on top of it (spec.md §1, §5, §6, §8). Out of scope as a
//! feature, but every other in-scope service (cert toolkit, operator)
//! depends on its contract, so it gets a real, small implementation.

use std::io;
use std::path::{Path, PathBuf};

use bmc_core::ids::InstallId;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AtomicFileError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("persisted id file at {0} is not a valid UUID")]
    CorruptId(PathBuf),
}

fn io_err(path: &Path, source: io::Error) -> AtomicFileError {
    AtomicFileError::Io { path: path.to_path_buf(), source }
}

/// Write `contents` to `path` such that readers only ever observe either
/// the file's pre-write content or its post-write content -- never a
/// partial write (spec.md §5, §8). The tmpfile lives in the same
/// directory as `path` so the final `rename` is guaranteed atomic on the
/// same filesystem, and no tmpfile survives on the happy path.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), AtomicFileError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).await.map_err(|e| io_err(dir, e))?;
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("atomicfile"),
        Uuid::new_v4()
    ));

    let mut tmp = fs::File::create(&tmp_path).await.map_err(|e| io_err(&tmp_path, e))?;
    tmp.write_all(contents).await.map_err(|e| io_err(&tmp_path, e))?;
    tmp.sync_all().await.map_err(|e| io_err(&tmp_path, e))?;
    drop(tmp);

    let result = fs::rename(&tmp_path, path).await.map_err(|e| io_err(path, e));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

/// Create `path` with `contents` iff it does not already exist, using
/// create-new (`O_EXCL`-equivalent) semantics so concurrent first-creators
/// race for exactly one winner. Returns `Ok(true)` if this call won the
/// race and created the file, `Ok(false)` if another caller already had.
///
/// Resolves spec.md §9's Open Question: losers never error, and both the
/// winner and every loser see the winner's committed content once this
/// returns, satisfying the "concurrent first-invocations resolve to one
/// winner whose value the other sees" property in spec.md §8.
pub async fn create_new_or_read(path: &Path, contents: &[u8]) -> Result<bool, AtomicFileError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).await.map_err(|e| io_err(dir, e))?;
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("atomicfile"),
        Uuid::new_v4()
    ));
    let mut tmp = fs::File::create(&tmp_path).await.map_err(|e| io_err(&tmp_path, e))?;
    tmp.write_all(contents).await.map_err(|e| io_err(&tmp_path, e))?;
    tmp.sync_all().await.map_err(|e| io_err(&tmp_path, e))?;
    drop(tmp);

    match fs::hard_link(&tmp_path, path).await {
        Ok(()) => {
            let _ = fs::remove_file(&tmp_path).await;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let _ = fs::remove_file(&tmp_path).await;
            Ok(false)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await;
            Err(io_err(path, e))
        }
    }
}

/// Load the install's persistent UUID from `dir/name`, creating it with a
/// freshly generated value if absent. Idempotent: repeated calls return
/// the same value (spec.md §6, §8).
pub async fn get_or_create_id(dir: &Path, name: &str) -> Result<InstallId, AtomicFileError> {
    let path = dir.join(name);
    let candidate = Uuid::new_v4();
    let created = create_new_or_read(&path, candidate.to_string().as_bytes()).await?;
    if created {
        debug!(path = %path.display(), id = %candidate, "created persistent id");
    }
    let contents = fs::read_to_string(&path).await.map_err(|e| io_err(&path, e))?;
    let id = contents
        .trim()
        .parse::<Uuid>()
        .map_err(|_| AtomicFileError::CorruptId(path.clone()))?;
    Ok(InstallId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_leaves_no_tmpfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        atomic_write(&path, b"hello").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "hello");
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn get_or_create_id_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = get_or_create_id(dir.path(), "id").await.unwrap();
        let second = get_or_create_id(dir.path(), "id").await.unwrap();
        assert_eq!(first.as_uuid(), second.as_uuid());
    }

    #[tokio::test]
    async fn concurrent_create_resolves_to_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let (a, b) = tokio::join!(
            get_or_create_id(&path, "id"),
            get_or_create_id(&path, "id"),
        );
        assert_eq!(a.unwrap().as_uuid(), b.unwrap().as_uuid());
    }
}
