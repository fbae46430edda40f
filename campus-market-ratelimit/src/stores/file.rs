//! Local filesystem ledger store
//!
//! Each storage identifier maps to `<dir>/<identifier>.json`. Bytes outside
//! `[A-Za-z0-9_-]` are written as `%XX`, so distinct identifiers always get
//! distinct files. Writes go to a uniquely named temporary sibling that is
//! renamed over the target, so a crash never leaves a half-written ledger
//! behind.

use crate::error::{RateLimitError, RateLimitResult};
use crate::ledger::Ledger;
use crate::stores::LedgerStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, trace};

/// Sequence number for temporary file names within this process
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// JSON-file ledger store
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub async fn new(dir: impl AsRef<Path>) -> RateLimitResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            RateLimitError::store(format!(
                "Failed to create ledger directory {:?}: {}",
                dir, e
            ))
        })?;

        info!(path = ?dir, "Initialized file ledger store");

        Ok(Self { dir })
    }

    /// Directory holding the ledger files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a storage identifier
    pub fn path_for(&self, storage_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(storage_key)))
    }
}

/// Map a storage identifier to a safe, collision-free file stem
fn sanitize_key(storage_key: &str) -> String {
    let mut stem = String::with_capacity(storage_key.len());
    for byte in storage_key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "%{:02X}", byte);
        }
    }
    stem
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn load(&self, storage_key: &str) -> RateLimitResult<Ledger> {
        let path = self.path_for(storage_key);
        trace!(path = ?path, "Loading ledger file");

        match fs::read_to_string(&path).await {
            Ok(raw) => Ledger::from_json(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Ledger::default()),
            // Non-UTF-8 content is as unreadable as malformed JSON
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                Err(RateLimitError::corrupt(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, storage_key: &str, ledger: &Ledger) -> RateLimitResult<()> {
        let path = self.path_for(storage_key);
        let json = ledger.to_json()?;
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.tmp.{}.{}", std::process::id(), seq));

        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        trace!(path = ?path, entries = ledger.len(), "Saved ledger file");
        Ok(())
    }

    async fn clear(&self, storage_key: &str) -> RateLimitResult<()> {
        let path = self.path_for(storage_key);
        debug!(path = ?path, "Removing ledger file");

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn store_type(&self) -> &'static str {
        "file"
    }
}
