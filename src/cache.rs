//! Disk cache for fetched source data.
//!
//! One gzip-compressed JSON file per (selector, entity kind). Each file
//! records when it was written and the query key it answers, so a changed
//! query never reads an entry fetched for another one.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Kind of data held by a cache entry. Each kind is cached and invalidated
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Routes,
    Stops,
    ScheduleSource,
}

impl CacheKind {
    fn file_stem(self) -> &'static str {
        match self {
            CacheKind::Routes => "routes",
            CacheKind::Stops => "stops",
            CacheKind::ScheduleSource => "schedule-source",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// Result of looking up a cache entry.
#[derive(Debug, PartialEq)]
pub enum Lookup<T> {
    /// No entry, an entry for another query key, or an unreadable file.
    Missing,
    /// Entry within its maximum age.
    Fresh(T),
    /// Entry older than its maximum age.
    Stale(T),
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    /// Unix timestamp when the entry was written.
    cached_at_secs: u64,
    key: String,
    data: T,
}

/// File-backed cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    namespace: String,
}

impl DiskCache {
    /// `namespace` separates caches of different strategies sharing a directory.
    pub fn new(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.into(),
        }
    }

    pub fn path(&self, kind: CacheKind) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json.gz", self.namespace, kind.file_stem()))
    }

    /// Looks up the entry for `kind` answering `key`.
    ///
    /// Unreadable or corrupt files are reported and treated as missing.
    pub fn load<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        key: &str,
        max_age: Option<Duration>,
    ) -> Lookup<T> {
        let path = self.path(kind);
        if !path.exists() {
            return Lookup::Missing;
        }

        let envelope: Envelope<T> = match read_envelope(&path) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache file");
                return Lookup::Missing;
            }
        };

        if envelope.key != key {
            debug!(%kind, "Cache entry was written for a different query");
            return Lookup::Missing;
        }

        let age = Duration::from_secs(now_secs().saturating_sub(envelope.cached_at_secs));
        match max_age {
            Some(max_age) if age >= max_age => {
                debug!(%kind, age_secs = age.as_secs(), "Cache entry is stale");
                Lookup::Stale(envelope.data)
            }
            _ => Lookup::Fresh(envelope.data),
        }
    }

    /// Writes the entry for `kind`, replacing any previous one.
    ///
    /// Creates the cache directory if it doesn't exist.
    pub fn save<T: Serialize>(&self, kind: CacheKind, key: &str, data: &T) -> Result<()> {
        if !self.dir.as_os_str().is_empty() && !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| Error::Cache {
                message: format!("failed to create cache directory: {e}"),
            })?;
        }

        let envelope = Envelope {
            cached_at_secs: now_secs(),
            key: key.to_string(),
            data,
        };
        let json = serde_json::to_vec(&envelope).map_err(|e| Error::Cache {
            message: format!("failed to serialize {kind}: {e}"),
        })?;

        gzip(&json)
            .and_then(|compressed| std::fs::write(self.path(kind), compressed))
            .map_err(|e| Error::Cache {
                message: format!("failed to write {kind} cache file: {e}"),
            })?;

        debug!(%kind, path = %self.path(kind).display(), "Cache entry written");
        Ok(())
    }
}

fn read_envelope<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Envelope<T>> {
    let file = std::fs::File::open(path)?;
    let mut json = Vec::new();
    GzDecoder::new(file).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
