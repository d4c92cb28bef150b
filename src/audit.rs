//! Audit copies of signed outgoing envelopes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Writes each signed envelope to `<dir>/<YYYYmmddHHMMSS>-<8 hex>.sig`.
#[derive(Debug, Clone)]
pub struct AuditSink {
    dir: PathBuf,
}

impl AuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(at: DateTime<Utc>, id: Uuid) -> String {
        let suffix = id.simple().to_string();
        format!("{}-{}.sig", at.format("%Y%m%d%H%M%S"), &suffix[..8])
    }

    /// Persists one envelope.
    ///
    /// Failures are logged and swallowed: the copy is a debugging aid and
    /// must never fail the exchange it belongs to.
    pub async fn record(&self, envelope: &[u8], exchange_id: Uuid) -> Option<PathBuf> {
        let path = self.dir.join(Self::file_name(Utc::now(), exchange_id));

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!("Cannot create audit directory {}: {}", self.dir.display(), e);
            return None;
        }
        match tokio::fs::write(&path, envelope).await {
            Ok(()) => {
                tracing::debug!("Saved signed request to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Failed to save signed request to {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let id = Uuid::parse_str("1234abcd-0000-4000-8000-000000000000").unwrap();
        assert_eq!(AuditSink::file_name(at, id), "20240309070501-1234abcd.sig");
    }

    #[tokio::test]
    async fn test_record_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::new(dir.path().join("nested"));
        let path = sink.record(b"signed", Uuid::new_v4()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"signed");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("sig"));
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let sink = AuditSink::new(blocker.join("sub"));
        assert!(sink.record(b"signed", Uuid::new_v4()).await.is_none());
    }
}
