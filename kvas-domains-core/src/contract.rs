//! # contract: seams between the build pipeline and the outside world
//!
//! The pipeline itself is pure; everything with I/O goes through one of two
//! traits defined here:
//!
//! - [`Fetcher`] retrieves the raw bytes of one upstream list. The production
//!   implementation lives in [`crate::fetch`]; tests use [`MockFetcher`].
//! - [`SnapshotStore`] loads the previous run's [`PreviousBuild`] and stores
//!   the current one. The CLI crate provides a file-backed store.
//!
//! Both traits are annotated for `mockall` so consumers can build
//! deterministic mocks for unit and integration tests.

use async_trait::async_trait;
use mockall::automock;

use crate::state::PreviousBuild;

/// Failure to retrieve one upstream list.
///
/// `status` is set when the server answered with a non-success HTTP status;
/// transport errors and timeouts leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub status: Option<u16>,
    pub message: String,
}

impl FetchError {
    pub fn http(status: u16) -> Self {
        Self {
            status: Some(status),
            message: format!("HTTP {status}"),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self::transport(format!("timed out after {secs}s"))
    }
}

/// Capability to download one list by URL.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw body at `url`. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Failure to read or write the persisted previous-build snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Persistence of the snapshot the next run diffs against.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait SnapshotStore: Send + Sync {
    /// Returns `Ok(None)` on the first run, when nothing was stored yet.
    fn load_previous(&self) -> Result<Option<PreviousBuild>, StoreError>;

    fn store_current(&self, snapshot: &PreviousBuild) -> Result<(), StoreError>;
}
