//! Content source trait.
//!
//! The registry never touches the filesystem itself; it asks a
//! [`ContentSource`] for raw documents. The filesystem implementation lives
//! in `capsmith-infra`.

use std::future::Future;

use capsmith_types::error::SourceError;

use super::RawDocument;

/// Produces the raw descriptor documents a registry is built from.
///
/// Uses RPITIT for the async method. Implementations must be cheap to call
/// repeatedly: every reload fetches a fresh document set.
pub trait ContentSource: Send + Sync {
    /// Read every descriptor document currently available.
    fn fetch(&self) -> impl Future<Output = Result<Vec<RawDocument>, SourceError>> + Send;

    /// Human-readable location, for logs and error messages.
    fn location(&self) -> String;
}

/// A fixed set of documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    documents: Vec<RawDocument>,
}

impl InMemorySource {
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self { documents }
    }
}

impl ContentSource for InMemorySource {
    async fn fetch(&self) -> Result<Vec<RawDocument>, SourceError> {
        Ok(self.documents.clone())
    }

    fn location(&self) -> String {
        format!("memory ({} documents)", self.documents.len())
    }
}
