// ============================================
// Metadata Lookup
// ============================================
//
// Optional on-demand enrichment for events whose history record carries
// no genre/actor/director data. The normalizer holds an implementation
// behind `Option<Arc<dyn MetadataLookup>>`; absence or failure is never
// fatal to an analysis.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Category metadata for one piece of content, fields exactly as the
/// upstream returned them. Shapes vary by server version (plain strings,
/// tagged objects, comma-joined strings); the event normalizer interprets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentMetadata {
    pub genres: Value,
    pub actors: Value,
    pub directors: Value,
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Fetch category metadata for a content id. `Ok(None)` means the id
    /// is unknown upstream; callers treat errors the same way.
    async fn lookup(&self, content_id: &str) -> Result<Option<ContentMetadata>>;
}

/// Lookup that knows nothing. Used in tests and when enrichment is
/// disabled.
pub struct StubMetadataLookup;

#[async_trait]
impl MetadataLookup for StubMetadataLookup {
    async fn lookup(&self, _content_id: &str) -> Result<Option<ContentMetadata>> {
        Ok(None)
    }
}
