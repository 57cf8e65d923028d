pub mod llm;
pub mod metadata;
pub mod overseerr;
pub mod tautulli;

pub use llm::CardGenerator;
pub use metadata::{ContentMetadata, MetadataLookup};
pub use overseerr::OverseerrClient;
pub use tautulli::TautulliClient;
