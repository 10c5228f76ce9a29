pub mod filters;
mod queries;
pub mod scrub;
mod stash_client;
mod tag_cache;

pub use scrub::scrub_nulls;
pub use stash_client::StashClient;
pub use tag_cache::TagCache;

/// Library gateway error kinds.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// GraphQL-level errors returned alongside a 200
    #[error("library query failed: {0}")]
    Query(String),

    #[error("library returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
