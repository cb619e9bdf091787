//! Link sources: where a title's outbound links come from.
//!
//! This crate provides:
//! - [`LinkSource`]: the contract used by the node builder
//! - [`FetchError`]: the failure taxonomy every source reports in
//! - [`WikipediaClient`]: a MediaWiki `action=query&prop=links` implementation

pub mod wikipedia;

use async_trait::async_trait;
use linkgraph_shared::LinkSet;

pub use wikipedia::WikipediaClient;

/// Outbound links of one article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArticle {
    /// Key the node is stored under: the title that was asked for.
    pub title: String,
    /// Title the source resolved it to (differs after a redirect or normalisation).
    pub resolved_title: String,
    /// Outbound links; may be empty.
    pub links: LinkSet,
}

/// Why a fetch produced no article.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The source has no article under this title.
    #[error("article not found: {title:?}")]
    NotFound { title: String },

    /// Network failure, timeout, throttling or a server-side error; may succeed later.
    #[error("transient failure fetching {title:?}: {message}")]
    Transient { title: String, message: String },

    /// The response arrived but could not be interpreted.
    #[error("unusable response for {title:?}: {message}")]
    Parse { title: String, message: String },
}

impl FetchError {
    /// Title the failed fetch was for.
    pub fn title(&self) -> &str {
        match self {
            Self::NotFound { title } | Self::Transient { title, .. } | Self::Parse { title, .. } => {
                title
            }
        }
    }
}

/// Crawl collaborator: resolves a title to its outbound link set.
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Fetch the outbound links of `title`.
    async fn fetch(&self, title: &str) -> Result<FetchedArticle, FetchError>;

    /// Human-readable source name for tracing.
    fn name(&self) -> &str;
}
