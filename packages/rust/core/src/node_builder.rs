//! Phase 1: fetch one title's links and write its node record.

use tracing::{debug, instrument};

use linkgraph_crawler::LinkSource;
use linkgraph_storage::KeyValueStore;

use crate::failure::TitleFailure;

/// A node record that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltNode {
    pub title: String,
    pub resolved_title: String,
    pub link_count: usize,
}

/// Fetch `title` from `source` and store its node.
///
/// Nothing is written when the fetch fails. A successful fetch with no links
/// still produces a node with an empty link set.
#[instrument(skip(store, source), fields(link_source = source.name()))]
pub async fn build_node<S>(
    store: &S,
    source: &dyn LinkSource,
    title: &str,
) -> Result<BuiltNode, TitleFailure>
where
    S: KeyValueStore + ?Sized,
{
    let article = source.fetch(title).await?;

    if article.resolved_title != article.title {
        debug!(resolved = %article.resolved_title, "title resolved by source");
    }

    store
        .put_node(&article.title, &article.links)
        .await
        .map_err(TitleFailure::store)?;

    debug!(links = article.links.len(), "node written");
    Ok(BuiltNode {
        link_count: article.links.len(),
        title: article.title,
        resolved_title: article.resolved_title,
    })
}

#[cfg(test)]
mod tests {
    use linkgraph_crawler::FetchError;
    use linkgraph_shared::LinkSet;
    use linkgraph_storage::MemoryStore;

    use super::*;
    use crate::testing::{ScriptedStore, StaticSource, links, ready_store};

    #[tokio::test]
    async fn writes_node_with_fetched_links() {
        let store = ready_store().await;
        let source = StaticSource::new().page("A", &["B", "C"]);

        let built = build_node(&store, &source, "A").await.unwrap();
        assert_eq!(built.link_count, 2);
        assert_eq!(store.get_links("A").await.unwrap(), links(&["B", "C"]));
    }

    #[tokio::test]
    async fn empty_link_set_still_creates_node() {
        let store = ready_store().await;
        let source = StaticSource::new().page("Stub", &[]);

        build_node(&store, &source, "Stub").await.unwrap();
        assert!(store.node_exists("Stub").await.unwrap());
        assert_eq!(store.get_links("Stub").await.unwrap(), LinkSet::new());
    }

    #[tokio::test]
    async fn redirected_title_is_stored_under_requested_key() {
        let store = ready_store().await;
        let source = StaticSource::new().redirect("Rust lang", "Rust (programming language)", &["Mozilla"]);

        let built = build_node(&store, &source, "Rust lang").await.unwrap();
        assert_eq!(built.resolved_title, "Rust (programming language)");
        assert!(store.node_exists("Rust lang").await.unwrap());
        assert!(!store.node_exists("Rust (programming language)").await.unwrap());
    }

    #[tokio::test]
    async fn fetch_failures_write_nothing() {
        let store = ready_store().await;
        let source = StaticSource::new()
            .failing(
                "T",
                FetchError::Transient {
                    title: "T".into(),
                    message: "HTTP 503".into(),
                },
            )
            .failing(
                "P",
                FetchError::Parse {
                    title: "P".into(),
                    message: "truncated".into(),
                },
            );

        let err = build_node(&store, &source, "Missing").await.unwrap_err();
        assert_eq!(err, TitleFailure::FetchNotFound);

        let err = build_node(&store, &source, "T").await.unwrap_err();
        assert!(matches!(err, TitleFailure::FetchTransient { ref message } if message == "HTTP 503"));

        let err = build_node(&store, &source, "P").await.unwrap_err();
        assert!(matches!(err, TitleFailure::FetchParseError { .. }));

        assert!(store.scan_all(linkgraph_shared::Table::Nodes).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = ScriptedStore::unreachable(MemoryStore::new());
        let source = StaticSource::new().page("A", &["B"]);

        let err = build_node(&store, &source, "A").await.unwrap_err();
        assert!(matches!(err, TitleFailure::Store { .. }));
    }
}
