//! Phase 2: turn a node's links into edges between existing nodes.
//!
//! A link becomes an edge only when its destination has a node record at the
//! moment it is checked (the referential guard). Links to titles outside the
//! graph are suppressed silently. A failure on one link is recorded and the
//! remaining links are still processed.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use linkgraph_shared::LinkGraphError;
use linkgraph_storage::KeyValueStore;

use crate::failure::TitleFailure;

/// A link that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFailure {
    pub destination: String,
    pub failure: TitleFailure,
}

/// What happened to each link of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EdgeOutcome {
    pub title: String,
    /// Destinations now present in the edge aggregate.
    pub added: Vec<String>,
    /// Destinations without a node record.
    pub suppressed: Vec<String>,
    pub failed: Vec<LinkFailure>,
}

impl EdgeOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Materialize the edges of `title`.
///
/// Returns [`TitleFailure::PrecursorMissing`] when `title` has no node record,
/// and [`TitleFailure::Store`] when its links cannot be read. Per-link failures
/// land in [`EdgeOutcome::failed`].
#[instrument(skip(store))]
pub async fn materialize_edges<S>(store: &S, title: &str) -> Result<EdgeOutcome, TitleFailure>
where
    S: KeyValueStore + ?Sized,
{
    let links = match store.get_links(title).await {
        Ok(links) => links,
        Err(LinkGraphError::NodeNotFound { .. }) => return Err(TitleFailure::PrecursorMissing),
        Err(e) => return Err(TitleFailure::store(e)),
    };

    let mut outcome = EdgeOutcome {
        title: title.to_string(),
        ..Default::default()
    };

    for destination in links {
        match store.node_exists(&destination).await {
            Ok(true) => {}
            Ok(false) => {
                outcome.suppressed.push(destination);
                continue;
            }
            Err(e) => {
                warn!(%destination, error = %e, "existence check failed");
                outcome.failed.push(LinkFailure {
                    destination,
                    failure: TitleFailure::store(e),
                });
                continue;
            }
        }

        match store.add_edge(title, &destination).await {
            Ok(write) => {
                debug!(%destination, ?write, "edge written");
                outcome.added.push(destination);
            }
            Err(LinkGraphError::EdgeWriteConflict { attempts, .. }) => {
                warn!(%destination, attempts, "edge write kept conflicting");
                outcome.failed.push(LinkFailure {
                    destination,
                    failure: TitleFailure::EdgeWriteConflict { attempts },
                });
            }
            Err(e) => {
                warn!(%destination, error = %e, "edge write failed");
                outcome.failed.push(LinkFailure {
                    destination,
                    failure: TitleFailure::store(e),
                });
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use linkgraph_storage::MemoryStore;

    use super::*;
    use crate::testing::{ScriptedStore, links, ready_store};

    #[tokio::test]
    async fn links_outside_graph_are_suppressed() {
        let store = ready_store().await;
        store.put_node("A", &links(&["B", "C"])).await.unwrap();
        store.put_node("B", &links(&["A"])).await.unwrap();

        let outcome = materialize_edges(&store, "A").await.unwrap();
        assert_eq!(outcome.added, vec!["B"]);
        assert_eq!(outcome.suppressed, vec!["C"]);
        assert!(outcome.is_clean());
        assert_eq!(store.get_edges("A").await.unwrap(), Some(links(&["B"])));
    }

    #[tokio::test]
    async fn node_without_links_writes_no_aggregate() {
        let store = ready_store().await;
        store.put_node("Lonely", &links(&[])).await.unwrap();

        let outcome = materialize_edges(&store, "Lonely").await.unwrap();
        assert!(outcome.added.is_empty());
        assert_eq!(store.get_edges("Lonely").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_node_is_precursor_missing() {
        let store = ready_store().await;
        let err = materialize_edges(&store, "Ghost").await.unwrap_err();
        assert_eq!(err, TitleFailure::PrecursorMissing);
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_edges() {
        let store = ready_store().await;
        store.put_node("A", &links(&["B"])).await.unwrap();
        store.put_node("B", &links(&[])).await.unwrap();

        materialize_edges(&store, "A").await.unwrap();
        let again = materialize_edges(&store, "A").await.unwrap();
        assert_eq!(again.added, vec!["B"]);
        assert_eq!(store.get_edges("A").await.unwrap(), Some(links(&["B"])));
    }

    #[tokio::test]
    async fn one_bad_link_does_not_stop_the_rest() {
        let inner = MemoryStore::new().with_edge_retry_budget(3);
        let store = ScriptedStore::new(inner)
            .broken_link("B")
            .conflicting_link("C");
        store.ready().await;
        for title in ["A", "B", "C", "D"] {
            store.put_node(title, &links(&[])).await.unwrap();
        }
        store.put_node("A", &links(&["B", "C", "D"])).await.unwrap();

        let outcome = materialize_edges(&store, "A").await.unwrap();
        assert_eq!(outcome.added, vec!["D"]);
        assert_eq!(
            outcome.failed,
            vec![
                LinkFailure {
                    destination: "B".into(),
                    failure: TitleFailure::Store {
                        message: "storage error: injected failure for B".into()
                    },
                },
                LinkFailure {
                    destination: "C".into(),
                    failure: TitleFailure::EdgeWriteConflict { attempts: 3 },
                },
            ]
        );
        assert_eq!(store.get_edges("A").await.unwrap(), Some(links(&["D"])));
    }

    #[tokio::test]
    async fn unreadable_node_is_store_failure() {
        let store = ScriptedStore::unreachable(MemoryStore::new());
        let err = materialize_edges(&store, "A").await.unwrap_err();
        assert!(matches!(err, TitleFailure::Store { .. }));
    }
}
