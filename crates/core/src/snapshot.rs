use crate::models::{Place, QueryIntent};
use crate::retriever::RetrieverService;
use crate::semantic::SemanticIndex;
use crate::traits::SemanticSearch;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Shares one immutable [`RetrieverService`] between request handlers and
/// lets a rebuilt service replace it in a single step. A query always runs
/// against exactly one catalog and index pair.
pub struct SharedRetriever<S = SemanticIndex>
where
    S: SemanticSearch,
{
    current: RwLock<Arc<RetrieverService<S>>>,
}

impl<S> SharedRetriever<S>
where
    S: SemanticSearch,
{
    pub fn new(service: RetrieverService<S>) -> Self {
        Self {
            current: RwLock::new(Arc::new(service)),
        }
    }

    pub fn snapshot(&self) -> Arc<RetrieverService<S>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in `service` and returns the one it replaced. In-flight queries
    /// finish on the old snapshot.
    pub fn replace(&self, service: RetrieverService<S>) -> Arc<RetrieverService<S>> {
        let next = Arc::new(service);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!(places = next.catalog().len(), "retriever snapshot replaced");
        std::mem::replace(&mut *guard, next)
    }

    pub fn retrieve(&self, intent: &QueryIntent) -> Vec<Place> {
        self.snapshot().retrieve(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::error::IndexError;
    use crate::models::{IndexEntry, SourceKind};

    struct NoSemantic;

    impl SemanticSearch for NoSemantic {
        fn search(&self, _query_text: &str, _k: usize) -> Result<Vec<IndexEntry>, IndexError> {
            Ok(Vec::new())
        }
    }

    fn service_with(names: &[&str]) -> RetrieverService<NoSemantic> {
        let places: Vec<Place> = names
            .iter()
            .map(|name| {
                serde_json::from_value(serde_json::json!({"name": name, "address": "Hai Chau"}))
                    .expect("place")
            })
            .collect();
        let catalog =
            Catalog::from_sources(vec![("places".to_string(), SourceKind::General, places)]);
        RetrieverService::new(catalog, Some(NoSemantic))
    }

    fn in_hai_chau() -> QueryIntent {
        let mut intent = QueryIntent::new("in hai chau");
        intent.location_filter = Some("hai chau".to_string());
        intent
    }

    #[test]
    fn held_snapshot_survives_replacement() {
        let shared = SharedRetriever::new(service_with(&["Han Market"]));
        let before = shared.snapshot();

        let old = shared.replace(service_with(&["Han Market", "Con Market"]));

        assert_eq!(before.retrieve(&in_hai_chau()).len(), 1);
        assert_eq!(old.retrieve(&in_hai_chau()).len(), 1);
        assert_eq!(shared.retrieve(&in_hai_chau()).len(), 2);
    }
}
