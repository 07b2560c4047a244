use crate::error::IndexError;
use crate::models::IndexEntry;

/// Nearest-neighbour lookup over place descriptions. Results are ordered
/// nearest first and carry no category information.
pub trait SemanticSearch {
    fn search(&self, query_text: &str, k: usize) -> Result<Vec<IndexEntry>, IndexError>;
}

impl<S: SemanticSearch + ?Sized> SemanticSearch for Box<S> {
    fn search(&self, query_text: &str, k: usize) -> Result<Vec<IndexEntry>, IndexError> {
        (**self).search(query_text, k)
    }
}
