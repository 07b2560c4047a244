pub mod catalog;
pub mod embeddings;
pub mod error;
pub mod geo;
pub mod intent;
pub mod models;
pub mod retriever;
pub mod semantic;
pub mod snapshot;
pub mod traits;

pub use catalog::{discover_sources, load_catalog, read_places, Catalog, CatalogReport, SkippedSource};
pub use embeddings::{Embedder, HttpEmbedder, TrigramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CatalogError, EmbedError, IndexError, IntentError};
pub use geo::{haversine_distance_km, EARTH_RADIUS_KM};
pub use intent::{parse, IntentParser};
pub use models::{
    DataSource, FallbackReason, IndexEntry, Place, QueryIntent, Retrieval, RetrievalStrategy,
    RetrieverOptions, SortBy, SourceKind, DEFAULT_TOP_K, GENERIC_ENTITY_TYPE, MAX_TOP_K,
};
pub use retriever::RetrieverService;
pub use semantic::{ArtifactPaths, BoxedEmbedder, FlatL2Index, SemanticIndex};
pub use snapshot::SharedRetriever;
pub use traits::SemanticSearch;
