//! Flat L2 nearest-neighbour index over place description embeddings.
//!
//! The index is persisted as two JSON artifacts written side by side: the
//! vectors, and the position-to-place mapping. Both carry the same build id,
//! and the mapping records a checksum of the vectors plus a fingerprint of the
//! catalog it was built from. Loading refuses any pair that does not line up,
//! so a stale or half-written index never silently answers queries.

use crate::catalog::Catalog;
use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::models::IndexEntry;
use crate::traits::SemanticSearch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const INDEX_FILE_NAME: &str = "semantic_index.json";
pub const MAPPING_FILE_NAME: &str = "semantic_mapping.json";

pub type BoxedEmbedder = Box<dyn Embedder + Send + Sync>;

/// Brute-force index: every query scans every vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a vector and returns its position.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        self.check_dimensions(vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Positions of the `k` nearest vectors with their squared L2 distance,
    /// nearest first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        self.check_dimensions(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors()
            .enumerate()
            .map(|(position, vector)| (position, squared_l2(query, vector)))
            .collect();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.0.cmp(&right.0)));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimensions.max(1))
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.dimensions as u64).to_le_bytes());
        for value in &self.data {
            hasher.update(value.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::Dimension {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexArtifact {
    build_id: Uuid,
    built_at: DateTime<Utc>,
    dimensions: usize,
    // f64 on disk so every f32 survives the JSON round trip exactly.
    vectors: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingArtifact {
    build_id: Uuid,
    built_at: DateTime<Utc>,
    dimensions: usize,
    catalog_fingerprint: String,
    index_checksum: String,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub mapping: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            index: dir.join(INDEX_FILE_NAME),
            mapping: dir.join(MAPPING_FILE_NAME),
        }
    }
}

pub struct SemanticIndex {
    build_id: Uuid,
    built_at: DateTime<Utc>,
    catalog_fingerprint: String,
    index: FlatL2Index,
    entries: Vec<IndexEntry>,
    embedder: BoxedEmbedder,
}

impl SemanticIndex {
    /// Embeds every place in catalog order. Position `i` in the index is the
    /// `i`-th catalog place.
    pub fn build(catalog: &Catalog, embedder: BoxedEmbedder) -> Result<Self, IndexError> {
        let mut index = FlatL2Index::new(embedder.dimensions());
        let mut entries = Vec::with_capacity(catalog.len());

        for place in catalog.places() {
            let vector = embedder.embed(&place.embedding_text())?;
            index.add(&vector)?;
            entries.push(IndexEntry {
                name: place.name.clone(),
                source: place.source_file.clone(),
            });
        }

        let built = Self {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            catalog_fingerprint: catalog.fingerprint(),
            index,
            entries,
            embedder,
        };
        info!(build_id = %built.build_id, entries = built.len(), "semantic index built");
        Ok(built)
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Writes both artifacts to temporary names first, then renames them into
    /// place.
    pub fn save(&self, dir: &Path) -> Result<ArtifactPaths, IndexError> {
        fs::create_dir_all(dir)?;
        let paths = ArtifactPaths::in_dir(dir);

        let index_artifact = IndexArtifact {
            build_id: self.build_id,
            built_at: self.built_at,
            dimensions: self.index.dimensions(),
            vectors: self
                .index
                .vectors()
                .map(|vector| vector.iter().map(|value| *value as f64).collect())
                .collect(),
        };
        let mapping_artifact = MappingArtifact {
            build_id: self.build_id,
            built_at: self.built_at,
            dimensions: self.index.dimensions(),
            catalog_fingerprint: self.catalog_fingerprint.clone(),
            index_checksum: self.index.checksum(),
            entries: self.entries.clone(),
        };

        let index_tmp = with_tmp_suffix(&paths.index);
        let mapping_tmp = with_tmp_suffix(&paths.mapping);
        fs::write(&index_tmp, serde_json::to_vec(&index_artifact)?)?;
        fs::write(&mapping_tmp, serde_json::to_vec_pretty(&mapping_artifact)?)?;
        fs::rename(&index_tmp, &paths.index)?;
        fs::rename(&mapping_tmp, &paths.mapping)?;

        info!(
            build_id = %self.build_id,
            index = %paths.index.display(),
            mapping = %paths.mapping.display(),
            "semantic index saved"
        );
        Ok(paths)
    }

    /// Reads and cross-checks both artifacts against each other, the
    /// embedder, and the catalog they are meant to describe.
    pub fn load(dir: &Path, embedder: BoxedEmbedder, catalog: &Catalog) -> Result<Self, IndexError> {
        let paths = ArtifactPaths::in_dir(dir);
        let index_artifact: IndexArtifact = read_artifact(&paths.index)?;
        let mapping: MappingArtifact = read_artifact(&paths.mapping)?;

        if index_artifact.build_id != mapping.build_id {
            return Err(IndexError::Mismatch(format!(
                "index build {} paired with mapping build {}",
                index_artifact.build_id, mapping.build_id
            )));
        }

        if index_artifact.dimensions != mapping.dimensions {
            return Err(IndexError::Mismatch(format!(
                "index dimension {} but mapping dimension {}",
                index_artifact.dimensions, mapping.dimensions
            )));
        }

        if index_artifact.dimensions != embedder.dimensions() {
            return Err(IndexError::Dimension {
                expected: embedder.dimensions(),
                actual: index_artifact.dimensions,
            });
        }

        if index_artifact.vectors.len() != mapping.entries.len() {
            return Err(IndexError::Mismatch(format!(
                "{} vectors but {} mapping entries",
                index_artifact.vectors.len(),
                mapping.entries.len()
            )));
        }

        let mut index = FlatL2Index::new(index_artifact.dimensions);
        for vector in &index_artifact.vectors {
            let narrowed: Vec<f32> = vector.iter().map(|value| *value as f32).collect();
            index.add(&narrowed)?;
        }

        if index.checksum() != mapping.index_checksum {
            return Err(IndexError::Mismatch(
                "vector checksum differs from the one recorded in the mapping".to_string(),
            ));
        }

        let current = catalog.fingerprint();
        if current != mapping.catalog_fingerprint {
            return Err(IndexError::Mismatch(format!(
                "index built for catalog {} but current catalog is {}",
                short(&mapping.catalog_fingerprint),
                short(&current)
            )));
        }

        info!(build_id = %mapping.build_id, entries = mapping.entries.len(), "semantic index loaded");
        Ok(Self {
            build_id: mapping.build_id,
            built_at: mapping.built_at,
            catalog_fingerprint: mapping.catalog_fingerprint,
            index,
            entries: mapping.entries,
            embedder,
        })
    }

    /// Like [`SemanticIndex::load`], but logs the failure and returns `None`
    /// so the caller can run with semantic search disabled.
    pub fn open(dir: &Path, embedder: BoxedEmbedder, catalog: &Catalog) -> Option<Self> {
        match Self::load(dir, embedder, catalog) {
            Ok(index) => Some(index),
            Err(error) => {
                warn!(dir = %dir.display(), %error, "semantic index unavailable, semantic search disabled");
                None
            }
        }
    }
}

impl SemanticSearch for SemanticIndex {
    fn search(&self, query_text: &str, k: usize) -> Result<Vec<IndexEntry>, IndexError> {
        let query = self.embedder.embed(query_text)?;
        let nearest = self.index.search(&query, k)?;
        debug!(k, returned = nearest.len(), "semantic index queried");

        Ok(nearest
            .into_iter()
            .filter_map(|(position, _)| self.entries.get(position).cloned())
            .collect())
    }
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    if !path.is_file() {
        return Err(IndexError::Missing(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn with_tmp_suffix(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
