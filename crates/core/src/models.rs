use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub const GENERIC_ENTITY_TYPE: &str = "place";
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 50;

/// A point of interest as read from a flat data file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub name: String,
    #[serde(default, alias = "description")]
    pub category: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "loose_count")]
    pub rating_count: Option<u64>,
    #[serde(default, deserialize_with = "loose_string")]
    pub lat: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub lon: Option<String>,
    #[serde(default)]
    pub source_file: String,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl Place {
    /// Both coordinates, when present and numeric.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = parse_coordinate(self.lat.as_deref()?)?;
        let lon = parse_coordinate(self.lon.as_deref()?)?;
        Some((lat, lon))
    }

    /// Rating as a number. Accepts comma decimal separators; anything
    /// unparsable counts as zero.
    pub fn rating_value(&self) -> f64 {
        self.rating
            .as_deref()
            .map(|raw| raw.trim().replace(',', "."))
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(0.0)
    }

    pub fn embedding_text(&self) -> String {
        [self.name.as_str(), self.category.as_str(), self.address.as_str()]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(". ")
    }
}

fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn loose_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        Some(Value::String(text)) => text.trim().replace([',', '.'], "").parse::<u64>().ok(),
        _ => None,
    })
}

/// Which kind of backing file a record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    General,
    Restaurant,
    Hotel,
}

impl SourceKind {
    /// Subset of the catalog an entity type is scoped to. `None` means the
    /// full catalog.
    pub fn for_entity(entity_type: &str) -> Option<Self> {
        match entity_type {
            "restaurant" | "cafe" => Some(Self::Restaurant),
            "hotel" => Some(Self::Hotel),
            _ => None,
        }
    }

    pub fn infer_from_stem(stem: &str) -> Self {
        let lowered = stem.to_lowercase();
        if lowered.contains("hotel") {
            Self::Hotel
        } else if lowered.contains("restaurant") {
            Self::Restaurant
        } else {
            Self::General
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSource {
    pub tag: String,
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl DataSource {
    pub fn new(tag: impl Into<String>, path: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self {
            tag: tag.into(),
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Rating,
    Distance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryIntent {
    pub entity_type: String,
    pub top_k: usize,
    pub location_filter: Option<String>,
    pub location_ref: Option<String>,
    pub sort_by: SortBy,
    pub original_query: String,
}

impl QueryIntent {
    pub fn new(original_query: impl Into<String>) -> Self {
        Self {
            entity_type: GENERIC_ENTITY_TYPE.to_string(),
            top_k: DEFAULT_TOP_K,
            location_filter: None,
            location_ref: None,
            sort_by: SortBy::Relevance,
            original_query: original_query.into(),
        }
    }

    pub fn location_ref(&self) -> Option<&str> {
        non_blank(self.location_ref.as_deref())
    }

    pub fn location_filter(&self) -> Option<&str> {
        non_blank(self.location_filter.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Position-to-identity record stored next to the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Distance,
    LocationFilter,
    Semantic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    UnresolvedLocation,
    MissingCoordinates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retrieval {
    pub strategy: RetrievalStrategy,
    pub fallback: Option<FallbackReason>,
    pub places: Vec<Place>,
}

#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub semantic_candidate_multiplier: usize,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            max_top_k: MAX_TOP_K,
            semantic_candidate_multiplier: 2,
        }
    }
}

impl RetrieverOptions {
    pub fn clamp_top_k(&self, requested: usize) -> usize {
        if requested == 0 {
            return self.default_top_k.clamp(1, self.max_top_k.max(1));
        }
        requested.clamp(1, self.max_top_k.max(1))
    }
}
