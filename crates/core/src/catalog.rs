use crate::error::CatalogError;
use crate::models::{DataSource, Place, SourceKind};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Every place from every configured source, in load order. Immutable once
/// built.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    places: Vec<Place>,
    source_kinds: HashMap<String, SourceKind>,
    names_by_kind: HashMap<SourceKind, HashSet<String>>,
    by_identity: HashMap<(String, String), usize>,
    by_name: HashMap<String, usize>,
}

pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

pub struct CatalogReport {
    pub catalog: Catalog,
    pub skipped_sources: Vec<SkippedSource>,
}

impl Catalog {
    /// Builds a catalog from records already in memory. Each record's
    /// `source_file` is overwritten with the tag it was supplied under.
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (String, SourceKind, Vec<Place>)>,
    {
        let mut catalog = Self::default();
        for (tag, kind, places) in sources {
            catalog.source_kinds.insert(tag.clone(), kind);
            for mut place in places {
                place.source_file = tag.clone();
                place.distance_km = None;
                catalog.push(place, kind);
            }
        }
        for kind in [SourceKind::Restaurant, SourceKind::Hotel] {
            if !catalog.has_kind(kind) {
                info!(?kind, "no places of this kind; scoped queries will use the full catalog");
            }
        }
        catalog
    }

    fn push(&mut self, place: Place, kind: SourceKind) {
        let position = self.places.len();
        self.names_by_kind
            .entry(kind)
            .or_default()
            .insert(place.name.clone());
        self.by_identity
            .entry((place.name.clone(), place.source_file.clone()))
            .or_insert(position);
        self.by_name.entry(place.name.clone()).or_insert(position);
        self.places.push(place);
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn kind_of(&self, place: &Place) -> SourceKind {
        self.source_kinds
            .get(&place.source_file)
            .copied()
            .unwrap_or(SourceKind::General)
    }

    pub fn has_kind(&self, kind: SourceKind) -> bool {
        self.names_by_kind
            .get(&kind)
            .is_some_and(|names| !names.is_empty())
    }

    /// Whether `name` appears in any source of the given kind.
    pub fn is_named_in(&self, kind: SourceKind, name: &str) -> bool {
        self.names_by_kind
            .get(&kind)
            .is_some_and(|names| names.contains(name))
    }

    /// Places from sources of `kind`, or the whole catalog when `kind` is
    /// `None` or no source of that kind was loaded.
    pub fn subset(&self, kind: Option<SourceKind>) -> Vec<&Place> {
        match kind {
            Some(kind) if self.has_kind(kind) => self
                .places
                .iter()
                .filter(|place| self.kind_of(place) == kind)
                .collect(),
            Some(kind) => {
                debug!(?kind, "no source of this kind loaded, using full catalog");
                self.places.iter().collect()
            }
            None => self.places.iter().collect(),
        }
    }

    /// Looks a place up by identity, falling back to the first place with
    /// the same name.
    pub fn lookup(&self, name: &str, source: &str) -> Option<&Place> {
        self.by_identity
            .get(&(name.to_string(), source.to_string()))
            .or_else(|| self.by_name.get(name))
            .and_then(|position| self.places.get(*position))
    }

    /// First place, in load order, whose name contains `reference`
    /// case-insensitively. Multiple matches are not ranked.
    pub fn find_by_name_fragment(&self, reference: &str) -> Option<&Place> {
        let needle = reference.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.places
            .iter()
            .find(|place| place.name.to_lowercase().contains(&needle))
    }

    /// Digest over the identity and embedded text of every place, in order.
    /// Stored with the semantic index to detect stale artifacts.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for place in &self.places {
            hasher.update(place.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(place.source_file.as_bytes());
            hasher.update([0u8]);
            hasher.update(place.embedding_text().as_bytes());
            hasher.update([b'\n']);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Loads every source. Missing or unreadable files become empty subsets and
/// are reported rather than failing the whole load.
pub fn load_catalog(sources: &[DataSource]) -> CatalogReport {
    let mut loaded = Vec::new();
    let mut skipped_sources = Vec::new();

    for source in sources {
        match read_places(&source.path) {
            Ok(places) => {
                info!(tag = %source.tag, kind = ?source.kind, count = places.len(), "loaded place source");
                loaded.push((source.tag.clone(), source.kind, places));
            }
            Err(error) => {
                warn!(path = %source.path.display(), %error, "place source unavailable, treating as empty");
                skipped_sources.push(SkippedSource {
                    path: source.path.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    CatalogReport {
        catalog: Catalog::from_sources(loaded),
        skipped_sources,
    }
}

/// Reads one JSON array of place records. Records that do not decode are
/// skipped with a warning; a file that is not an array is an error.
pub fn read_places(path: &Path) -> Result<Vec<Place>, CatalogError> {
    let bytes = fs::read(path)?;
    let records: Vec<serde_json::Value> =
        serde_json::from_slice(&bytes).map_err(|source| CatalogError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let total = records.len();
    let places: Vec<Place> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value(record).ok())
        .collect();

    if places.len() < total {
        warn!(
            path = %path.display(),
            skipped = total - places.len(),
            "dropped place records that failed to decode"
        );
    }
    Ok(places)
}

/// Every `*.json` file below `folder`, sorted, as a data source whose kind is
/// inferred from the file stem.
pub fn discover_sources(folder: &Path) -> Result<Vec<DataSource>, CatalogError> {
    if !folder.is_dir() {
        return Err(CatalogError::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files
        .into_iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_string();
            let kind = SourceKind::infer_from_stem(&stem);
            Some(DataSource::new(stem, path, kind))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn place(name: &str) -> Place {
        serde_json::from_value(serde_json::json!({ "name": name })).expect("place")
    }

    fn sample() -> Catalog {
        Catalog::from_sources(vec![
            (
                "places".to_string(),
                SourceKind::General,
                vec![place("Dragon Bridge"), place("Han Market")],
            ),
            (
                "hotels".to_string(),
                SourceKind::Hotel,
                vec![place("Dragon Bridge Hotel")],
            ),
        ])
    }

    #[test]
    fn source_tags_are_applied() {
        let catalog = sample();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.places()[2].source_file, "hotels");
        assert_eq!(catalog.kind_of(&catalog.places()[2]), SourceKind::Hotel);
        assert!(catalog.is_named_in(SourceKind::Hotel, "Dragon Bridge Hotel"));
        assert!(!catalog.is_named_in(SourceKind::Hotel, "Han Market"));
    }

    #[test]
    fn name_fragment_resolution_is_first_match() {
        let catalog = sample();
        let found = catalog.find_by_name_fragment("dragon bridge");
        assert_eq!(found.map(|p| p.source_file.as_str()), Some("places"));
        assert!(catalog.find_by_name_fragment("Marble Mountains").is_none());
        assert!(catalog.find_by_name_fragment("  ").is_none());
    }

    #[test]
    fn subset_falls_back_to_full_catalog_when_kind_absent() {
        let catalog = sample();
        assert_eq!(catalog.subset(Some(SourceKind::Hotel)).len(), 1);
        assert_eq!(catalog.subset(Some(SourceKind::Restaurant)).len(), 3);
        assert_eq!(catalog.subset(None).len(), 3);
    }

    #[test]
    fn lookup_prefers_exact_identity() {
        let catalog = Catalog::from_sources(vec![
            ("a".to_string(), SourceKind::General, vec![place("Twin")]),
            ("b".to_string(), SourceKind::Hotel, vec![place("Twin")]),
        ]);
        assert_eq!(catalog.lookup("Twin", "b").map(|p| p.source_file.as_str()), Some("b"));
        assert_eq!(catalog.lookup("Twin", "zzz").map(|p| p.source_file.as_str()), Some("a"));
        assert!(catalog.lookup("Nobody", "a").is_none());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let first = sample().fingerprint();
        assert_eq!(first, sample().fingerprint());

        let changed = Catalog::from_sources(vec![(
            "places".to_string(),
            SourceKind::General,
            vec![place("Dragon Bridge")],
        )]);
        assert_ne!(first, changed.fingerprint());
    }

    #[test]
    fn missing_files_are_skipped_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let present = dir.path().join("places.json");
        fs::write(&present, r#"[{"name": "Linh Ung Pagoda", "lat": "16.1", "lon": "108.27"}]"#)?;

        let report = load_catalog(&[
            DataSource::new("places", &present, SourceKind::General),
            DataSource::new("hotels", dir.path().join("hotels.json"), SourceKind::Hotel),
        ]);

        assert_eq!(report.catalog.len(), 1);
        assert_eq!(report.skipped_sources.len(), 1);
        Ok(())
    }

    #[test]
    fn malformed_file_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("places.json");
        fs::write(&path, "{ not json")?;
        assert!(matches!(read_places(&path), Err(CatalogError::Decode { .. })));
        Ok(())
    }

    #[test]
    fn bad_records_are_dropped_individually() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("places.json");
        fs::write(&path, r#"[{"name": "Marble Mountains"}, {"rating": "4.0"}, 42]"#)?;
        let places = read_places(&path)?;
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Marble Mountains");
        Ok(())
    }

    #[test]
    fn discover_sources_infers_kinds() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("places.json"), "[]")?;
        fs::write(nested.join("danang_hotels.json"), "[]")?;
        fs::write(dir.path().join("restaurants.JSON"), "[]")?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;

        let sources = discover_sources(dir.path())?;
        assert_eq!(sources.len(), 3);
        let kinds: Vec<_> = sources.iter().map(|s| (s.tag.as_str(), s.kind)).collect();
        assert!(kinds.contains(&("danang_hotels", SourceKind::Hotel)));
        assert!(kinds.contains(&("restaurants", SourceKind::Restaurant)));
        assert!(kinds.contains(&("places", SourceKind::General)));
        Ok(())
    }
}
