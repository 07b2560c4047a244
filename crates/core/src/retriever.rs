use crate::catalog::Catalog;
use crate::geo::haversine_distance_km;
use crate::models::{
    FallbackReason, Place, QueryIntent, Retrieval, RetrievalStrategy, RetrieverOptions, SourceKind,
    GENERIC_ENTITY_TYPE,
};
use crate::semantic::SemanticIndex;
use crate::traits::SemanticSearch;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Picks a retrieval strategy for an intent and ranks catalog places with it.
/// Query-time calls never fail; degraded paths return fewer or no places and
/// log why.
pub struct RetrieverService<S = SemanticIndex>
where
    S: SemanticSearch,
{
    catalog: Catalog,
    semantic: Option<S>,
    options: RetrieverOptions,
}

impl<S> RetrieverService<S>
where
    S: SemanticSearch,
{
    pub fn new(catalog: Catalog, semantic: Option<S>) -> Self {
        Self::with_options(catalog, semantic, RetrieverOptions::default())
    }

    pub fn with_options(catalog: Catalog, semantic: Option<S>, options: RetrieverOptions) -> Self {
        if semantic.is_none() {
            warn!("retriever started without a semantic index; semantic queries return nothing");
        }
        info!(places = catalog.len(), "retriever ready");
        Self {
            catalog,
            semantic,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn has_semantic_index(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn retrieve(&self, intent: &QueryIntent) -> Vec<Place> {
        self.search(intent).places
    }

    /// Runs the first applicable strategy: distance to a named reference,
    /// then address filtering, then semantic similarity.
    pub fn search(&self, intent: &QueryIntent) -> Retrieval {
        let top_k = self.options.clamp_top_k(intent.top_k);
        if top_k != intent.top_k {
            debug!(requested = intent.top_k, top_k, "clamped result count");
        }

        if let Some(reference) = intent.location_ref() {
            return match self.resolve_reference(reference) {
                Ok((lat, lon)) => Retrieval {
                    strategy: RetrievalStrategy::Distance,
                    fallback: None,
                    places: self.nearest_to(lat, lon, &intent.entity_type, top_k),
                },
                Err(reason) => {
                    warn!(reference, ?reason, "location reference unresolved, falling back to semantic search");
                    Retrieval {
                        strategy: RetrievalStrategy::Semantic,
                        fallback: Some(reason),
                        places: self.semantic_places(&intent.original_query, &intent.entity_type, top_k),
                    }
                }
            };
        }

        if let Some(area) = intent.location_filter() {
            return Retrieval {
                strategy: RetrievalStrategy::LocationFilter,
                fallback: None,
                places: self.filter_by_address(area, &intent.entity_type, top_k),
            };
        }

        Retrieval {
            strategy: RetrievalStrategy::Semantic,
            fallback: None,
            places: self.semantic_places(&intent.original_query, &intent.entity_type, top_k),
        }
    }

    fn resolve_reference(&self, reference: &str) -> Result<(f64, f64), FallbackReason> {
        let anchor = self
            .catalog
            .find_by_name_fragment(reference)
            .ok_or(FallbackReason::UnresolvedLocation)?;
        let coordinates = anchor
            .coordinates()
            .ok_or(FallbackReason::MissingCoordinates)?;
        debug!(reference, anchor = %anchor.name, "location reference resolved");
        Ok(coordinates)
    }

    fn nearest_to(&self, lat: f64, lon: f64, entity_type: &str, top_k: usize) -> Vec<Place> {
        let mut ranked: Vec<Place> = self
            .catalog
            .subset(SourceKind::for_entity(entity_type))
            .into_iter()
            .filter_map(|place| {
                let (place_lat, place_lon) = place.coordinates()?;
                let mut found = place.clone();
                found.distance_km = Some(haversine_distance_km(lat, lon, place_lat, place_lon));
                Some(found)
            })
            .collect();

        ranked.sort_by(|left, right| {
            left.distance_km
                .unwrap_or(f64::INFINITY)
                .total_cmp(&right.distance_km.unwrap_or(f64::INFINITY))
        });
        take_unique(ranked, top_k)
    }

    fn filter_by_address(&self, area: &str, entity_type: &str, top_k: usize) -> Vec<Place> {
        let needle = area.to_lowercase();
        let mut matched: Vec<Place> = self
            .catalog
            .subset(SourceKind::for_entity(entity_type))
            .into_iter()
            .filter(|place| place.address.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        matched.sort_by(|left, right| right.rating_value().total_cmp(&left.rating_value()));
        debug!(area, matched = matched.len(), "address filter applied");
        take_unique(matched, top_k)
    }

    fn semantic_places(&self, query: &str, entity_type: &str, top_k: usize) -> Vec<Place> {
        let Some(semantic) = &self.semantic else {
            warn!("semantic search requested but no index is loaded");
            return Vec::new();
        };

        let wanted = top_k.saturating_mul(self.options.semantic_candidate_multiplier.max(1));
        let candidates = match semantic.search(query, wanted) {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(%error, "semantic search failed, returning no places");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut places = Vec::with_capacity(top_k);
        for candidate in candidates {
            if places.len() >= top_k {
                break;
            }

            let Some(place) = self.catalog.lookup(&candidate.name, &candidate.source) else {
                debug!(name = %candidate.name, "semantic candidate not in catalog");
                continue;
            };

            if !self.matches_entity(place, entity_type) {
                continue;
            }

            if seen.insert(place.name.clone()) {
                places.push(place.clone());
            }
        }

        places
    }

    /// Hotel membership comes from provenance rather than the free-text
    /// category. Generic queries accept everything.
    fn matches_entity(&self, place: &Place, entity_type: &str) -> bool {
        if entity_type == GENERIC_ENTITY_TYPE {
            return true;
        }
        let is_hotel = self.catalog.kind_of(place) == SourceKind::Hotel
            || self.catalog.is_named_in(SourceKind::Hotel, &place.name);
        is_hotel == (entity_type == "hotel")
    }
}

fn take_unique(places: Vec<Place>, top_k: usize) -> Vec<Place> {
    let mut seen = HashSet::new();
    places
        .into_iter()
        .filter(|place| seen.insert(place.name.clone()))
        .take(top_k)
        .collect()
}
