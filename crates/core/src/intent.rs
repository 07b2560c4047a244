use crate::error::IntentError;
use crate::models::{QueryIntent, SortBy, MAX_TOP_K};
use regex::Regex;
use std::sync::OnceLock;

/// Category vocabulary in match order. Multi-word keywords come before the
/// single word they end with, so "amusement park" never reads as "park".
const ENTITY_KEYWORDS: &[(&str, &str)] = &[
    (r"tourist attractions?", "attraction"),
    (r"attractions?", "attraction"),
    (r"restaurants?", "restaurant"),
    (r"cafes?", "cafe"),
    (r"bars?", "bar"),
    (r"bakery|bakeries", "bakery"),
    (r"supermarkets?", "supermarket"),
    (r"shopping malls?", "mall"),
    (r"malls?", "mall"),
    (r"clothing stores?", "clothing store"),
    (r"convenience stores?", "convenience store"),
    (r"department stores?", "department store"),
    (r"electronics stores?", "electronics store"),
    (r"book ?stores?", "book store"),
    (r"stores?", "store"),
    (r"museums?", "museum"),
    (r"art galler(?:y|ies)", "gallery"),
    (r"galler(?:y|ies)", "gallery"),
    (r"amusement parks?", "amusement park"),
    (r"parks?", "park"),
    (r"zoos?", "zoo"),
    (r"aquariums?", "aquarium"),
    (r"stadiums?", "stadium"),
    (r"hospitals?", "hospital"),
    (r"pharmac(?:y|ies)", "pharmacy"),
    (r"atms?", "atm"),
];

/// Words that start a new clause and so end a location phrase.
const CLAUSE_WORDS: &str = "for|with|to|that|which|during";

/// Turns free text into a [`QueryIntent`]. Construct once and reuse; the
/// patterns are compiled up front.
#[derive(Debug, Clone)]
pub struct IntentParser {
    top_n: Regex,
    bare_number: Regex,
    near: Regex,
    within: Regex,
    quality: Regex,
    entities: Vec<(Regex, &'static str)>,
}

impl IntentParser {
    pub fn new() -> Result<Self, IntentError> {
        let entities = ENTITY_KEYWORDS
            .iter()
            .map(|(pattern, normalized)| {
                Regex::new(&format!(r"(?i)\b(?:{pattern})\b")).map(|regex| (regex, *normalized))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            top_n: Regex::new(r"(?i)\btop\s+(\d+)\b")?,
            bare_number: Regex::new(r"\b(\d+)\b")?,
            near: Regex::new(&format!(
                r"(?i)\bnear\s+(.+?)(?:\s+(?:in|{CLAUSE_WORDS})\b|[?.!,;]|$)"
            ))?,
            within: Regex::new(&format!(
                r"(?i)\bin\s+(.+?)(?:\s+district\b|\s+(?:near|{CLAUSE_WORDS})\b|[?.!,;]|$)"
            ))?,
            quality: Regex::new(r"(?i)\b(?:best|top)\b")?,
            entities,
        })
    }

    pub fn parse(&self, query: &str) -> QueryIntent {
        let mut intent = QueryIntent::new(query);

        if let Some(top_k) = self.result_count(query) {
            intent.top_k = top_k;
        }

        if let Some(entity_type) = self.entity_type(query) {
            intent.entity_type = entity_type.to_string();
        }

        if let Some(reference) = capture_trimmed(&self.near, query) {
            intent.location_ref = Some(reference);
            intent.sort_by = SortBy::Distance;
        } else if let Some(area) = capture_trimmed(&self.within, query) {
            intent.location_filter = Some(area);
            intent.sort_by = SortBy::Rating;
        }

        if intent.sort_by != SortBy::Distance && self.quality.is_match(query) {
            intent.sort_by = SortBy::Rating;
        }

        intent
    }

    fn result_count(&self, query: &str) -> Option<usize> {
        if let Some(explicit) = self
            .top_n
            .captures(query)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<usize>().ok())
        {
            return Some(explicit.clamp(1, MAX_TOP_K));
        }

        self.bare_number
            .captures_iter(query)
            .filter_map(|captures| captures.get(1))
            .filter_map(|digits| digits.as_str().parse::<usize>().ok())
            .find(|count| (1..=MAX_TOP_K).contains(count))
    }

    fn entity_type(&self, query: &str) -> Option<&'static str> {
        self.entities
            .iter()
            .find(|(regex, _)| regex.is_match(query))
            .map(|(_, normalized)| *normalized)
    }
}

fn capture_trimmed(regex: &Regex, query: &str) -> Option<String> {
    regex
        .captures(query)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim().to_string())
        .filter(|found| !found.is_empty())
}

static SHARED_PARSER: OnceLock<Option<IntentParser>> = OnceLock::new();

/// Parses with a process-wide parser built on first use. If the vocabulary
/// fails to compile every query gets a generic intent.
pub fn parse(query: &str) -> QueryIntent {
    let parser = SHARED_PARSER.get_or_init(|| match IntentParser::new() {
        Ok(parser) => Some(parser),
        Err(error) => {
            tracing::warn!(%error, "intent parser unavailable, using generic intent");
            None
        }
    });

    match parser {
        Some(parser) => parser.parse(query),
        None => QueryIntent::new(query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> IntentParser {
        IntentParser::new().expect("vocabulary should compile")
    }

    #[test]
    fn explicit_top_n_sets_count_and_rating_sort() {
        for n in [1usize, 3, 10, 50] {
            let intent = parser().parse(&format!("top {n} museums"));
            assert_eq!(intent.top_k, n);
            assert_eq!(intent.entity_type, "museum");
            assert_eq!(intent.sort_by, SortBy::Rating);
        }
    }

    #[test]
    fn explicit_top_n_wins_over_other_numbers() {
        let intent = parser().parse("show me 12 bars, top 4 please");
        assert_eq!(intent.top_k, 4);
    }

    #[test]
    fn bare_number_inside_range_is_used() {
        let intent = parser().parse("give me 8 cafes");
        assert_eq!(intent.top_k, 8);
        assert_eq!(intent.entity_type, "cafe");
    }

    #[test]
    fn year_does_not_corrupt_count() {
        let intent = parser().parse("restaurants open in 2024");
        assert_eq!(intent.top_k, 5);
    }

    #[test]
    fn first_in_range_number_is_taken() {
        let intent = parser().parse("museums built after 1975 list 6");
        assert_eq!(intent.top_k, 6);
    }

    #[test]
    fn near_sets_reference_and_distance() {
        let intent = parser().parse("Cafes near Dragon Bridge ");
        assert_eq!(intent.location_ref.as_deref(), Some("Dragon Bridge"));
        assert_eq!(intent.location_filter, None);
        assert_eq!(intent.sort_by, SortBy::Distance);
    }

    #[test]
    fn near_wins_over_in_and_quality() {
        let intent = parser().parse("best restaurants near Han Market in Hai Chau?");
        assert_eq!(intent.location_ref.as_deref(), Some("Han Market"));
        assert_eq!(intent.location_filter, None);
        assert_eq!(intent.sort_by, SortBy::Distance);
    }

    #[test]
    fn in_district_strips_district() {
        let intent = parser().parse("restaurants in Hai Chau district");
        assert_eq!(intent.location_filter.as_deref(), Some("Hai Chau"));
        assert_eq!(intent.sort_by, SortBy::Rating);
        assert_eq!(intent.entity_type, "restaurant");
    }

    #[test]
    fn district_ends_area_even_mid_sentence() {
        let intent = parser().parse("restaurants in Hai Chau district for dinner");
        assert_eq!(intent.location_filter.as_deref(), Some("Hai Chau"));
        assert_eq!(intent.sort_by, SortBy::Rating);

        let numbered = parser().parse("cafes in district 1");
        assert_eq!(numbered.location_filter.as_deref(), Some("district 1"));
    }

    #[test]
    fn area_stops_at_clause_words() {
        let intent = parser().parse("bars in Son Tra with live music");
        assert_eq!(intent.location_filter.as_deref(), Some("Son Tra"));
    }

    #[test]
    fn reference_stops_at_clause_words() {
        let intent = parser().parse("restaurants near Han Market for lunch");
        assert_eq!(intent.location_ref.as_deref(), Some("Han Market"));
        assert_eq!(intent.sort_by, SortBy::Distance);

        let intent = parser().parse("cafes near Dragon Bridge that open late");
        assert_eq!(intent.location_ref.as_deref(), Some("Dragon Bridge"));
    }

    #[test]
    fn shared_parser_is_reused() {
        let first = parse("museums near Dragon Bridge");
        let second = parse("museums near Dragon Bridge");
        assert_eq!(first, second);
        assert!(SHARED_PARSER.get().is_some_and(Option::is_some));
    }

    #[test]
    fn plain_query_is_relevance() {
        let intent = parser().parse("somewhere quiet to read");
        assert_eq!(intent.entity_type, "place");
        assert_eq!(intent.sort_by, SortBy::Relevance);
        assert_eq!(intent.location_ref, None);
        assert_eq!(intent.location_filter, None);
        assert_eq!(intent.top_k, 5);
        assert_eq!(intent.original_query, "somewhere quiet to read");
    }

    #[test]
    fn best_forces_rating() {
        let intent = parser().parse("best bakeries");
        assert_eq!(intent.entity_type, "bakery");
        assert_eq!(intent.sort_by, SortBy::Rating);
    }

    #[test]
    fn multi_word_keywords_match_whole() {
        assert_eq!(parser().parse("tourist attractions for kids").entity_type, "attraction");
        assert_eq!(parser().parse("an amusement park").entity_type, "amusement park");
        assert_eq!(parser().parse("a convenience store").entity_type, "convenience store");
        assert_eq!(parser().parse("art galleries").entity_type, "gallery");
    }

    #[test]
    fn keywords_do_not_match_inside_words() {
        assert_eq!(parser().parse("barbecue spots").entity_type, "place");
        assert_eq!(parser().parse("parking lots").entity_type, "place");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let intent = parser().parse("TOP 3 MUSEUMS IN SON TRA");
        assert_eq!(intent.top_k, 3);
        assert_eq!(intent.entity_type, "museum");
        assert_eq!(intent.location_filter.as_deref(), Some("SON TRA"));
    }

    #[test]
    fn free_function_parses_like_parser() {
        assert_eq!(parse("zoos near Asia Park"), parser().parse("zoos near Asia Park"));
    }
}
