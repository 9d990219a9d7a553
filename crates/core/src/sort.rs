//! Group ordering for display.
//!
//! Sorting is applied at render time to whatever the cache currently holds.
//! It never mutates its input and is stable, so sorting an already sorted
//! sequence returns it unchanged.

use std::cmp::Ordering;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::Group;

/// How groups are ordered for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    ByPublisher,
    ByLocation,
}

impl SortMode {
    pub fn toggled(self) -> Self {
        match self {
            SortMode::ByPublisher => SortMode::ByLocation,
            SortMode::ByLocation => SortMode::ByPublisher,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::ByPublisher => "by_publisher",
            SortMode::ByLocation => "by_location",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "by_publisher" => Some(SortMode::ByPublisher),
            "by_location" => Some(SortMode::ByLocation),
            _ => None,
        }
    }
}

/// Return a new, ordered copy of `groups`.
pub fn sort(groups: &[Group], mode: SortMode) -> Vec<Group> {
    let mut sorted = groups.to_vec();
    match mode {
        SortMode::ByPublisher => sorted.sort_by(|a, b| compare_text(&a.key, &b.key)),
        SortMode::ByLocation => sorted.sort_by_cached_key(|g| LocationKey::parse(g.location.as_deref())),
    }
    sorted
}

/// Case-aware text ordering: letters compare case-insensitively first and
/// case only breaks ties, lowercase first (`apple < banana < Banana`).
fn compare_text(a: &str, b: &str) -> Ordering {
    let folded = a.chars().flat_map(char::to_lowercase).cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| b.cmp(a))
}

/// Sort key for a location.
///
/// Variant order is the display order: numbered booths first, then free-text
/// locations, then groups without a location.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LocationKey {
    /// Booth number, as its digit string without leading zeros.
    Numbered(String),
    Text(String),
    Missing,
}

impl LocationKey {
    /// A location is numbered when it starts with a run of digits that ends the
    /// string or is followed by a separator (`"12"`, `"12 - Hall B"`). A digit
    /// run glued to a letter (`"1A"`) is a booth code and sorts as text.
    fn parse(location: Option<&str>) -> Self {
        let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) else {
            return LocationKey::Missing;
        };

        let digits_end = location.find(|c: char| !c.is_ascii_digit()).unwrap_or(location.len());
        let digits = &location[..digits_end];
        let terminated = location[digits_end..].chars().next().is_none_or(|c| !c.is_alphanumeric());

        if !digits.is_empty() && terminated {
            let number = digits.trim_start_matches('0');
            LocationKey::Numbered(if number.is_empty() { "0".to_string() } else { number.to_string() })
        } else {
            LocationKey::Text(location.to_string())
        }
    }
}

impl PartialOrd for LocationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        use LocationKey::*;
        match (self, other) {
            // Digit strings without leading zeros order by length, then lexically,
            // which is integer order without any overflow bound.
            (Numbered(a), Numbered(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Text(a), Text(b)) => compare_text(a, b),
            (Missing, Missing) => Ordering::Equal,
            (Numbered(_), _) | (Text(_), Missing) => Ordering::Less,
            (_, Numbered(_)) | (Missing, Text(_)) => Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::group;

    fn locations(groups: &[Group]) -> Vec<Option<&str>> {
        groups.iter().map(|g| g.location.as_deref()).collect()
    }

    fn keys(groups: &[Group]) -> Vec<&str> {
        groups.iter().map(|g| g.key.as_str()).collect()
    }

    #[test]
    fn test_numeric_prefix_ordering() {
        let groups: Vec<Group> =
            ["Z", "1A", "10", "2"].iter().enumerate().map(|(i, loc)| group(&i.to_string(), Some(loc))).collect();

        let sorted = sort(&groups, SortMode::ByLocation);
        assert_eq!(locations(&sorted), vec![Some("2"), Some("10"), Some("1A"), Some("Z")]);
    }

    #[test]
    fn test_numeric_compares_by_value() {
        let groups = vec![group("a", Some("10")), group("b", Some("9")), group("c", Some("0100"))];
        let sorted = sort(&groups, SortMode::ByLocation);
        assert_eq!(keys(&sorted), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_numbered_with_separator() {
        let groups = vec![group("a", Some("12 - Hall B")), group("b", Some("3")), group("c", Some("Lobby"))];
        let sorted = sort(&groups, SortMode::ByLocation);
        assert_eq!(keys(&sorted), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_missing_location_sorts_last() {
        let groups = vec![group("a", None), group("b", Some("Hall")), group("c", Some("")), group("d", Some("4"))];
        let sorted = sort(&groups, SortMode::ByLocation);
        assert_eq!(keys(&sorted), vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_all_missing_keeps_input_order() {
        let groups = vec![group("b", None), group("a", None), group("c", None)];
        let sorted = sort(&groups, SortMode::ByLocation);
        assert_eq!(keys(&sorted), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_very_long_booth_number() {
        let groups = vec![group("big", Some("123456789012345678901234567890")), group("small", Some("7"))];
        let sorted = sort(&groups, SortMode::ByLocation);
        assert_eq!(keys(&sorted), vec!["small", "big"]);
    }

    #[test]
    fn test_by_publisher_case_aware() {
        let groups = vec![group("banana", None), group("Cherry", None), group("apple", None), group("Banana", None)];
        let sorted = sort(&groups, SortMode::ByPublisher);
        assert_eq!(keys(&sorted), vec!["apple", "banana", "Banana", "Cherry"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let groups = vec![
            group("Zeta", Some("1A")),
            group("alpha", Some("20")),
            group("Beta", None),
            group("gamma", Some("3")),
            group("Alpha", Some("Hall")),
        ];
        for mode in [SortMode::ByPublisher, SortMode::ByLocation] {
            let once = sort(&groups, mode);
            assert_eq!(sort(&once, mode), once);
        }
    }

    #[test]
    fn test_sort_does_not_mutate_input() {
        let groups = vec![group("b", Some("2")), group("a", Some("1"))];
        let before = groups.clone();
        let _ = sort(&groups, SortMode::ByLocation);
        assert_eq!(groups, before);
    }

    #[test]
    fn test_empty_input() {
        assert!(sort(&[], SortMode::ByPublisher).is_empty());
        assert!(sort(&[], SortMode::ByLocation).is_empty());
    }

    #[test]
    fn test_sort_mode_round_trip_names() {
        for mode in [SortMode::ByPublisher, SortMode::ByLocation] {
            assert_eq!(SortMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SortMode::ByPublisher.toggled(), SortMode::ByLocation);
        assert_eq!(SortMode::parse("sideways"), None);
    }
}
