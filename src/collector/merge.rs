use std::collections::HashSet;

use crate::models::Event;

/// Combines two result sets keyed by exact event name.
///
/// Every `primary` entry is kept; a `secondary` entry is appended only when
/// no primary entry carries its name.
pub fn merge_events(primary: Vec<Event>, secondary: Vec<Event>) -> Vec<Event> {
    let primary_names: HashSet<String> = primary.iter().map(|event| event.name.clone()).collect();
    let mut merged = primary;
    merged.extend(
        secondary
            .into_iter()
            .filter(|event| !primary_names.contains(&event.name)),
    );
    merged
}

/// Keeps the first event for each name.
pub fn remove_duplicate_events(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(event.name.clone()))
        .collect()
}

pub fn merge_and_dedup(primary: Vec<Event>, secondary: Vec<Event>) -> Vec<Event> {
    remove_duplicate_events(merge_events(primary, secondary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::Kind;
    use chrono::{TimeZone, Utc};

    fn event(name: &str, kind: Kind) -> Event {
        let mut event = Event::new(name, Utc.with_ymd_and_hms(2025, 11, 24, 20, 0, 0).unwrap());
        event.kind = kind;
        event
    }

    fn names(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn primary_wins_on_name_collision() {
        let primary = vec![event("X", Kind::Movie)];
        let secondary = vec![event("X", Kind::Unknown), event("Y", Kind::Unknown)];

        let merged = merge_and_dedup(primary, secondary);

        assert_eq!(names(&merged), vec!["X", "Y"]);
        assert_eq!(merged[0].kind, Kind::Movie);
        assert_eq!(merged[1].kind, Kind::Unknown);
    }

    #[test]
    fn merging_a_set_with_itself_dedups_it() {
        let set = vec![
            event("A", Kind::Concert),
            event("B", Kind::Party),
            event("A", Kind::Theater),
        ];

        let merged = merge_and_dedup(set.clone(), set.clone());

        assert_eq!(merged, remove_duplicate_events(set));
        assert_eq!(names(&merged), vec!["A", "B"]);
        assert_eq!(merged[0].kind, Kind::Concert);
    }

    #[test]
    fn is_idempotent() {
        let primary = vec![event("A", Kind::Concert), event("B", Kind::Party)];
        let secondary = vec![event("C", Kind::Unknown), event("A", Kind::Unknown)];

        let once = merge_and_dedup(primary, secondary);
        let twice = merge_and_dedup(once.clone(), once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn names_are_case_sensitive() {
        let merged = merge_and_dedup(
            vec![event("Jazz Night", Kind::Concert)],
            vec![event("jazz night", Kind::Unknown)],
        );
        assert_eq!(names(&merged), vec!["Jazz Night", "jazz night"]);
    }

    #[test]
    fn empty_secondary_keeps_primary() {
        let merged = merge_and_dedup(vec![event("A", Kind::Concert)], Vec::new());
        assert_eq!(names(&merged), vec!["A"]);
        assert!(merge_and_dedup(Vec::new(), Vec::new()).is_empty());
    }
}
