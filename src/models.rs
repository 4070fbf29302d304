use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::kinds::Kind;

/// Longest accepted gap between `begin` and `end`.
pub const MAX_EVENT_SPAN_DAYS: i64 = 15;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct EventLocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub kind: Kind,
    #[serde(default)]
    pub genres: Vec<String>,
    pub begin: DateTime<Utc>,
    // Unset when the source gave no usable end time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub loc: EventLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>, begin: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: Kind::Unknown,
            genres: Vec::new(),
            begin,
            end: None,
            loc: EventLocation::default(),
            place: None,
            address: None,
            price: None,
            price_currency: None,
            source: None,
            img: None,
        }
    }

    /// An event is accepted for storage when it has not ended yet and does
    /// not span more than fifteen days.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.end {
            Some(end) => end >= now && end - self.begin <= Duration::days(MAX_EVENT_SPAN_DAYS),
            None => false,
        }
    }
}

/// A scrape seed: where to look and how far around it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CollectLocation {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
}

/// Axis-aligned viewport, edges inclusive.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Where and what an event is, without the rest of the record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventPlacement {
    pub loc: EventLocation,
    pub kind: Kind,
}

/// Count of events sharing the exact same location and kind.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Pin {
    pub loc: EventLocation,
    pub kind: Kind,
    pub amount: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_between(begin: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Event {
        let mut event = Event::new("Test Event", begin);
        event.end = end;
        event
    }

    #[test]
    fn accepts_future_event_within_span() {
        let now = Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap();
        let event = event_between(now + Duration::hours(24), Some(now + Duration::hours(25)));
        assert!(event.is_valid(now));

        let ongoing = event_between(now - Duration::days(2), Some(now + Duration::days(1)));
        assert!(ongoing.is_valid(now));

        let exact_span = event_between(now, Some(now + Duration::days(15)));
        assert!(exact_span.is_valid(now));

        let ends_now = event_between(now - Duration::hours(1), Some(now));
        assert!(ends_now.is_valid(now));
    }

    #[test]
    fn rejects_past_or_too_long_events() {
        let now = Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap();
        let ended = event_between(now - Duration::hours(3), Some(now - Duration::seconds(1)));
        assert!(!ended.is_valid(now));

        let too_long = event_between(
            now,
            Some(now + Duration::days(15) + Duration::seconds(1)),
        );
        assert!(!too_long.is_valid(now));

        let no_end = event_between(now + Duration::hours(1), None);
        assert!(!no_end.is_valid(now));
    }

    #[test]
    fn serializes_wire_shape() {
        let begin = Utc.with_ymd_and_hms(2025, 11, 24, 20, 0, 0).unwrap();
        let mut event = Event::new("Jazz Night", begin);
        event.kind = Kind::Concert;
        event.genres = vec!["jazz".to_string()];
        event.end = Some(begin + Duration::hours(2));
        event.loc = EventLocation { lat: 48.8, lon: 2.3 };
        event.place = Some("New Morning".to_string());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["name"], "Jazz Night");
        assert_eq!(value["kind"], "concert");
        assert_eq!(value["begin"], "2025-11-24T20:00:00Z");
        assert_eq!(value["end"], "2025-11-24T22:00:00Z");
        assert_eq!(value["loc"]["lat"], 48.8);
        assert_eq!(value["loc"]["lon"], 2.3);
        assert!(value.get("price").is_none());
        assert!(value.get("price_currency").is_none());

        event.price = Some(12.5);
        event.price_currency = Some("EUR".to_string());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["price"], 12.5);
        assert_eq!(value["price_currency"], "EUR");
    }

    #[test]
    fn decodes_minimal_payload_with_defaults() {
        let payload = r#"{"name":"Market","begin":"2025-11-24T08:00:00+01:00","end":"2025-11-24T13:00:00+01:00"}"#;
        let event: Event = serde_json::from_str(payload).unwrap();
        assert_eq!(event.kind, Kind::Unknown);
        assert!(event.genres.is_empty());
        assert_eq!(event.begin, Utc.with_ymd_and_hms(2025, 11, 24, 7, 0, 0).unwrap());
        assert_eq!(event.loc, EventLocation::default());
    }
}
