use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::{self, Fetcher};
use super::Collector;
use crate::kinds::first_kind_match;
use crate::models::{CollectLocation, Event, EventLocation};

const ID: &str = "paris-open-data";
const NAME: &str = "Que faire à Paris";
const HOME_URL: &str = "https://opendata.paris.fr";
const SEARCH_URL: &str = "https://opendata.paris.fr/api/records/1.0/search/";
const DATASET: &str = "que-faire-a-paris-";
const CITY: &str = "Paris";
// More than one filter caps the API at 100 rows.
const ROWS: u32 = 1000;

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+([,.]\d+)?").expect("valid price regex"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    nhits: u64,
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fields {
    url: Option<String>,
    title: String,
    date_start: Option<String>,
    date_end: Option<String>,
    occurrences: Option<String>,
    cover_url: Option<String>,
    address_name: Option<String>,
    address_street: String,
    address_zipcode: String,
    address_city: String,
    price_type: Option<String>,
    price_detail: Option<String>,
    qfap_tags: Option<String>,
    lat_lon: Option<LatLon>,
}

/// The dataset is inconsistent about how it encodes coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum LatLon {
    Pair(Vec<Value>),
    Object {
        #[serde(default)]
        lat: Value,
        #[serde(default)]
        lon: Value,
    },
    Text(String),
    Other(Value),
}

impl LatLon {
    fn location(&self) -> EventLocation {
        match self {
            LatLon::Text(text) => {
                let parts: Vec<&str> = text.split(',').collect();
                match parts.as_slice() {
                    [lat, lon] => EventLocation {
                        lat: lat.trim().parse().unwrap_or(0.0),
                        lon: lon.trim().parse().unwrap_or(0.0),
                    },
                    _ => EventLocation::default(),
                }
            }
            LatLon::Object { lat, lon } => EventLocation {
                lat: lat.as_f64().unwrap_or(0.0),
                lon: lon.as_f64().unwrap_or(0.0),
            },
            LatLon::Pair(values) if values.len() >= 2 => EventLocation {
                lat: values[0].as_f64().unwrap_or(0.0),
                lon: values[1].as_f64().unwrap_or(0.0),
            },
            LatLon::Pair(_) | LatLon::Other(_) => EventLocation::default(),
        }
    }
}

/// The City of Paris "Que faire à Paris" dataset. Only answers for Paris.
pub struct ParisOpenData {
    fetcher: Fetcher,
}

impl ParisOpenData {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn search_url() -> Result<Url> {
        Url::parse_with_params(
            SEARCH_URL,
            &[
                ("dataset", DATASET.to_string()),
                ("rows", ROWS.to_string()),
                ("sort", "date_start".to_string()),
            ],
        )
        .context("invalid paris open data url")
    }
}

impl Collector for ParisOpenData {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn url(&self) -> &'static str {
        HOME_URL
    }

    fn collect(&self, location: &CollectLocation) -> Result<Vec<Event>> {
        if location.city != CITY {
            return Ok(Vec::new());
        }

        let url = Self::search_url()?;
        info!(%url, "requesting paris open data");
        let body = self.fetcher.get_text(url)?;
        let events = decode_events(&body, Utc::now())?;
        info!(found = events.len(), "collected paris open data events");
        Ok(events)
    }
}

fn decode_events(body: &str, now: DateTime<Utc>) -> Result<Vec<Event>> {
    let response: SearchResponse =
        serde_json::from_str(body).context("error decoding paris open data response")?;
    debug!(nhits = response.nhits, records = response.records.len(), "paris open data answered");

    let mut events = Vec::new();
    for record in response.records {
        let fields: Fields = match serde_json::from_value(record.fields) {
            Ok(fields) => fields,
            Err(err) => {
                warn!(error = %err, "malformed paris open data record, skipping");
                continue;
            }
        };
        if fields.title.trim().is_empty() {
            debug!("paris open data record without a title, skipping");
            continue;
        }
        events.extend(record_events(&fields, now));
    }
    Ok(events)
}

fn record_events(fields: &Fields, now: DateTime<Utc>) -> Vec<Event> {
    match fields.occurrences.as_deref().filter(|o| !o.is_empty()) {
        Some(occurrences) => {
            let windows = parse_occurrences(occurrences, now);
            debug!(event = %fields.title, count = windows.len(), "expanded occurrences");
            windows
                .into_iter()
                .map(|(begin, end)| build_event(fields, begin, end))
                .collect()
        }
        None => match single_window(fields, now) {
            Some((begin, end)) => vec![build_event(fields, begin, end)],
            None => Vec::new(),
        },
    }
}

/// Expands `start_end;start_end;...` into the windows that have not ended.
/// Malformed pairs are skipped individually.
fn parse_occurrences(descriptor: &str, now: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    for occurrence in descriptor.split(';') {
        let parts: Vec<&str> = occurrence.split('_').collect();
        let [start, end] = parts.as_slice() else {
            warn!(occurrence, "invalid occurrence format");
            continue;
        };
        let (Some(begin), Some(end)) = (parse_time(start), parse_time(end)) else {
            warn!(occurrence, "error parsing occurrence times");
            continue;
        };
        if end < now {
            continue;
        }
        windows.push((begin, end));
    }
    windows
}

fn single_window(fields: &Fields, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let begin = fields.date_start.as_deref().and_then(parse_time);
    let end = fields.date_end.as_deref().and_then(parse_time);
    match (begin, end) {
        (Some(begin), Some(end)) if end >= now => Some((begin, end)),
        (Some(_), Some(_)) => {
            debug!(event = %fields.title, "event already ended, skipping");
            None
        }
        _ => {
            warn!(event = %fields.title, start = ?fields.date_start, end = ?fields.date_end, "error parsing dates, skipping event");
            None
        }
    }
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// First amount in a free-text price description, comma or dot decimal.
fn parse_price(price_type: Option<&str>, detail: Option<&str>) -> Option<f64> {
    if price_type == Some("gratuit") {
        return None;
    }
    let found = PRICE_RE.find(detail?)?;
    found
        .as_str()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|price| *price > 0.0)
}

fn build_event(fields: &Fields, begin: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    let genres: Vec<String> = fields
        .qfap_tags
        .as_deref()
        .filter(|tags| !tags.is_empty())
        .map(|tags| tags.split(';').map(str::to_string).collect())
        .unwrap_or_default();
    let price = parse_price(fields.price_type.as_deref(), fields.price_detail.as_deref());

    Event {
        name: fields.title.trim().to_string(),
        kind: first_kind_match(&genres),
        begin,
        end: Some(end),
        loc: fields
            .lat_lon
            .as_ref()
            .map(LatLon::location)
            .unwrap_or_default(),
        place: base::non_empty(fields.address_name.clone()),
        address: Some(format!(
            "{}, {} {}",
            fields.address_street, fields.address_zipcode, fields.address_city
        )),
        price,
        price_currency: price.map(|_| "EUR".to_string()),
        source: base::non_empty(fields.url.clone()),
        img: base::non_empty(fields.cover_url.clone()),
        genres,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::Kind;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 24, 12, 0, 0).unwrap()
    }

    const RESPONSE: &str = r#"
    {
        "nhits": 4,
        "records": [
            {
                "recordid": "a1",
                "fields": {
                    "url": "https://quefaire.paris.fr/1",
                    "title": "Atelier linogravure",
                    "occurrences": "2025-11-20T10:00:00+01:00_2025-11-20T12:00:00+01:00;2025-11-27T10:00:00+01:00_2025-11-27T12:00:00+01:00;garbage;2025-12-04T10:00:00+01:00_not-a-date",
                    "address_name": "Bibliothèque Forney",
                    "address_street": "1 rue du Figuier",
                    "address_zipcode": "75004",
                    "address_city": "Paris",
                    "price_type": "payant",
                    "price_detail": "Tarif plein : 12,50 €, réduit 8 €",
                    "qfap_tags": "Loisirs;Atelier",
                    "lat_lon": [48.8533, 2.3590]
                }
            },
            {
                "recordid": "b2",
                "fields": {
                    "title": "Concert au jardin",
                    "date_start": "2025-11-30T18:00:00+00:00",
                    "date_end": "2025-11-30T20:00:00+00:00",
                    "occurrences": "",
                    "address_street": "Jardin du Luxembourg",
                    "address_zipcode": "75006",
                    "address_city": "Paris",
                    "price_type": "gratuit",
                    "price_detail": "Entrée libre, 5 € conseillés",
                    "qfap_tags": "Concerts",
                    "lat_lon": "48.8462, 2.3372"
                }
            },
            {
                "recordid": "c3",
                "fields": {
                    "title": "Expo terminée",
                    "date_start": "2025-10-01T10:00:00+02:00",
                    "date_end": "2025-10-31T18:00:00+01:00",
                    "lat_lon": {"lat": 48.86, "lon": 2.35}
                }
            },
            {
                "recordid": "d4",
                "fields": {"title": ["not", "a", "string"]}
            }
        ]
    }
    "#;

    #[test]
    fn decodes_records_and_expands_occurrences() {
        let events = decode_events(RESPONSE, now()).unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Atelier linogravure", "Concert au jardin"]);

        let workshop = &events[0];
        assert_eq!(workshop.begin, Utc.with_ymd_and_hms(2025, 11, 27, 9, 0, 0).unwrap());
        assert_eq!(workshop.end, Some(Utc.with_ymd_and_hms(2025, 11, 27, 11, 0, 0).unwrap()));
        assert_eq!(workshop.kind, Kind::Workshop);
        assert_eq!(workshop.genres, vec!["Loisirs", "Atelier"]);
        assert_eq!(workshop.loc, EventLocation { lat: 48.8533, lon: 2.3590 });
        assert_eq!(workshop.place.as_deref(), Some("Bibliothèque Forney"));
        assert_eq!(workshop.address.as_deref(), Some("1 rue du Figuier, 75004 Paris"));
        assert_eq!(workshop.price, Some(12.5));
        assert_eq!(workshop.price_currency.as_deref(), Some("EUR"));

        let concert = &events[1];
        assert_eq!(concert.kind, Kind::Concert);
        assert_eq!(concert.loc, EventLocation { lat: 48.8462, lon: 2.3372 });
        assert_eq!(concert.price, None, "free events carry no price");
        assert_eq!(concert.place, None);
    }

    #[test]
    fn occurrences_keep_only_future_windows() {
        let windows = parse_occurrences(
            "2025-11-24T10:00:00Z_2025-11-24T11:00:00Z;2025-11-24T11:00:00Z_2025-11-24T13:00:00Z;2025-11-25T09:00:00Z_2025-11-25T10:00:00Z",
            now(),
        );
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].0, Utc.with_ymd_and_hms(2025, 11, 24, 11, 0, 0).unwrap());
        assert!(parse_occurrences("a_b_c;", now()).is_empty());
    }

    #[test]
    fn lat_lon_shapes() {
        let decode = |json: &str| serde_json::from_str::<LatLon>(json).unwrap().location();
        assert_eq!(decode(r#""48.85,2.35""#), EventLocation { lat: 48.85, lon: 2.35 });
        assert_eq!(decode(r#"{"lat": 48.85, "lon": 2.35}"#), EventLocation { lat: 48.85, lon: 2.35 });
        assert_eq!(decode("[48.85, 2.35]"), EventLocation { lat: 48.85, lon: 2.35 });
        assert_eq!(decode(r#""48.85""#), EventLocation::default());
        assert_eq!(decode("[48.85]"), EventLocation::default());
        assert_eq!(decode("12"), EventLocation::default());
    }

    #[test]
    fn extracts_first_price() {
        assert_eq!(parse_price(Some("payant"), Some("De 7 à 15 €")), Some(7.0));
        assert_eq!(parse_price(None, Some("3.5 euros")), Some(3.5));
        assert_eq!(parse_price(Some("payant"), Some("0 €")), None);
        assert_eq!(parse_price(Some("payant"), Some("sur réservation")), None);
        assert_eq!(parse_price(Some("gratuit"), Some("10 €")), None);
        assert_eq!(parse_price(Some("payant"), None), None);
    }

    #[test]
    fn skips_other_cities_without_requesting() {
        let fetcher = Fetcher::new(
            reqwest::blocking::Client::new(),
            super::super::RetryPolicy::none(),
        );
        let collector = ParisOpenData::new(fetcher);
        let lyon = CollectLocation {
            city: "Lyon".to_string(),
            lat: 45.76,
            lon: 4.83,
            radius: 20.0,
        };
        assert!(collector.collect(&lyon).unwrap().is_empty());
    }

    #[test]
    fn titles_are_kept_verbatim() {
        let body = r#"{"nhits": 1, "records": [{"recordid": "e5", "fields": {
            "title": " Nuit  Blanche   2025 ",
            "date_start": "2025-12-06T19:00:00+01:00",
            "date_end": "2025-12-07T07:00:00+01:00"
        }}]}"#;

        let events = decode_events(body, now()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Nuit  Blanche   2025");
    }
}
