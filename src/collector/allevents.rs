use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::{self, Fetcher, Loose};
use super::merge;
use super::Collector;
use crate::kinds::{first_kind_match, Kind};
use crate::models::{CollectLocation, Event, EventLocation};

const ID: &str = "allevents";
const NAME: &str = "AllEvents";
const ORIGIN: &str = "https://allevents.in";
const CATEGORY_URL: &str =
    "https://allevents.in/api/index.php/events/find-events-from-nearby-cities";
const MOBILE_URL: &str =
    "https://allevents.in/api/index.php/mobile_apps/v2/qs/search_with_filters_v2";
const TIMEZONE: Tz = chrono_tz::Europe::Paris;

const CATEGORIES: [&str; 12] = [
    "music",
    "parties",
    "entertainment",
    "art",
    "food-drinks",
    "business",
    "sports",
    "exhibitions",
    "health-wellness",
    "workshops",
    "lgbt-pride",
    "theatre",
];

const CATEGORY_ROWS: u32 = 1000;
const CATEGORY_RADIUS: u32 = 100_000;
const CATEGORY_DAYS_BEFORE: i64 = 7;
const CATEGORY_DAYS_AFTER: i64 = 15;
const MOBILE_ROWS: u32 = 3000;
const MOBILE_DISTANCE: u32 = 50;

#[derive(Debug, Serialize)]
struct CategoryQuery<'a> {
    city: &'a str,
    page: u32,
    rows: u32,
    radius: u32,
    exclude_cities: [&'a str; 1],
    category: &'a str,
    is_time_filter: bool,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
struct MobileQuery<'a> {
    latitude: String,
    longitude: String,
    city: &'a str,
    start_date: String,
    search_scope: &'a str,
    page: u32,
    rows: u32,
    show_long_date_format: bool,
    distance: u32,
    user_lat: String,
    user_long: String,
}

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct MobileResponse {
    #[serde(default)]
    search_result: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    eventname: Option<String>,
    thumb_url: Option<String>,
    start_time: Option<Loose>,
    end_time: Option<Loose>,
    location: Option<String>,
    categories: Option<Vec<String>>,
    venue: Option<RawVenue>,
    share_url: Option<String>,
    tickets: Option<RawTickets>,
    custom_params: Option<RawCustomParams>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVenue {
    street: Option<String>,
    latitude: Option<Loose>,
    longitude: Option<Loose>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTickets {
    ticket_currency: Option<String>,
    min_ticket_price: Option<Loose>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCustomParams {
    high_confidence_merged_lookup: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Query {
    /// Carries categories and tags; its events are authoritative.
    Category,
    /// Broader search without taxonomy.
    Mobile,
}

/// allevents.in, queried through its category search and its mobile search.
pub struct AllEvents {
    fetcher: Fetcher,
}

impl AllEvents {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn headers(location: &CollectLocation) -> [(&'static str, String); 3] {
        [
            ("Accept", "application/json, text/plain, */*".to_string()),
            ("Origin", ORIGIN.to_string()),
            ("Referer", format!("{ORIGIN}/{}", location.city)),
        ]
    }

    fn category_query(
        &self,
        location: &CollectLocation,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let query = CategoryQuery {
            city: &location.city,
            page: 0,
            rows: CATEGORY_ROWS,
            radius: CATEGORY_RADIUS,
            exclude_cities: ["online"],
            category,
            is_time_filter: true,
            start_date: (now - Duration::days(CATEGORY_DAYS_BEFORE))
                .timestamp()
                .to_string(),
            end_date: (now + Duration::days(CATEGORY_DAYS_AFTER))
                .timestamp()
                .to_string(),
        };
        let url = Url::parse(CATEGORY_URL).context("invalid allevents category url")?;
        let body = self
            .fetcher
            .post_json(url, &query, &Self::headers(location))?;
        decode_events(&body, Query::Category)
    }

    fn mobile_query(&self, location: &CollectLocation, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let lat = format!("{:.10}", location.lat);
        let lon = format!("{:.10}", location.lon);
        let query = MobileQuery {
            latitude: lat.clone(),
            longitude: lon.clone(),
            city: &location.city,
            start_date: now.with_timezone(&TIMEZONE).format("%Y-%m-%d").to_string(),
            search_scope: "city",
            page: 0,
            rows: MOBILE_ROWS,
            show_long_date_format: false,
            distance: MOBILE_DISTANCE,
            user_lat: lat,
            user_long: lon,
        };
        let url = Url::parse(MOBILE_URL).context("invalid allevents mobile url")?;
        let body = self
            .fetcher
            .post_json(url, &query, &Self::headers(location))?;
        decode_events(&body, Query::Mobile)
    }
}

impl Collector for AllEvents {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn url(&self) -> &'static str {
        ORIGIN
    }

    fn collect(&self, location: &CollectLocation) -> Result<Vec<Event>> {
        let now = Utc::now();
        gather(&location.city, |request| match request {
            Request::Mobile => self.mobile_query(location, now),
            Request::Category(category) => self.category_query(location, category, now),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    Mobile,
    Category(&'static str),
}

/// Runs the mobile search then every category search. A failed request is
/// logged and contributes nothing; only a city where every request failed
/// is an error.
fn gather<F>(city: &str, mut run: F) -> Result<Vec<Event>>
where
    F: FnMut(Request) -> Result<Vec<Event>>,
{
    let mut errors: Vec<(String, anyhow::Error)> = Vec::new();

    let mobile_events = match run(Request::Mobile) {
        Ok(events) => {
            info!(city, found = events.len(), "collected allevents from mobile search");
            events
        }
        Err(err) => {
            warn!(city, error = %err, "allevents mobile search failed");
            errors.push(("mobile".to_string(), err));
            Vec::new()
        }
    };

    let mut category_events = Vec::new();
    for category in CATEGORIES {
        match run(Request::Category(category)) {
            Ok(mut events) => {
                info!(city, category, found = events.len(), "collected allevents by category");
                category_events.append(&mut events);
            }
            Err(err) => {
                warn!(city, category, error = %err, "allevents category search failed");
                errors.push((category.to_string(), err));
            }
        }
    }

    if errors.len() == CATEGORIES.len() + 1 {
        let joined = errors
            .into_iter()
            .map(|(query, err)| format!("{query}: {err:#}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(anyhow!("every allevents query failed: {joined}"));
    }

    Ok(merge::merge_and_dedup(category_events, mobile_events))
}

fn decode_events(body: &str, query: Query) -> Result<Vec<Event>> {
    let items = match query {
        Query::Category => {
            let response: CategoryResponse =
                serde_json::from_str(body).context("error decoding allevents category response")?;
            response.data.unwrap_or_default()
        }
        Query::Mobile => {
            let response: MobileResponse =
                serde_json::from_str(body).context("error decoding allevents mobile response")?;
            response.search_result.unwrap_or_default()
        }
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        let raw: RawEvent = match serde_json::from_value(item) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "malformed allevents item, skipping");
                continue;
            }
        };
        if let Some(event) = to_event(raw, query) {
            events.push(event);
        }
    }
    Ok(events)
}

fn to_event(raw: RawEvent, query: Query) -> Option<Event> {
    let name = raw.eventname.as_deref().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        debug!("allevents item without a name, skipping");
        return None;
    }

    let begin = match raw.start_time.as_ref().and_then(Loose::as_timestamp) {
        Some(begin) => begin,
        None => {
            warn!(event = %name, start_time = ?raw.start_time, "error parsing start time, skipping event");
            return None;
        }
    };
    let end = raw.end_time.as_ref().and_then(Loose::as_timestamp);

    let venue = raw.venue.unwrap_or_default();
    let loc = EventLocation {
        lat: base::coordinate(venue.latitude.as_ref()),
        lon: base::coordinate(venue.longitude.as_ref()),
    };

    let tickets = raw.tickets.unwrap_or_default();
    let price = base::normalize_price(tickets.min_ticket_price.as_ref());
    let price_currency = price.and_then(|_| base::non_empty(tickets.ticket_currency));

    let (kind, genres) = match query {
        Query::Category => {
            let tags = raw
                .custom_params
                .and_then(|params| params.high_confidence_merged_lookup)
                .unwrap_or_default();
            let categories = raw.categories.unwrap_or_default();
            let kind = first_kind_match(categories.iter().chain(tags.iter()));
            (kind, tags)
        }
        Query::Mobile => (Kind::Unknown, Vec::new()),
    };

    Some(Event {
        name,
        kind,
        genres,
        begin,
        end,
        loc,
        place: base::non_empty(raw.location),
        address: base::non_empty(venue.street),
        price,
        price_currency,
        source: base::non_empty(raw.share_url),
        img: base::non_empty(raw.thumb_url),
    })
}
