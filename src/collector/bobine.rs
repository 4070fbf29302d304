use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::base::{self, Fetcher};
use super::Collector;
use crate::kinds::Kind;
use crate::models::{CollectLocation, Event, EventLocation};

const ID: &str = "bobine";
const NAME: &str = "Bobine";
const BASE_URL: &str = "https://bobine.art";
const SEARCH_URL: &str = "https://bobine.art/api/showtimes/search";
const PAGE_SIZE: u32 = 20;
const WINDOW_DAYS: i64 = 2;
// The search never reports a total; stop here if it keeps answering.
const MAX_PAGES: u32 = 200;

#[derive(Debug, Deserialize)]
struct MovieEntry {
    movie: Movie,
    #[serde(default)]
    theaters: Vec<Theater>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Movie {
    id: i64,
    title_vo: String,
    title_vf: String,
    duration: Option<i64>,
    poster_path: Option<String>,
    genres: Option<String>,
}

impl Movie {
    fn title(&self) -> &str {
        if self.title_vf.is_empty() {
            &self.title_vo
        } else {
            &self.title_vf
        }
    }

    fn page_url(&self) -> String {
        format!("{BASE_URL}/film/{}-{}", self.title_vo, self.id)
    }

    /// End of a showing, `None` when the runtime is out of range.
    fn end_of(&self, begin: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let runtime = Duration::try_minutes(self.duration.unwrap_or(0))?;
        begin.checked_add_signed(runtime)
    }

    fn genres(&self) -> Vec<String> {
        match &self.genres {
            Some(genres) => genres.split(", ").map(str::to_string).collect(),
            None => vec!["movie".to_string()],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Theater {
    name: Option<String>,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    full_price: Option<f64>,
    showtimes: Vec<Showtime>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Showtime {
    showtime: String,
}

/// bobine.art cinema showtimes around a location, over the next two days.
pub struct Bobine {
    fetcher: Fetcher,
}

impl Bobine {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    fn page_url(
        location: &CollectLocation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
    ) -> Result<Url> {
        Url::parse_with_params(
            SEARCH_URL,
            &[
                ("range", location.radius.to_string()),
                ("order_by", "next_showtime".to_string()),
                ("order_dir", "asc".to_string()),
                ("latitude", format!("{:.7}", location.lat)),
                ("longitude", format!("{:.7}", location.lon)),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("page", page.to_string()),
                ("page_size", PAGE_SIZE.to_string()),
            ],
        )
        .context("invalid bobine search url")
    }
}

impl Collector for Bobine {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn url(&self) -> &'static str {
        BASE_URL
    }

    fn collect(&self, location: &CollectLocation) -> Result<Vec<Event>> {
        let start = Utc::now();
        let end = start + Duration::days(WINDOW_DAYS);

        let events = collect_pages(|page| {
            let url = Self::page_url(location, start, end, page)?;
            let body = self.fetcher.get_text(url)?;
            decode_page(&body).with_context(|| format!("bobine page {page}"))
        })?;

        info!(city = %location.city, found = events.len(), "collected bobine showtimes");
        Ok(events)
    }
}

/// Walks pages from 1 until one comes back empty.
fn collect_pages<F>(mut fetch_page: F) -> Result<Vec<Event>>
where
    F: FnMut(u32) -> Result<Option<Vec<MovieEntry>>>,
{
    let mut events = Vec::new();
    for page in 1..=MAX_PAGES {
        let Some(entries) = fetch_page(page)? else {
            return Ok(events);
        };
        events.extend(entries.iter().flat_map(to_events));
    }
    warn!(max_pages = MAX_PAGES, "bobine pagination did not end, stopping");
    Ok(events)
}

/// `None` marks the empty page that ends pagination. Entries that do not
/// decode are dropped from an otherwise non-empty page.
fn decode_page(body: &str) -> Result<Option<Vec<MovieEntry>>> {
    let items: Vec<Value> =
        serde_json::from_str(body).context("error decoding bobine response")?;
    if items.is_empty() {
        return Ok(None);
    }
    let entries = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<MovieEntry>(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "malformed bobine entry, skipping");
                None
            }
        })
        .collect();
    Ok(Some(entries))
}

fn to_events(entry: &MovieEntry) -> Vec<Event> {
    let movie = &entry.movie;
    let mut events = Vec::new();

    for theater in &entry.theaters {
        let price = theater
            .full_price
            .filter(|price| price.is_finite() && *price > 0.0);
        let loc = EventLocation {
            lat: theater.latitude.unwrap_or(0.0),
            lon: theater.longitude.unwrap_or(0.0),
        };

        for showtime in &theater.showtimes {
            let begin = match DateTime::parse_from_rfc3339(&showtime.showtime) {
                Ok(begin) => begin.with_timezone(&Utc),
                Err(err) => {
                    warn!(movie = movie.title(), showtime = %showtime.showtime, error = %err, "error parsing showtime, skipping");
                    continue;
                }
            };
            let Some(end) = movie.end_of(begin) else {
                warn!(movie = movie.title(), duration = ?movie.duration, "runtime out of range, skipping");
                continue;
            };

            events.push(Event {
                name: movie.title().to_string(),
                kind: Kind::Movie,
                genres: movie.genres(),
                begin,
                end: Some(end),
                loc,
                place: base::non_empty(theater.name.clone()),
                address: base::non_empty(theater.address.clone()),
                price,
                price_currency: price.map(|_| "EUR".to_string()),
                source: Some(movie.page_url()),
                img: base::non_empty(movie.poster_path.clone()),
            });
        }
    }

    events
}
