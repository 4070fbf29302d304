use std::{path::Path, sync::Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::kinds::Kind;
use crate::models::{Bounds, Event, EventLocation, EventPlacement};
use crate::pins::EventRepository;
use crate::populate::EventSaver;
use crate::utils;

/// Upper bound on rows returned by a viewport query.
pub const MAX_QUERY_ROWS: i64 = 5000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("event payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("event store lock poisoned")]
    Poisoned,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                begin_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                payload TEXT NOT NULL,
                first_seen_utc TEXT NOT NULL,
                last_seen_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS events_lat_lon ON events(lat, lon);
            CREATE INDEX IF NOT EXISTS events_end ON events(end_ms);",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Upserts every event valid at `now` in one transaction; the rest are
    /// skipped. Returns how many were written.
    pub fn upsert_valid(&self, events: &[Event], now: DateTime<Utc>) -> Result<usize, StoreError> {
        let seen = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut saved = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events (id, name, kind, lat, lon, begin_ms, end_ms, payload, first_seen_utc, last_seen_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                   kind = excluded.kind,
                   lat = excluded.lat,
                   lon = excluded.lon,
                   payload = excluded.payload,
                   last_seen_utc = excluded.last_seen_utc",
            )?;
            for event in events {
                let Some(end) = event.end.filter(|_| event.is_valid(now)) else {
                    debug!(event = %event.name, "skipping invalid event");
                    continue;
                };
                let payload = serde_json::to_string(event)?;
                stmt.execute(params![
                    event_id(event),
                    event.name,
                    event.kind.as_str(),
                    event.loc.lat,
                    event.loc.lon,
                    event.begin.timestamp_millis(),
                    end.timestamp_millis(),
                    payload,
                    seen,
                ])?;
                saved += 1;
            }
        }
        tx.commit()?;
        Ok(saved)
    }

    /// Placements inside `bounds` (edges included) ending no later than
    /// `max_date`.
    pub fn placements(
        &self,
        bounds: &Bounds,
        max_date: DateTime<Utc>,
    ) -> Result<Vec<EventPlacement>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT kind, lat, lon FROM events
             WHERE lat >= ?1 AND lat <= ?2 AND lon >= ?3 AND lon <= ?4 AND end_ms <= ?5
             LIMIT ?6",
        )?;
        let rows = stmt.query_map(
            params![
                bounds.south,
                bounds.north,
                bounds.west,
                bounds.east,
                max_date.timestamp_millis(),
                MAX_QUERY_ROWS
            ],
            |row| {
                let kind: String = row.get(0)?;
                Ok(EventPlacement {
                    kind: Kind::from_wire(&kind),
                    loc: EventLocation {
                        lat: row.get(1)?,
                        lon: row.get(2)?,
                    },
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Removes events that ended before `now`.
    pub fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM events WHERE end_ms < ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl EventRepository for Store {
    fn by_bounds_and_max_date(
        &self,
        bounds: &Bounds,
        max_date: DateTime<Utc>,
    ) -> Result<Vec<EventPlacement>, StoreError> {
        self.placements(bounds, max_date)
    }
}

impl EventSaver for Store {
    fn save_events(&self, events: &[Event]) -> anyhow::Result<usize> {
        Ok(self.upsert_valid(events, Utc::now())?)
    }
}

/// Stable key over the natural uniqueness tuple `(name, begin, end)`.
pub fn event_id(event: &Event) -> String {
    let end = event
        .end
        .map(|end| end.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(event.name.as_bytes());
    hasher.update(b"|");
    hasher.update(event.begin.to_rfc3339_opts(SecondsFormat::Secs, true).as_bytes());
    hasher.update(b"|");
    hasher.update(end.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 24, 12, 0, 0).unwrap()
    }

    fn event(name: &str, lat: f64, lon: f64, kind: Kind, hours: i64) -> Event {
        let mut event = Event::new(name, now());
        event.kind = kind;
        event.loc = EventLocation { lat, lon };
        event.end = Some(now() + Duration::hours(hours));
        event
    }

    fn paris_bounds() -> Bounds {
        Bounds {
            north: 50.0,
            south: 40.0,
            east: 5.0,
            west: -5.0,
        }
    }

    #[test]
    fn upsert_skips_invalid_and_updates_in_place() {
        let store = Store::open_in_memory().unwrap();
        let mut too_long = event("Biennale", 48.8, 2.3, Kind::Exhibitions, 0);
        too_long.end = Some(now() + Duration::days(16));
        let mut ended = event("Hier soir", 48.8, 2.3, Kind::Party, 0);
        ended.end = Some(now() - Duration::hours(1));
        let mut no_end = event("Sans fin", 48.8, 2.3, Kind::Party, 0);
        no_end.end = None;

        let saved = store
            .upsert_valid(
                &[event("Concert", 48.8, 2.3, Kind::Concert, 2), too_long, ended, no_end],
                now(),
            )
            .unwrap();
        assert_eq!(saved, 1);

        let mut moved = event("Concert", 48.9, 2.4, Kind::Festival, 2);
        moved.price = Some(20.0);
        assert_eq!(store.upsert_valid(&[moved.clone()], now()).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(
            store.placements(&paris_bounds(), now() + Duration::days(1)).unwrap(),
            vec![EventPlacement {
                loc: EventLocation { lat: 48.9, lon: 2.4 },
                kind: Kind::Festival,
            }]
        );
    }

    #[test]
    fn query_filters_by_bounds_and_end() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_valid(
                &[
                    event("Inside", 48.8, 2.3, Kind::Concert, 2),
                    event("Edge", 50.0, 5.0, Kind::Theater, 2),
                    event("Outside", 51.0, 2.3, Kind::Concert, 2),
                    event("Later", 48.8, 2.3, Kind::Concert, 72),
                ],
                now(),
            )
            .unwrap();

        let mut found = store
            .by_bounds_and_max_date(&paris_bounds(), now() + Duration::days(1))
            .unwrap();
        found.sort_by(|a, b| a.loc.lat.total_cmp(&b.loc.lat));

        assert_eq!(
            found,
            vec![
                EventPlacement {
                    loc: EventLocation { lat: 48.8, lon: 2.3 },
                    kind: Kind::Concert
                },
                EventPlacement {
                    loc: EventLocation { lat: 50.0, lon: 5.0 },
                    kind: Kind::Theater
                },
            ]
        );

        let narrow = Bounds {
            north: 45.0,
            south: 41.0,
            east: 5.0,
            west: 1.0,
        };
        assert!(store
            .by_bounds_and_max_date(&narrow, now() + Duration::days(5))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sweep_removes_ended_events() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_valid(
                &[
                    event("Short", 48.8, 2.3, Kind::Concert, 1),
                    event("Long", 48.8, 2.3, Kind::Concert, 10),
                ],
                now(),
            )
            .unwrap();

        assert_eq!(store.delete_expired(now() + Duration::hours(2)).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.delete_expired(now()).unwrap(), 0);
    }

    #[test]
    fn opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.sqlite");
        {
            let store = Store::open(&path).unwrap();
            store
                .upsert_valid(&[event("Persisted", 48.8, 2.3, Kind::Movie, 3)], now())
                .unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn id_depends_on_natural_key_only() {
        let a = event("Concert", 48.8, 2.3, Kind::Concert, 2);
        let mut b = a.clone();
        b.loc = EventLocation { lat: 0.0, lon: 0.0 };
        b.price = Some(5.0);
        assert_eq!(event_id(&a), event_id(&b));

        b.end = Some(now() + Duration::hours(3));
        assert_ne!(event_id(&a), event_id(&b));
    }
}
