use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::db::StoreError;
use crate::kinds::Kind;
use crate::models::{Bounds, EventPlacement, Pin};

/// Read side of the event store used to build map pins.
pub trait EventRepository: Send + Sync {
    fn by_bounds_and_max_date(
        &self,
        bounds: &Bounds,
        max_date: DateTime<Utc>,
    ) -> Result<Vec<EventPlacement>, StoreError>;
}

#[derive(Clone)]
pub struct PinsService {
    repository: Arc<dyn EventRepository>,
}

impl PinsService {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }

    /// One pin per exact `(lat, lon, kind)` among events inside `bounds`
    /// ending by `max_date`.
    pub fn get_pins(&self, bounds: &Bounds, max_date: DateTime<Utc>) -> Result<Vec<Pin>, StoreError> {
        let placements = self.repository.by_bounds_and_max_date(bounds, max_date)?;
        Ok(group_pins(&placements))
    }
}

pub fn group_pins(placements: &[EventPlacement]) -> Vec<Pin> {
    let mut groups: HashMap<(u64, u64, Kind), Pin> = HashMap::new();
    for placement in placements {
        let key = (
            placement.loc.lat.to_bits(),
            placement.loc.lon.to_bits(),
            placement.kind,
        );
        groups
            .entry(key)
            .or_insert(Pin {
                loc: placement.loc,
                kind: placement.kind,
                amount: 0,
            })
            .amount += 1;
    }

    // Ordered as text, so negative coordinates do not sort numerically.
    let mut keyed: Vec<(String, (u64, u64, Kind), Pin)> = groups
        .into_iter()
        .map(|(key, pin)| (sort_key(&pin), key, pin))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    keyed.into_iter().map(|(_, _, pin)| pin).collect()
}

fn sort_key(pin: &Pin) -> String {
    format!("{:.6}:{:.6}:{}", pin.loc.lat, pin.loc.lon, pin.kind)
}
