use anyhow::{Context, Result};
use tracing::info;

use crate::collector::Collector;
use crate::models::{CollectLocation, Event};

/// Destination for collected batches.
pub trait EventSaver: Send + Sync {
    /// Persists a batch and returns how many events the sink reports as saved.
    fn save_events(&self, events: &[Event]) -> Result<usize>;
}

impl<S: EventSaver + ?Sized> EventSaver for Box<S> {
    fn save_events(&self, events: &[Event]) -> Result<usize> {
        (**self).save_events(events)
    }
}

/// Collects one location and hands the whole batch to a saver.
pub struct Populator<C, S> {
    collector: C,
    saver: S,
}

impl<C: Collector, S: EventSaver> Populator<C, S> {
    pub fn new(collector: C, saver: S) -> Self {
        Self { collector, saver }
    }

    /// Nothing is saved when collection fails.
    pub fn populate(&self, location: &CollectLocation) -> Result<usize> {
        let events = self.collector.collect(location)?;
        let saved = self
            .saver
            .save_events(&events)
            .with_context(|| format!("unable to save events for {}", location.city))?;
        info!(city = %location.city, collected = events.len(), saved, "populated location");
        Ok(saved)
    }
}
