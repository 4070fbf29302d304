use anyhow::{Context, Result};
use tracing::info;

use super::Collector;
use crate::models::{CollectLocation, Event};

/// Runs every source in order over one location and concatenates the results.
///
/// The first failing source aborts the whole collection; nothing gathered
/// from earlier sources is returned.
pub struct CompositeCollector {
    collectors: Vec<Box<dyn Collector>>,
}

impl CompositeCollector {
    pub fn new(collectors: Vec<Box<dyn Collector>>) -> Self {
        Self { collectors }
    }
}

impl Collector for CompositeCollector {
    fn id(&self) -> &'static str {
        "composite"
    }

    fn name(&self) -> &'static str {
        "All sources"
    }

    fn url(&self) -> &'static str {
        ""
    }

    fn collect(&self, location: &CollectLocation) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for collector in &self.collectors {
            let mut found = collector
                .collect(location)
                .with_context(|| format!("collector {} failed for {}", collector.id(), location.city))?;
            info!(collector = collector.id(), city = %location.city, found = found.len(), "collected");
            events.append(&mut found);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct Fixed {
        id: &'static str,
        names: Vec<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl Collector for Fixed {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            self.id
        }

        fn url(&self) -> &'static str {
            ""
        }

        fn collect(&self, _location: &CollectLocation) -> Result<Vec<Event>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let begin = Utc.with_ymd_and_hms(2025, 11, 24, 20, 0, 0).unwrap();
            Ok(self.names.iter().map(|name| Event::new(*name, begin)).collect())
        }
    }

    struct Failing;

    impl Collector for Failing {
        fn id(&self) -> &'static str {
            "failing"
        }

        fn name(&self) -> &'static str {
            "failing"
        }

        fn url(&self) -> &'static str {
            ""
        }

        fn collect(&self, _location: &CollectLocation) -> Result<Vec<Event>> {
            Err(anyhow!("upstream answered 503"))
        }
    }

    fn paris() -> CollectLocation {
        CollectLocation {
            city: "Paris".to_string(),
            lat: 48.8566,
            lon: 2.3522,
            radius: 10.0,
        }
    }

    fn fixed(id: &'static str, names: Vec<&'static str>, calls: &Arc<AtomicUsize>) -> Box<dyn Collector> {
        Box::new(Fixed {
            id,
            names,
            calls: calls.clone(),
        })
    }

    #[test]
    fn concatenates_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let composite = CompositeCollector::new(vec![
            fixed("a", vec!["A1", "A2"], &calls),
            fixed("b", vec!["B1"], &calls),
        ]);

        let events = composite.collect(&paris()).unwrap();

        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A1", "A2", "B1"]);
    }

    #[test]
    fn first_failure_aborts_collection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let composite = CompositeCollector::new(vec![
            fixed("a", vec!["A1"], &calls),
            Box::new(Failing),
            fixed("c", vec!["C1"], &calls),
        ]);

        let err = composite.collect(&paris()).unwrap_err();

        assert!(format!("{err:#}").contains("collector failing failed for Paris"));
        assert!(format!("{err:#}").contains("503"));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "later sources never run");
    }

    #[test]
    fn empty_composite_collects_nothing() {
        let composite = CompositeCollector::new(Vec::new());
        assert!(composite.collect(&paris()).unwrap().is_empty());
    }
}
