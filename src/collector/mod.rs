pub mod allevents;
pub mod base;
pub mod bobine;
pub mod composite;
pub mod merge;
pub mod paris_open_data;

use anyhow::Result;

use crate::models::{CollectLocation, Event};

pub use base::{Fetcher, RetryPolicy};
pub use composite::CompositeCollector;

/// One upstream source of events.
pub trait Collector: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn url(&self) -> &'static str;
    fn collect(&self, location: &CollectLocation) -> Result<Vec<Event>>;
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn url(&self) -> &'static str {
        (**self).url()
    }

    fn collect(&self, location: &CollectLocation) -> Result<Vec<Event>> {
        (**self).collect(location)
    }
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct CollectorInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

fn active_collectors(fetcher: &Fetcher) -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(allevents::AllEvents::new(fetcher.clone())),
        Box::new(bobine::Bobine::new(fetcher.clone())),
        Box::new(paris_open_data::ParisOpenData::new(fetcher.clone())),
    ]
}

pub fn list_collectors(fetcher: &Fetcher) -> Vec<CollectorInfo> {
    active_collectors(fetcher)
        .into_iter()
        .map(|collector| CollectorInfo {
            id: collector.id().to_string(),
            name: collector.name().to_string(),
            url: collector.url().to_string(),
        })
        .collect()
}

pub fn find_collector(id: &str, fetcher: &Fetcher) -> Option<Box<dyn Collector>> {
    active_collectors(fetcher)
        .into_iter()
        .find(|collector| collector.id() == id)
}

/// Every source, in collection order.
pub fn default_composite(fetcher: &Fetcher) -> CompositeCollector {
    CompositeCollector::new(active_collectors(fetcher))
}
