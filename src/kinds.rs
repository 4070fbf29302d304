use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed event category vocabulary shared by every collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Kind {
    #[default]
    Unknown,
    Concert,
    Theater,
    Movie,
    Festival,
    Party,
    Karaoke,
    Business,
    FoodDrinks,
    Sports,
    Exhibitions,
    HealthWellness,
    Circus,
    Workshop,
    FleaMarket,
    Solidarity,
}

// First row containing the lowercased input wins.
static ALIASES: &[(&[&str], Kind)] = &[
    (&["movie", "movies", "ecrans"], Kind::Movie),
    (&["concert", "concerts", "spectacle musical"], Kind::Concert),
    (&["festival", "festivals"], Kind::Festival),
    (&["theater", "theaters", "théâtre", "humour"], Kind::Theater),
    (&["solidarité"], Kind::Solidarity),
    (
        &["party", "dance", "live-music", "parties", "danse"],
        Kind::Party,
    ),
    (&["karaoke"], Kind::Karaoke),
    (&["business", "meetups", "workshops"], Kind::Business),
    (&["food-drinks", "gourmand"], Kind::FoodDrinks),
    (&["sports", "sport"], Kind::Sports),
    (
        &[
            "exhibitions",
            "expo",
            "conférence",
            "salon",
            "art contemporain",
        ],
        Kind::Exhibitions,
    ),
    (&["health-wellness"], Kind::HealthWellness),
    (&["cirque"], Kind::Circus),
    (
        &[
            "workshop",
            "atelier",
            "littérature",
            "enfants",
            "loisirs",
            "nature",
        ],
        Kind::Workshop,
    ),
    (&["marché", "brocante"], Kind::FleaMarket),
];

impl Kind {
    pub const ALL: [Kind; 16] = [
        Kind::Unknown,
        Kind::Concert,
        Kind::Theater,
        Kind::Movie,
        Kind::Festival,
        Kind::Party,
        Kind::Karaoke,
        Kind::Business,
        Kind::FoodDrinks,
        Kind::Sports,
        Kind::Exhibitions,
        Kind::HealthWellness,
        Kind::Circus,
        Kind::Workshop,
        Kind::FleaMarket,
        Kind::Solidarity,
    ];

    /// Wire name, as stored and as sent to the map client.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Unknown => "unknown",
            Kind::Concert => "concert",
            Kind::Theater => "theater",
            Kind::Movie => "movie",
            Kind::Festival => "festival",
            Kind::Party => "party",
            Kind::Karaoke => "karaoke",
            Kind::Business => "business",
            Kind::FoodDrinks => "food-drinks",
            Kind::Sports => "sports",
            Kind::Exhibitions => "exhibitions",
            Kind::HealthWellness => "health-wellness",
            Kind::Circus => "circus",
            Kind::Workshop => "workshop",
            Kind::FleaMarket => "flea-market",
            Kind::Solidarity => "solidarity",
        }
    }

    /// Parses a wire name. Anything unrecognised is `Unknown`.
    pub fn from_wire(value: &str) -> Kind {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .unwrap_or(Kind::Unknown)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Kind::from_wire(&value))
    }
}

/// Classifies one free-text category from any source.
///
/// Matching is exact after lowercasing; unmapped vocabulary is `Unknown`.
pub fn kind_from_string(text: &str) -> Kind {
    let lowered = text.to_lowercase();
    ALIASES
        .iter()
        .find(|(aliases, _)| aliases.contains(&lowered.as_str()))
        .map(|(_, kind)| *kind)
        .unwrap_or(Kind::Unknown)
}

/// Returns the classification of the first tag that maps to a known kind,
/// in the order the source listed them.
pub fn first_kind_match<I, S>(tags: I) -> Kind
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| kind_from_string(tag.as_ref()))
        .find(|kind| *kind != Kind::Unknown)
        .unwrap_or(Kind::Unknown)
}
