use std::iter::FusedIterator;

use crate::models::CollectLocation;

// (city, lat, lon, radius in km), ordered by population.
static FRENCH_CITIES: &[(&str, f64, f64, f64)] = &[
    ("Paris", 48.8566, 2.3522, 10.0),
    ("Marseille", 43.2965, 5.3698, 8.0),
    ("Lyon", 45.7640, 4.8357, 8.0),
    ("Toulouse", 43.6047, 1.4442, 7.0),
    ("Nice", 43.7102, 7.2620, 6.0),
    ("Nantes", 47.2184, -1.5536, 6.0),
    ("Montpellier", 43.6108, 3.8767, 6.0),
    ("Strasbourg", 48.5734, 7.7521, 6.0),
    ("Bordeaux", 44.8378, -0.5792, 6.0),
    ("Lille", 50.6292, 3.0573, 6.0),
    ("Rennes", 48.1173, -1.6778, 5.0),
    ("Reims", 49.2583, 4.0317, 5.0),
    ("Le Havre", 49.4944, 0.1079, 5.0),
    ("Saint-Étienne", 45.4397, 4.3872, 5.0),
    ("Toulon", 43.1242, 5.9280, 5.0),
    ("Angers", 47.4784, -0.5632, 5.0),
    ("Grenoble", 45.1885, 5.7245, 5.0),
    ("Dijon", 47.3220, 5.0415, 5.0),
    ("Nîmes", 43.8367, 4.3601, 5.0),
    ("Aix-en-Provence", 43.5297, 5.4474, 5.0),
    ("Saint-Denis", 48.9358, 2.3596, 5.0),
    ("Le Mans", 48.0061, 0.1996, 5.0),
    ("Clermont-Ferrand", 45.7772, 3.0870, 5.0),
    ("Tours", 47.3941, 0.6848, 5.0),
    ("Limoges", 45.8336, 1.2611, 5.0),
    ("Villeurbanne", 45.7712, 4.8800, 4.0),
    ("Amiens", 49.8942, 2.2957, 4.0),
    ("Metz", 49.1193, 6.1757, 4.0),
    ("Besançon", 47.2380, 6.0243, 4.0),
    ("Perpignan", 42.6986, 2.8956, 4.0),
];

/// Cursor over the built-in French city seeds.
///
/// Each value owns its own position, so independent batch runs never share
/// progress. Once exhausted it keeps returning `None`; start over with a new
/// instance.
#[derive(Debug, Clone, Default)]
pub struct FrenchCities {
    index: usize,
}

impl FrenchCities {
    pub fn new() -> Self {
        Self { index: 0 }
    }

    pub fn seed_count() -> usize {
        FRENCH_CITIES.len()
    }
}

impl Iterator for FrenchCities {
    type Item = CollectLocation;

    fn next(&mut self) -> Option<CollectLocation> {
        let seed = FRENCH_CITIES.get(self.index)?;
        self.index += 1;
        Some(to_location(seed))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = FRENCH_CITIES.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrenchCities {}

impl FusedIterator for FrenchCities {}

fn to_location(seed: &(&str, f64, f64, f64)) -> CollectLocation {
    let (city, lat, lon, radius) = *seed;
    CollectLocation {
        city: city.to_string(),
        lat,
        lon,
        radius,
    }
}
