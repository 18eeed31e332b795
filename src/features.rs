//! Audio-feature schema and the validated per-track feature vector.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{FeatureIssue, InvalidFeatureVector};

pub const DIMENSION_COUNT: usize = 10;

/// Named audio dimension, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Danceability,
    Energy,
    Key,
    Loudness,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
}

impl Dimension {
    pub const ALL: [Dimension; DIMENSION_COUNT] = [
        Dimension::Danceability,
        Dimension::Energy,
        Dimension::Key,
        Dimension::Loudness,
        Dimension::Speechiness,
        Dimension::Acousticness,
        Dimension::Instrumentalness,
        Dimension::Liveness,
        Dimension::Valence,
        Dimension::Tempo,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Danceability => "danceability",
            Dimension::Energy => "energy",
            Dimension::Key => "key",
            Dimension::Loudness => "loudness",
            Dimension::Speechiness => "speechiness",
            Dimension::Acousticness => "acousticness",
            Dimension::Instrumentalness => "instrumentalness",
            Dimension::Liveness => "liveness",
            Dimension::Valence => "valence",
            Dimension::Tempo => "tempo",
        }
    }

    /// Declared value range. Key is a pitch class with -1 for "no key
    /// detected", loudness is in dB and tempo in BPM; everything else is
    /// normalized to [0, 1].
    #[must_use]
    pub fn range(self) -> RangeInclusive<f64> {
        match self {
            Dimension::Key => -1.0..=11.0,
            Dimension::Loudness => -60.0..=5.0,
            Dimension::Tempo => 0.0..=300.0,
            _ => 0.0..=1.0,
        }
    }

    /// Checks a raw value against the declared range.
    ///
    /// # Errors
    /// Returns [`InvalidFeatureVector`] for non-finite or out-of-range values.
    pub fn validate(self, value: f64) -> Result<f64, InvalidFeatureVector> {
        if !value.is_finite() {
            return Err(InvalidFeatureVector {
                dimension: self.name().to_string(),
                issue: FeatureIssue::NotFinite(value),
            });
        }
        let range = self.range();
        if !range.contains(&value) {
            return Err(InvalidFeatureVector {
                dimension: self.name().to_string(),
                issue: FeatureIssue::OutOfRange {
                    value,
                    min: *range.start(),
                    max: *range.end(),
                },
            });
        }
        Ok(value)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = InvalidFeatureVector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|dimension| dimension.name() == normalized)
            .ok_or_else(|| InvalidFeatureVector::unknown(s.trim()))
    }
}

/// Fixed-slot map keyed by [`Dimension`], iterated in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionMap<T> {
    slots: [Option<T>; DIMENSION_COUNT],
}

impl<T> Default for DimensionMap<T> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl<T> DimensionMap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<&T> {
        self.slots[dimension.index()].as_ref()
    }

    pub fn insert(&mut self, dimension: Dimension, value: T) -> Option<T> {
        self.slots[dimension.index()].replace(value)
    }

    #[must_use]
    pub fn contains(&self, dimension: Dimension) -> bool {
        self.slots[dimension.index()].is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &T)> + '_ {
        Dimension::ALL
            .into_iter()
            .filter_map(move |dimension| self.get(dimension).map(|value| (dimension, value)))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.iter().map(|(dimension, _)| dimension)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl<T: Copy> DimensionMap<T> {
    #[must_use]
    pub fn value(&self, dimension: Dimension) -> Option<T> {
        self.slots[dimension.index()]
    }
}

impl<T> FromIterator<(Dimension, T)> for DimensionMap<T> {
    fn from_iter<I: IntoIterator<Item = (Dimension, T)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (dimension, value) in iter {
            map.insert(dimension, value);
        }
        map
    }
}

impl<T: Serialize> Serialize for DimensionMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (dimension, value) in self.iter() {
            map.serialize_entry(dimension.name(), value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for DimensionMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Dimension, T>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}

/// Audio characteristics of one track.
///
/// Every stored value is finite and inside its dimension's declared range.
/// Absent dimensions stay absent; callers that need one get
/// [`InvalidFeatureVector`] with [`FeatureIssue::Missing`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct FeatureVector {
    values: DimensionMap<f64>,
}

impl FeatureVector {
    /// Builds a vector from typed pairs, validating each value.
    ///
    /// # Errors
    /// Returns [`InvalidFeatureVector`] for the first invalid value.
    pub fn new<I>(values: I) -> Result<Self, InvalidFeatureVector>
    where
        I: IntoIterator<Item = (Dimension, f64)>,
    {
        let mut map = DimensionMap::new();
        for (dimension, value) in values {
            map.insert(dimension, dimension.validate(value)?);
        }
        Ok(Self { values: map })
    }

    /// Builds a vector from loosely named pairs, rejecting unknown names.
    ///
    /// # Errors
    /// Returns [`InvalidFeatureVector`] for unknown names or invalid values.
    pub fn from_named<I, K>(values: I) -> Result<Self, InvalidFeatureVector>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let typed = values
            .into_iter()
            .map(|(name, value)| name.as_ref().parse::<Dimension>().map(|d| (d, value)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(typed)
    }

    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.values.value(dimension)
    }

    /// # Errors
    /// Returns [`InvalidFeatureVector`] when the dimension is absent.
    pub fn require(&self, dimension: Dimension) -> Result<f64, InvalidFeatureVector> {
        self.get(dimension)
            .ok_or_else(|| InvalidFeatureVector::missing(dimension))
    }

    /// Verifies that every listed dimension is present.
    ///
    /// # Errors
    /// Returns the first missing dimension in schema order.
    pub fn ensure_complete<I>(&self, required: I) -> Result<(), InvalidFeatureVector>
    where
        I: IntoIterator<Item = Dimension>,
    {
        let mut required: Vec<Dimension> = required.into_iter().collect();
        required.sort_unstable();
        required
            .into_iter()
            .try_for_each(|dimension| self.require(dimension).map(|_| ()))
    }

    #[must_use]
    pub fn contains(&self, dimension: Dimension) -> bool {
        self.values.contains(dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        self.values.iter().map(|(dimension, value)| (dimension, *value))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.values.dimensions()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TryFrom<BTreeMap<String, f64>> for FeatureVector {
    type Error = InvalidFeatureVector;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::from_named(raw)
    }
}

impl From<FeatureVector> for BTreeMap<String, f64> {
    fn from(vector: FeatureVector) -> Self {
        vector
            .iter()
            .map(|(dimension, value)| (dimension.name().to_string(), value))
            .collect()
    }
}
