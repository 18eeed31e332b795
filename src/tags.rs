//! Human-readable labels attached to each suggestion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::{Dimension, FeatureVector};
use crate::profile::PlaylistProfile;

const HIGH: f64 = 0.7;
const LOW: f64 = 0.3;
const ACOUSTIC: f64 = 0.6;
const INSTRUMENTAL: f64 = 0.5;
/// Pitch classes.
const CONSISTENT_KEY_SPREAD: f64 = 1.0;
/// BPM.
const CONSISTENT_TEMPO_SPREAD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "High Energy")]
    HighEnergy,
    #[serde(rename = "Low Energy")]
    LowEnergy,
    #[serde(rename = "Very Danceable")]
    VeryDanceable,
    #[serde(rename = "Positive Mood")]
    PositiveMood,
    #[serde(rename = "Melancholic")]
    Melancholic,
    #[serde(rename = "Acoustic")]
    Acoustic,
    #[serde(rename = "Instrumental")]
    Instrumental,
    #[serde(rename = "Consistent Key")]
    ConsistentKey,
    #[serde(rename = "Consistent Tempo")]
    ConsistentTempo,
}

impl Tag {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Tag::HighEnergy => "High Energy",
            Tag::LowEnergy => "Low Energy",
            Tag::VeryDanceable => "Very Danceable",
            Tag::PositiveMood => "Positive Mood",
            Tag::Melancholic => "Melancholic",
            Tag::Acoustic => "Acoustic",
            Tag::Instrumental => "Instrumental",
            Tag::ConsistentKey => "Consistent Key",
            Tag::ConsistentTempo => "Consistent Tempo",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tags derived from the track's own values plus the profile's consistency.
///
/// Dimensions absent from the track are skipped; untrained profiles add no
/// consistency tags.
#[must_use]
pub fn describe(track: &FeatureVector, profile: &PlaylistProfile) -> Vec<Tag> {
    let mut tags = Vec::new();
    let above = |dimension: Dimension, threshold: f64| track.get(dimension).is_some_and(|v| v > threshold);
    let below = |dimension: Dimension, threshold: f64| track.get(dimension).is_some_and(|v| v < threshold);

    if above(Dimension::Energy, HIGH) {
        tags.push(Tag::HighEnergy);
    } else if below(Dimension::Energy, LOW) {
        tags.push(Tag::LowEnergy);
    }
    if above(Dimension::Danceability, HIGH) {
        tags.push(Tag::VeryDanceable);
    }
    if above(Dimension::Valence, HIGH) {
        tags.push(Tag::PositiveMood);
    } else if below(Dimension::Valence, LOW) {
        tags.push(Tag::Melancholic);
    }
    if above(Dimension::Acousticness, ACOUSTIC) {
        tags.push(Tag::Acoustic);
    }
    if above(Dimension::Instrumentalness, INSTRUMENTAL) {
        tags.push(Tag::Instrumental);
    }

    if profile
        .spread(Dimension::Key)
        .is_some_and(|spread| spread < CONSISTENT_KEY_SPREAD)
    {
        tags.push(Tag::ConsistentKey);
    }
    if profile
        .spread(Dimension::Tempo)
        .is_some_and(|spread| spread < CONSISTENT_TEMPO_SPREAD)
    {
        tags.push(Tag::ConsistentTempo);
    }
    tags
}
