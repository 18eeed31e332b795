//! Suggestion ranking: scores a track against every profile, assigns
//! confidence tiers, builds rationale and orders the result deterministically.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TriageError;
use crate::features::{Dimension, FeatureVector};
use crate::profile::PlaylistProfile;
use crate::scoring::{self, DimensionScore, ScoreOutcome, ScoringParams, Weights};
use crate::tags::{self, Tag};

const INSUFFICIENT_DATA_REASON: &str = "playlist has no profiled tracks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::None => "none",
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ConfidenceTier::None),
            "low" => Ok(ConfidenceTier::Low),
            "medium" => Ok(ConfidenceTier::Medium),
            "high" => Ok(ConfidenceTier::High),
            other => Err(format!("unknown confidence tier: {other}")),
        }
    }
}

/// Boundaries for the membership and margin components of a confidence tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub medium_members: usize,
    pub high_members: usize,
    pub clear_margin: f64,
    pub near_tie_margin: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            medium_members: 5,
            high_members: 20,
            clear_margin: 0.15,
            near_tie_margin: 0.05,
        }
    }
}

impl TierThresholds {
    /// # Errors
    /// Returns [`TriageError::InvalidOptions`] for inverted or non-finite bounds.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.medium_members == 0 || self.high_members < self.medium_members {
            return Err(TriageError::InvalidOptions(format!(
                "member thresholds must satisfy 0 < medium ({}) <= high ({})",
                self.medium_members, self.high_members
            )));
        }
        if !self.clear_margin.is_finite()
            || !self.near_tie_margin.is_finite()
            || self.near_tie_margin < 0.0
            || self.clear_margin < -self.near_tie_margin
        {
            return Err(TriageError::InvalidOptions(format!(
                "margin thresholds are inconsistent: clear {} near-tie {}",
                self.clear_margin, self.near_tie_margin
            )));
        }
        Ok(())
    }

    fn membership_tier(&self, member_count: usize) -> ConfidenceTier {
        if member_count == 0 {
            ConfidenceTier::None
        } else if member_count < self.medium_members {
            ConfidenceTier::Low
        } else if member_count < self.high_members {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::High
        }
    }

    fn margin_tier(&self, margin: f64) -> ConfidenceTier {
        if margin >= self.clear_margin {
            ConfidenceTier::High
        } else if margin >= -self.near_tie_margin {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    /// `None` keeps every suggestion that passes the filters.
    pub top_n: Option<usize>,
    pub min_score: f64,
    pub min_confidence_tier: ConfidenceTier,
    /// Dimensions listed in each rationale.
    pub rationale_depth: usize,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            top_n: None,
            min_score: 0.0,
            min_confidence_tier: ConfidenceTier::None,
            rationale_depth: 3,
        }
    }
}

impl RankOptions {
    /// # Errors
    /// Returns [`TriageError::InvalidOptions`] for `top_n == Some(0)` or a
    /// `min_score` outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.top_n == Some(0) {
            return Err(TriageError::InvalidOptions(
                "top_n must be at least 1 when set".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(TriageError::InvalidOptions(format!(
                "min_score must be within [0, 1], got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// One line of explanation attached to a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RationaleEntry {
    Dimension {
        dimension: Dimension,
        track_value: f64,
        centroid: f64,
        deviation: f64,
        z_score: f64,
        similarity: f64,
        contribution: f64,
    },
    InsufficientData {
        reason: String,
    },
}

impl From<&DimensionScore> for RationaleEntry {
    fn from(entry: &DimensionScore) -> Self {
        RationaleEntry::Dimension {
            dimension: entry.dimension,
            track_value: entry.track_value,
            centroid: entry.centroid,
            deviation: entry.deviation,
            z_score: entry.z_score,
            similarity: entry.similarity,
            contribution: entry.contribution,
        }
    }
}

impl fmt::Display for RationaleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RationaleEntry::Dimension {
                dimension,
                track_value,
                centroid,
                deviation,
                ..
            } => write!(f, "{dimension} {track_value:.2} vs {centroid:.2} ({deviation:+.2})"),
            RationaleEntry::InsufficientData { reason } => write!(f, "insufficient data: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub playlist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_name: Option<String>,
    pub score: f64,
    pub member_count: usize,
    pub confidence: ConfidenceTier,
    pub rationale: Vec<RationaleEntry>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Suggestion {
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.member_count > 0
    }

    /// Score on a 0-100 scale.
    #[must_use]
    pub fn match_percent(&self) -> u8 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (self.score.clamp(0.0, 1.0) * 100.0).round() as u8;
        percent
    }

    /// One-line explanation, e.g. `87% match: energy 0.80 vs 0.82 (-0.02)`.
    #[must_use]
    pub fn summary(&self) -> String {
        if !self.is_trained() {
            return format!("insufficient data: {INSUFFICIENT_DATA_REASON}");
        }
        let details = self
            .rationale
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if details.is_empty() {
            format!("{}% match", self.match_percent())
        } else {
            format!("{}% match: {details}", self.match_percent())
        }
    }
}

/// Everything the ranker needs besides the track and the profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub weights: Weights,
    pub scoring: ScoringParams,
    pub thresholds: TierThresholds,
    pub options: RankOptions,
}

impl RankerConfig {
    /// # Errors
    /// Returns the first invalid component.
    pub fn validate(&self) -> Result<(), TriageError> {
        self.weights.validate()?;
        self.scoring.validate()?;
        self.thresholds.validate()?;
        self.options.validate()
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionRanker {
    config: RankerConfig,
}

impl SuggestionRanker {
    /// # Errors
    /// Returns an error when `config` fails validation.
    pub fn new(config: RankerConfig) -> Result<Self, TriageError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Ranks with the configured options.
    ///
    /// # Errors
    /// See [`SuggestionRanker::rank_with`].
    pub fn rank<P>(&self, track: &FeatureVector, profiles: &[P]) -> Result<Vec<Suggestion>, TriageError>
    where
        P: Borrow<PlaylistProfile> + Sync,
    {
        self.rank_with(track, profiles, &self.config.options)
    }

    /// Ranks with per-call options in place of the configured ones.
    ///
    /// # Errors
    /// - [`TriageError::InvalidOptions`] for invalid `options`.
    /// - [`TriageError::InvalidFeatureVector`] when the track lacks a weighted
    ///   dimension, even if `profiles` is empty.
    /// - The first scoring error in `profiles` order.
    pub fn rank_with<P>(
        &self,
        track: &FeatureVector,
        profiles: &[P],
        options: &RankOptions,
    ) -> Result<Vec<Suggestion>, TriageError>
    where
        P: Borrow<PlaylistProfile> + Sync,
    {
        options.validate()?;
        track.ensure_complete(self.config.weights.required_dimensions())?;
        if profiles.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = profiles
            .par_iter()
            .map(|profile| {
                let profile: &PlaylistProfile = profile.borrow();
                let outcome = scoring::score(track, profile, &self.config.weights, &self.config.scoring)?;
                tracing::trace!(
                    playlist_id = profile.playlist_id(),
                    member_count = profile.member_count(),
                    score = outcome.score,
                    insufficient_data = outcome.insufficient_data,
                    "scored candidate playlist"
                );
                Ok::<_, TriageError>((profile, outcome))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let margins = MarginIndex::new(&outcomes);
        let mut suggestions: Vec<Suggestion> = outcomes
            .iter()
            .enumerate()
            .map(|(index, (profile, outcome))| {
                let confidence = if outcome.insufficient_data {
                    ConfidenceTier::None
                } else {
                    let margin = outcome.score - margins.best_other(index).unwrap_or(outcome.score);
                    self.config
                        .thresholds
                        .membership_tier(profile.member_count())
                        .min(self.config.thresholds.margin_tier(margin))
                };
                Suggestion {
                    playlist_id: profile.playlist_id().to_string(),
                    playlist_name: profile.name().map(str::to_string),
                    score: outcome.score,
                    member_count: profile.member_count(),
                    confidence,
                    rationale: rationale(outcome, options.rationale_depth),
                    tags: tags::describe(track, profile),
                }
            })
            .collect();

        let scored = suggestions.len();
        suggestions.retain(|s| s.score >= options.min_score && s.confidence >= options.min_confidence_tier);
        suggestions.sort_by(compare_suggestions);
        if let Some(limit) = options.top_n {
            suggestions.truncate(limit);
        }

        tracing::debug!(
            candidates = scored,
            returned = suggestions.len(),
            top_playlist = suggestions.first().map(|s| s.playlist_id.as_str()),
            top_score = suggestions.first().map(|s| s.score),
            "ranked playlist suggestions"
        );
        Ok(suggestions)
    }
}

/// Ranks with default scoring parameters and tier thresholds.
///
/// # Errors
/// See [`SuggestionRanker::rank_with`]; also fails on invalid `weights`.
pub fn rank(
    track: &FeatureVector,
    profiles: &[PlaylistProfile],
    weights: &Weights,
    options: &RankOptions,
) -> Result<Vec<Suggestion>, TriageError> {
    let ranker = SuggestionRanker::new(RankerConfig {
        weights: weights.clone(),
        options: options.clone(),
        ..RankerConfig::default()
    })?;
    ranker.rank(track, profiles)
}

/// Trained first, then score descending, member count descending, id ascending.
fn compare_suggestions(a: &Suggestion, b: &Suggestion) -> Ordering {
    b.is_trained()
        .cmp(&a.is_trained())
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| b.member_count.cmp(&a.member_count))
        .then_with(|| a.playlist_id.cmp(&b.playlist_id))
}

fn rationale(outcome: &ScoreOutcome, depth: usize) -> Vec<RationaleEntry> {
    if outcome.insufficient_data {
        return vec![RationaleEntry::InsufficientData {
            reason: INSUFFICIENT_DATA_REASON.to_string(),
        }];
    }
    // dimensions arrive in schema order; the stable sort keeps it for ties
    let mut ranked: Vec<&DimensionScore> = outcome.dimensions.iter().collect();
    ranked.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
    ranked.into_iter().take(depth).map(RationaleEntry::from).collect()
}

/// Best and runner-up trained scores, for "best among the others" lookups.
struct MarginIndex {
    best: Option<(usize, f64)>,
    runner_up: Option<f64>,
}

impl MarginIndex {
    fn new(outcomes: &[(&PlaylistProfile, ScoreOutcome)]) -> Self {
        let mut best: Option<(usize, f64)> = None;
        let mut runner_up: Option<f64> = None;
        for (index, (_, outcome)) in outcomes.iter().enumerate() {
            if outcome.insufficient_data {
                continue;
            }
            match best {
                Some((_, top)) if outcome.score <= top => {
                    runner_up = Some(runner_up.map_or(outcome.score, |r: f64| r.max(outcome.score)));
                }
                _ => {
                    runner_up = best.map(|(_, top)| top);
                    best = Some((index, outcome.score));
                }
            }
        }
        Self { best, runner_up }
    }

    fn best_other(&self, index: usize) -> Option<f64> {
        match self.best {
            Some((best_index, _)) if best_index == index => self.runner_up,
            Some((_, score)) => Some(score),
            None => None,
        }
    }
}
