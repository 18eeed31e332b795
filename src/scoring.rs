//! Weighted z-score similarity between a track and a playlist profile.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TriageError;
use crate::features::{Dimension, DimensionMap, FeatureVector};
use crate::profile::PlaylistProfile;

/// Default clamp on the per-dimension distance, in standard deviations.
pub const DEFAULT_MAX_PENALTY: f64 = 4.0;

/// Per-dimension importance used when combining sub-scores.
///
/// Zero-weight dimensions are neither scored nor required on the track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Weights {
    values: DimensionMap<f64>,
}

impl Default for Weights {
    fn default() -> Self {
        Self::uniform()
    }
}

impl Weights {
    /// Weight 1.0 for every dimension in the schema.
    #[must_use]
    pub fn uniform() -> Self {
        Self {
            values: Dimension::ALL.into_iter().map(|d| (d, 1.0)).collect(),
        }
    }

    /// # Errors
    /// Returns [`TriageError::InvalidWeights`] for negative or non-finite
    /// weights, or when no weight is positive.
    pub fn new<I>(weights: I) -> Result<Self, TriageError>
    where
        I: IntoIterator<Item = (Dimension, f64)>,
    {
        let mut values = DimensionMap::new();
        for (dimension, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(TriageError::InvalidWeights(format!(
                    "weight for {dimension} must be finite and non-negative, got {weight}"
                )));
            }
            values.insert(dimension, weight);
        }
        let weights = Self { values };
        weights.validate()?;
        Ok(weights)
    }

    /// Accepts loosely named dimensions, as found in config files.
    ///
    /// # Errors
    /// Returns [`TriageError::InvalidWeights`] for unknown names or invalid weights.
    pub fn from_named<I, K>(weights: I) -> Result<Self, TriageError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let typed = weights
            .into_iter()
            .map(|(name, weight)| {
                name.as_ref()
                    .parse::<Dimension>()
                    .map(|dimension| (dimension, weight))
                    .map_err(|_| {
                        TriageError::InvalidWeights(format!("unknown dimension '{}'", name.as_ref()))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(typed)
    }

    /// # Errors
    /// Returns [`TriageError::InvalidWeights`] when no weight is positive.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.values.iter().any(|(_, weight)| *weight > 0.0) {
            Ok(())
        } else {
            Err(TriageError::InvalidWeights(
                "at least one dimension needs a positive weight".into(),
            ))
        }
    }

    #[must_use]
    pub fn get(&self, dimension: Dimension) -> f64 {
        self.values.value(dimension).unwrap_or(0.0)
    }

    /// Dimensions with a positive weight, in schema order.
    pub fn required_dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.values
            .iter()
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(dimension, _)| dimension)
    }
}

impl TryFrom<BTreeMap<String, f64>> for Weights {
    type Error = TriageError;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::from_named(raw)
    }
}

impl From<Weights> for BTreeMap<String, f64> {
    fn from(weights: Weights) -> Self {
        weights
            .values
            .iter()
            .map(|(dimension, weight)| (dimension.name().to_string(), *weight))
            .collect()
    }
}

/// Maps a clamped distance (in standard deviations) to a similarity in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKernel {
    /// `exp(-d^2 / 2)`
    ///
    /// Squaring drops tiny deviations below f64 resolution: anything under
    /// about 1e-8 standard deviations scores exactly 1.0, same as a match.
    #[default]
    Gaussian,
    /// `1 / (1 + d)`
    Reciprocal,
}

impl SimilarityKernel {
    #[must_use]
    pub fn apply(self, distance: f64) -> f64 {
        match self {
            SimilarityKernel::Gaussian => (-0.5 * distance * distance).exp(),
            SimilarityKernel::Reciprocal => 1.0 / (1.0 + distance),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SimilarityKernel::Gaussian => "gaussian",
            SimilarityKernel::Reciprocal => "reciprocal",
        }
    }
}

impl fmt::Display for SimilarityKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityKernel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Ok(SimilarityKernel::Gaussian),
            "reciprocal" => Ok(SimilarityKernel::Reciprocal),
            other => Err(format!("unknown similarity kernel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub max_penalty: f64,
    pub kernel: SimilarityKernel,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            max_penalty: DEFAULT_MAX_PENALTY,
            kernel: SimilarityKernel::default(),
        }
    }
}

impl ScoringParams {
    /// # Errors
    /// Returns [`TriageError::InvalidOptions`] unless `max_penalty` is finite and positive.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.max_penalty.is_finite() && self.max_penalty > 0.0 {
            Ok(())
        } else {
            Err(TriageError::InvalidOptions(format!(
                "max_penalty must be finite and positive, got {}",
                self.max_penalty
            )))
        }
    }
}

/// How one dimension contributed to a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub track_value: f64,
    pub centroid: f64,
    pub spread: f64,
    /// `track_value - centroid`
    pub deviation: f64,
    pub z_score: f64,
    pub similarity: f64,
    pub weight: f64,
    /// Share of the overall score, `weight * similarity / total_weight`.
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: f64,
    pub dimensions: Vec<DimensionScore>,
    pub insufficient_data: bool,
}

impl ScoreOutcome {
    fn insufficient() -> Self {
        Self {
            score: 0.0,
            dimensions: Vec::new(),
            insufficient_data: true,
        }
    }
}

/// Scores `track` against `profile`.
///
/// The track is checked for every weighted dimension first, so a malformed
/// track fails even against an untrained profile.
///
/// # Errors
/// - [`TriageError::InvalidWeights`] when no weight is positive.
/// - [`TriageError::InvalidFeatureVector`] when the track lacks a weighted dimension.
/// - [`TriageError::ProfileMissingDimension`] when a trained profile lacks one.
pub fn score(
    track: &FeatureVector,
    profile: &PlaylistProfile,
    weights: &Weights,
    params: &ScoringParams,
) -> Result<ScoreOutcome, TriageError> {
    weights.validate()?;
    params.validate()?;
    track.ensure_complete(weights.required_dimensions())?;

    let Some(stats) = profile.stats() else {
        return Ok(ScoreOutcome::insufficient());
    };

    let total_weight: f64 = weights.required_dimensions().map(|d| weights.get(d)).sum();
    let mut dimensions = Vec::new();
    for dimension in weights.required_dimensions() {
        let missing = || TriageError::ProfileMissingDimension {
            playlist_id: profile.playlist_id().to_string(),
            dimension,
        };
        let centroid = stats.centroid.value(dimension).ok_or_else(missing)?;
        let spread = stats.spread.value(dimension).ok_or_else(missing)?;
        let track_value = track.require(dimension)?;
        let weight = weights.get(dimension);

        let deviation = track_value - centroid;
        let z_score = deviation / spread;
        let similarity = params.kernel.apply(z_score.abs().min(params.max_penalty));
        dimensions.push(DimensionScore {
            dimension,
            track_value,
            centroid,
            spread,
            deviation,
            z_score,
            similarity,
            weight,
            contribution: weight * similarity / total_weight,
        });
    }

    let score = dimensions
        .iter()
        .map(|entry| entry.contribution)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    Ok(ScoreOutcome {
        score,
        dimensions,
        insufficient_data: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vector(values: &[(Dimension, f64)]) -> FeatureVector {
        FeatureVector::new(values.iter().copied()).expect("valid vector")
    }

    fn profile(id: &str, centroid: &[(Dimension, f64)], spread: f64) -> PlaylistProfile {
        let centroid_map: DimensionMap<f64> = centroid.iter().copied().collect();
        let spread_map: DimensionMap<f64> = centroid.iter().map(|(d, _)| (*d, spread)).collect();
        PlaylistProfile::trained(id, 10, centroid_map, spread_map).expect("valid profile")
    }

    fn energy_only() -> Weights {
        Weights::new([(Dimension::Energy, 1.0)]).expect("valid weights")
    }

    #[test]
    fn identical_track_scores_one() {
        let track = vector(&[(Dimension::Energy, 0.5), (Dimension::Valence, 0.4)]);
        let target = profile("p", &[(Dimension::Energy, 0.5), (Dimension::Valence, 0.4)], 0.1);
        let weights = Weights::new([(Dimension::Energy, 1.0), (Dimension::Valence, 2.0)])
            .expect("valid weights");
        let outcome = score(&track, &target, &weights, &ScoringParams::default()).expect("scores");
        assert!((outcome.score - 1.0).abs() < 1e-12);
        assert!(!outcome.insufficient_data);
        assert_eq!(outcome.dimensions.len(), 2);
    }

    #[rstest]
    #[case(SimilarityKernel::Gaussian, 0.0, 1.0)]
    #[case(SimilarityKernel::Gaussian, 2.0, (-2.0_f64).exp())]
    #[case(SimilarityKernel::Reciprocal, 0.0, 1.0)]
    #[case(SimilarityKernel::Reciprocal, 3.0, 0.25)]
    fn kernels_map_distance_to_similarity(
        #[case] kernel: SimilarityKernel,
        #[case] distance: f64,
        #[case] expected: f64,
    ) {
        assert!((kernel.apply(distance) - expected).abs() < 1e-12);
    }

    #[test]
    fn distance_is_clamped_at_max_penalty() {
        let target = profile("p", &[(Dimension::Energy, 0.0)], 0.01);
        let params = ScoringParams {
            max_penalty: 2.0,
            kernel: SimilarityKernel::Reciprocal,
        };
        let far = score(&vector(&[(Dimension::Energy, 1.0)]), &target, &energy_only(), &params)
            .expect("scores");
        let nearer = score(&vector(&[(Dimension::Energy, 0.5)]), &target, &energy_only(), &params)
            .expect("scores");
        assert!((far.score - 1.0 / 3.0).abs() < 1e-12);
        assert!((far.score - nearer.score).abs() < 1e-12);
        assert!((far.dimensions[0].z_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn untrained_profile_is_insufficient_data() {
        let track = vector(&[(Dimension::Energy, 0.5)]);
        let outcome = score(
            &track,
            &PlaylistProfile::untrained("empty"),
            &energy_only(),
            &ScoringParams::default(),
        )
        .expect("scores");
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.insufficient_data);
        assert!(outcome.dimensions.is_empty());
    }

    #[test]
    fn missing_track_dimension_fails_even_when_untrained() {
        let track = vector(&[(Dimension::Valence, 0.5)]);
        let error = score(
            &track,
            &PlaylistProfile::untrained("empty"),
            &energy_only(),
            &ScoringParams::default(),
        )
        .unwrap_err();
        assert!(matches!(error, TriageError::InvalidFeatureVector(ref e) if e.is_missing()));
    }

    #[test]
    fn zero_weight_dimension_is_not_required() {
        let track = vector(&[(Dimension::Energy, 0.5)]);
        let weights = Weights::new([(Dimension::Energy, 1.0), (Dimension::Tempo, 0.0)])
            .expect("valid weights");
        let target = profile("p", &[(Dimension::Energy, 0.5)], 0.1);
        assert!(score(&track, &target, &weights, &ScoringParams::default()).is_ok());
    }

    #[test]
    fn profile_missing_weighted_dimension_fails() {
        let track = vector(&[(Dimension::Energy, 0.5), (Dimension::Tempo, 120.0)]);
        let weights = Weights::new([(Dimension::Energy, 1.0), (Dimension::Tempo, 1.0)])
            .expect("valid weights");
        let target = profile("p", &[(Dimension::Energy, 0.5)], 0.1);
        let error = score(&track, &target, &weights, &ScoringParams::default()).unwrap_err();
        assert_eq!(
            error,
            TriageError::ProfileMissingDimension {
                playlist_id: "p".into(),
                dimension: Dimension::Tempo,
            }
        );
    }

    #[test]
    fn contributions_sum_to_score() {
        let track = vector(&[(Dimension::Energy, 0.6), (Dimension::Valence, 0.2)]);
        let target = profile("p", &[(Dimension::Energy, 0.5), (Dimension::Valence, 0.4)], 0.1);
        let weights = Weights::new([(Dimension::Energy, 3.0), (Dimension::Valence, 1.0)])
            .expect("valid weights");
        let outcome = score(&track, &target, &weights, &ScoringParams::default()).expect("scores");
        let sum: f64 = outcome.dimensions.iter().map(|d| d.contribution).sum();
        assert!((sum - outcome.score).abs() < 1e-12);
        assert!((outcome.dimensions[1].deviation + 0.2).abs() < 1e-12);
    }

    #[rstest]
    #[case(vec![(Dimension::Energy, -1.0)])]
    #[case(vec![(Dimension::Energy, f64::INFINITY)])]
    #[case(vec![(Dimension::Energy, 0.0)])]
    #[case(vec![])]
    fn rejects_invalid_weights(#[case] raw: Vec<(Dimension, f64)>) {
        assert!(matches!(Weights::new(raw), Err(TriageError::InvalidWeights(_))));
    }

    #[test]
    fn named_weights_reject_unknown_dimension() {
        let error = Weights::from_named([("mood", 1.0)]).unwrap_err();
        assert!(error.to_string().contains("mood"));
    }

    #[test]
    fn uniform_weights_cover_every_dimension() {
        let weights = Weights::default();
        assert_eq!(weights.required_dimensions().count(), Dimension::ALL.len());
        assert!(Dimension::ALL.into_iter().all(|dimension| (weights.get(dimension) - 1.0).abs() < 1e-12));
    }

    #[rstest]
    #[case(1e-9, true)]
    #[case(1e-6, false)]
    #[case(0.5, false)]
    fn gaussian_resolution_near_zero(#[case] distance: f64, #[case] rounds_to_one: bool) {
        let similarity = SimilarityKernel::Gaussian.apply(distance);
        assert_eq!(similarity == 1.0, rounds_to_one, "similarity {similarity}");
        assert!(similarity <= SimilarityKernel::Gaussian.apply(0.0));
    }

    #[test]
    fn kernel_parses_case_insensitively() {
        assert_eq!("Gaussian".parse::<SimilarityKernel>(), Ok(SimilarityKernel::Gaussian));
        assert_eq!(" reciprocal ".parse::<SimilarityKernel>(), Ok(SimilarityKernel::Reciprocal));
        assert!("cosine".parse::<SimilarityKernel>().is_err());
    }
}
