//! Error taxonomy for the triage engine.
//!
//! Every engine error is a local validation failure. Nothing here is retryable:
//! bad upstream data is reported back to the caller unmodified.

use std::fmt;

use thiserror::Error;

use crate::features::Dimension;

/// What was wrong with a single dimension of a feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureIssue {
    /// The dimension is required but absent.
    Missing,
    /// The name does not belong to the dimension schema.
    Unknown,
    /// NaN or infinite value.
    NotFinite(f64),
    /// Value outside the dimension's declared range.
    OutOfRange { value: f64, min: f64, max: f64 },
}

impl fmt::Display for FeatureIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureIssue::Missing => write!(f, "is missing"),
            FeatureIssue::Unknown => write!(f, "is not a known dimension"),
            FeatureIssue::NotFinite(value) => write!(f, "is not finite ({value})"),
            FeatureIssue::OutOfRange { value, min, max } => {
                write!(f, "value {value} is outside [{min}, {max}]")
            }
        }
    }
}

/// A feature vector failed validation at the boundary or during scoring.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid feature vector: dimension '{dimension}' {issue}")]
pub struct InvalidFeatureVector {
    pub dimension: String,
    pub issue: FeatureIssue,
}

impl InvalidFeatureVector {
    #[must_use]
    pub fn missing(dimension: Dimension) -> Self {
        Self {
            dimension: dimension.name().to_string(),
            issue: FeatureIssue::Missing,
        }
    }

    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            dimension: name.into(),
            issue: FeatureIssue::Unknown,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self.issue, FeatureIssue::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriageError {
    #[error(transparent)]
    InvalidFeatureVector(#[from] InvalidFeatureVector),

    #[error("playlist {playlist_id} has an invalid member: {source}")]
    InvalidMember {
        playlist_id: String,
        #[source]
        source: InvalidFeatureVector,
    },

    #[error("invalid profile for playlist {playlist_id}: {reason}")]
    InvalidProfile { playlist_id: String, reason: String },

    #[error("profile for playlist {playlist_id} has no statistics for weighted dimension '{dimension}'")]
    ProfileMissingDimension {
        playlist_id: String,
        dimension: Dimension,
    },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid ranking options: {0}")]
    InvalidOptions(String),

    #[error("track {0} is not in the saved library")]
    UnknownTrack(String),

    #[error("no audio features were supplied for track {0}")]
    FeaturesUnavailable(String),
}

impl TriageError {
    /// The feature-vector failure behind this error, if any.
    #[must_use]
    pub fn feature_error(&self) -> Option<&InvalidFeatureVector> {
        match self {
            TriageError::InvalidFeatureVector(inner) | TriageError::InvalidMember { source: inner, .. } => {
                Some(inner)
            }
            _ => None,
        }
    }
}
