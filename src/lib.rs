#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod features;
pub mod observability;
pub mod profile;
pub mod ranking;
pub mod scoring;
pub mod tags;
pub mod triage;

pub use error::{InvalidFeatureVector, TriageError};
pub use features::{Dimension, FeatureVector};
pub use profile::{PlaylistProfile, ProfileBuilder, ProfileCache, build_profile};
pub use ranking::{ConfidenceTier, RankOptions, RankerConfig, Suggestion, SuggestionRanker, rank};
pub use scoring::{ScoringParams, SimilarityKernel, Weights, score};
pub use triage::{LibrarySnapshot, TriageEngine, TriageReport};
