//! Library-level triage over a caller-supplied snapshot.
//!
//! The engine never fetches anything. Callers hand over the saved tracks, the
//! playlists with their member ids, and whatever audio features they have; the
//! engine finds the tracks not yet sorted into a playlist and ranks playlists
//! for them.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::TriageConfig;
use crate::error::TriageError;
use crate::features::FeatureVector;
use crate::profile::{PlaylistProfile, ProfileBuilder, ProfileCache};
use crate::ranking::{RankOptions, Suggestion, SuggestionRanker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub track_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    #[serde(default)]
    pub saved_tracks: Vec<Track>,
    #[serde(default)]
    pub playlists: Vec<PlaylistSnapshot>,
    #[serde(default)]
    pub features: FxHashMap<String, FeatureVector>,
}

impl LibrarySnapshot {
    /// Saved tracks that belong to no playlist, in saved order.
    #[must_use]
    pub fn unassigned_tracks(&self) -> Vec<&Track> {
        let assigned: FxHashSet<&str> = self
            .playlists
            .iter()
            .flat_map(|playlist| playlist.track_ids.iter().map(String::as_str))
            .collect();
        self.saved_tracks
            .iter()
            .filter(|track| !assigned.contains(track.id.as_str()))
            .collect()
    }

    #[must_use]
    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.saved_tracks.iter().find(|track| track.id == track_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    pub track: Track,
    pub suggestions: Vec<Suggestion>,
}

pub struct TriageEngine {
    builder: ProfileBuilder,
    ranker: SuggestionRanker,
    cache: ProfileCache,
}

impl TriageEngine {
    /// # Errors
    /// Returns an error when the ranker settings or spread floor are invalid.
    pub fn new(config: &TriageConfig) -> Result<Self, TriageError> {
        Ok(Self {
            builder: ProfileBuilder::new(config.spread_floor())?,
            ranker: SuggestionRanker::new(config.ranker().clone())?,
            cache: ProfileCache::new(),
        })
    }

    #[must_use]
    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// One profile per playlist, reusing cached profiles whose membership is unchanged.
    ///
    /// Members without a feature entry are skipped, never zero-filled. Cached
    /// profiles of playlists absent from the snapshot are evicted.
    ///
    /// # Errors
    /// Returns [`TriageError::InvalidMember`] when a member's vector is incomplete.
    pub fn profiles(&self, snapshot: &LibrarySnapshot) -> Result<Vec<Arc<PlaylistProfile>>, TriageError> {
        let live: FxHashSet<&str> = snapshot
            .playlists
            .iter()
            .map(|playlist| playlist.id.as_str())
            .collect();
        let evicted = self.cache.retain(|playlist_id| live.contains(playlist_id));
        if evicted > 0 {
            tracing::debug!(evicted, "dropped cached profiles of removed playlists");
        }

        snapshot
            .playlists
            .iter()
            .map(|playlist| {
                let (member_ids, members): (Vec<&str>, Vec<FeatureVector>) = playlist
                    .track_ids
                    .iter()
                    .filter_map(|id| {
                        snapshot
                            .features
                            .get(id)
                            .map(|vector| (id.as_str(), vector.clone()))
                    })
                    .unzip();
                let skipped = playlist.track_ids.len() - members.len();
                if skipped > 0 {
                    tracing::warn!(
                        playlist_id = %playlist.id,
                        skipped,
                        profiled = members.len(),
                        "playlist members without audio features were left out of the profile"
                    );
                }
                self.cache.get_or_build(
                    &self.builder,
                    &playlist.id,
                    Some(&playlist.name),
                    &member_ids,
                    &members,
                )
            })
            .collect()
    }

    /// Ranks playlists for one saved track.
    ///
    /// # Errors
    /// - [`TriageError::UnknownTrack`] when the track is not saved.
    /// - [`TriageError::FeaturesUnavailable`] when the snapshot has no features for it.
    /// - Any profile or ranking error.
    pub fn suggest(&self, snapshot: &LibrarySnapshot, track_id: &str) -> Result<TriageReport, TriageError> {
        self.suggest_with(snapshot, track_id, self.ranker.config().options.clone())
    }

    /// As [`TriageEngine::suggest`] with per-call ranking options.
    ///
    /// # Errors
    /// See [`TriageEngine::suggest`].
    pub fn suggest_with(
        &self,
        snapshot: &LibrarySnapshot,
        track_id: &str,
        options: RankOptions,
    ) -> Result<TriageReport, TriageError> {
        let track = snapshot
            .track(track_id)
            .ok_or_else(|| TriageError::UnknownTrack(track_id.to_string()))?;
        let features = snapshot
            .features
            .get(track_id)
            .ok_or_else(|| TriageError::FeaturesUnavailable(track_id.to_string()))?;

        let profiles = self.profiles(snapshot)?;
        let suggestions = self.ranker.rank_with(features, &profiles, &options)?;
        tracing::info!(
            track_id,
            candidates = profiles.len(),
            suggestions = suggestions.len(),
            "triaged track"
        );
        Ok(TriageReport {
            track: track.clone(),
            suggestions,
        })
    }

    /// Suggestions for the first unassigned track, or `None` when every saved
    /// track already sits in a playlist.
    ///
    /// # Errors
    /// See [`TriageEngine::suggest`].
    pub fn next(&self, snapshot: &LibrarySnapshot) -> Result<Option<TriageReport>, TriageError> {
        let Some(track) = snapshot.unassigned_tracks().into_iter().next() else {
            tracing::info!("no unassigned tracks left to triage");
            return Ok(None);
        };
        self.suggest(snapshot, &track.id).map(Some)
    }
}
