//! Playlist profiles: per-dimension centroid and spread of a playlist's members.

use std::sync::{Arc, PoisonError, RwLock};

use ndarray::Array1;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{InvalidFeatureVector, TriageError};
use crate::features::{Dimension, DimensionMap, FeatureVector};

/// Default lower bound for a dimension's spread.
pub const DEFAULT_SPREAD_FLOOR: f64 = 0.01;

/// Centroid and spread of a trained profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub centroid: DimensionMap<f64>,
    pub spread: DimensionMap<f64>,
}

/// Statistical summary of one playlist.
///
/// `stats` is `None` exactly when `member_count` is zero, which keeps
/// "no data" distinguishable from a centroid that is genuinely zero.
/// Deserialization goes through the same checks as [`PlaylistProfile::trained`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPlaylistProfile")]
pub struct PlaylistProfile {
    playlist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    member_count: usize,
    stats: Option<ProfileStats>,
}

#[derive(Deserialize)]
struct RawPlaylistProfile {
    playlist_id: String,
    #[serde(default)]
    name: Option<String>,
    member_count: usize,
    #[serde(default)]
    stats: Option<ProfileStats>,
}

impl TryFrom<RawPlaylistProfile> for PlaylistProfile {
    type Error = TriageError;

    fn try_from(raw: RawPlaylistProfile) -> Result<Self, Self::Error> {
        let mut profile = match (raw.member_count, raw.stats) {
            (0, None) => Self::untrained(raw.playlist_id),
            (member_count, Some(stats)) => {
                Self::trained(raw.playlist_id, member_count, stats.centroid, stats.spread)?
            }
            (_, None) => {
                return Err(TriageError::InvalidProfile {
                    playlist_id: raw.playlist_id,
                    reason: "profile with members has no statistics".into(),
                });
            }
        };
        profile.name = raw.name;
        Ok(profile)
    }
}

impl PlaylistProfile {
    #[must_use]
    pub fn untrained(playlist_id: impl Into<String>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            name: None,
            member_count: 0,
            stats: None,
        }
    }

    /// Builds a trained profile from precomputed statistics.
    ///
    /// # Errors
    /// Returns [`TriageError::InvalidProfile`] when `member_count` is zero, the
    /// centroid and spread cover different dimensions, or any value is not
    /// finite (spreads must also be strictly positive).
    pub fn trained(
        playlist_id: impl Into<String>,
        member_count: usize,
        centroid: DimensionMap<f64>,
        spread: DimensionMap<f64>,
    ) -> Result<Self, TriageError> {
        let playlist_id = playlist_id.into();
        let invalid = |reason: String| TriageError::InvalidProfile {
            playlist_id: playlist_id.clone(),
            reason,
        };

        if member_count == 0 {
            return Err(invalid("a trained profile needs at least one member".into()));
        }
        if centroid.is_empty() {
            return Err(invalid("centroid has no dimensions".into()));
        }
        if !centroid.dimensions().eq(spread.dimensions()) {
            return Err(invalid("centroid and spread cover different dimensions".into()));
        }
        if let Some((dimension, _)) = centroid.iter().find(|(_, value)| !value.is_finite()) {
            return Err(invalid(format!("centroid for {dimension} is not finite")));
        }
        if let Some((dimension, _)) = spread
            .iter()
            .find(|(_, value)| !value.is_finite() || **value <= 0.0)
        {
            return Err(invalid(format!("spread for {dimension} must be finite and positive")));
        }

        Ok(Self {
            playlist_id,
            name: None,
            member_count,
            stats: Some(ProfileStats { centroid, spread }),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn playlist_id(&self) -> &str {
        &self.playlist_id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.member_count
    }

    /// Equivalent to `member_count() > 0`; every constructor keeps the two in step.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.stats.is_some()
    }

    #[must_use]
    pub fn stats(&self) -> Option<&ProfileStats> {
        self.stats.as_ref()
    }

    #[must_use]
    pub fn centroid(&self, dimension: Dimension) -> Option<f64> {
        self.stats.as_ref()?.centroid.value(dimension)
    }

    #[must_use]
    pub fn spread(&self, dimension: Dimension) -> Option<f64> {
        self.stats.as_ref()?.spread.value(dimension)
    }
}

/// Derives [`PlaylistProfile`]s from member feature vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileBuilder {
    spread_floor: f64,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self {
            spread_floor: DEFAULT_SPREAD_FLOOR,
        }
    }
}

impl ProfileBuilder {
    /// # Errors
    /// Returns [`TriageError::InvalidOptions`] unless the floor is finite and positive.
    pub fn new(spread_floor: f64) -> Result<Self, TriageError> {
        if !spread_floor.is_finite() || spread_floor <= 0.0 {
            return Err(TriageError::InvalidOptions(format!(
                "spread_floor must be finite and positive, got {spread_floor}"
            )));
        }
        Ok(Self { spread_floor })
    }

    #[must_use]
    pub fn spread_floor(&self) -> f64 {
        self.spread_floor
    }

    /// Computes mean and population standard deviation per dimension.
    ///
    /// Values are sorted before summation, so any permutation of `members`
    /// produces an identical profile.
    ///
    /// # Errors
    /// Returns [`TriageError::InvalidMember`] when a member lacks a dimension
    /// that another member carries.
    pub fn build(
        &self,
        playlist_id: impl Into<String>,
        members: &[FeatureVector],
    ) -> Result<PlaylistProfile, TriageError> {
        let playlist_id = playlist_id.into();
        if members.is_empty() {
            return Ok(PlaylistProfile::untrained(playlist_id));
        }

        let profiled: Vec<Dimension> = Dimension::ALL
            .into_iter()
            .filter(|dimension| members.iter().any(|member| member.contains(*dimension)))
            .collect();
        if let Some(dimension) = profiled
            .iter()
            .copied()
            .find(|dimension| members.iter().any(|member| !member.contains(*dimension)))
        {
            return Err(TriageError::InvalidMember {
                playlist_id,
                source: InvalidFeatureVector::missing(dimension),
            });
        }

        let mut centroid = DimensionMap::new();
        let mut spread = DimensionMap::new();
        for dimension in profiled {
            let mut column: Vec<f64> = members
                .iter()
                .filter_map(|member| member.get(dimension))
                .collect();
            column.sort_by(f64::total_cmp);
            let column = Array1::from_vec(column);
            #[allow(clippy::cast_precision_loss)]
            let mean = column.sum() / column.len() as f64;
            let deviation = column.std(0.0);
            centroid.insert(dimension, mean);
            spread.insert(dimension, deviation.max(self.spread_floor));
        }

        PlaylistProfile::trained(playlist_id, members.len(), centroid, spread)
    }
}

/// Builds a profile with the default spread floor.
///
/// # Errors
/// See [`ProfileBuilder::build`].
pub fn build_profile(
    playlist_id: impl Into<String>,
    members: &[FeatureVector],
) -> Result<PlaylistProfile, TriageError> {
    ProfileBuilder::default().build(playlist_id, members)
}

/// Order-independent hash of a playlist's member track ids.
#[must_use]
pub fn membership_fingerprint<S: AsRef<str>>(member_ids: &[S]) -> u64 {
    let mut ids: Vec<&str> = member_ids.iter().map(AsRef::as_ref).collect();
    ids.sort_unstable();
    let mut hasher = Xxh3::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(&[0]);
    }
    hasher.digest()
}

#[derive(Debug, Clone)]
struct CachedProfile {
    fingerprint: u64,
    profile: Arc<PlaylistProfile>,
}

/// Profiles keyed by playlist id, rebuilt only when membership changes.
#[derive(Debug, Default)]
pub struct ProfileCache {
    entries: RwLock<FxHashMap<String, CachedProfile>>,
}

impl ProfileCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached profile when the membership fingerprint matches,
    /// otherwise builds and stores a fresh one. A changed `name` on an
    /// unchanged membership replaces the entry with a renamed copy.
    ///
    /// # Errors
    /// Propagates [`ProfileBuilder::build`] failures; the cache is left untouched.
    pub fn get_or_build<S: AsRef<str>>(
        &self,
        builder: &ProfileBuilder,
        playlist_id: &str,
        name: Option<&str>,
        member_ids: &[S],
        members: &[FeatureVector],
    ) -> Result<Arc<PlaylistProfile>, TriageError> {
        let fingerprint = membership_fingerprint(member_ids);
        let renamed = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(playlist_id) {
                Some(cached) if cached.fingerprint == fingerprint => {
                    if cached.profile.name() == name {
                        tracing::trace!(playlist_id, "profile cache hit");
                        return Ok(Arc::clone(&cached.profile));
                    }
                    Some(PlaylistProfile::clone(&cached.profile))
                }
                _ => None,
            }
        };

        let mut profile = match renamed {
            Some(profile) => {
                tracing::debug!(playlist_id, name, "playlist renamed, profile reused");
                profile
            }
            None => {
                let profile = builder.build(playlist_id, members)?;
                tracing::debug!(
                    playlist_id,
                    member_count = profile.member_count(),
                    trained = profile.is_trained(),
                    "profile rebuilt"
                );
                profile
            }
        };
        profile.name = name.map(str::to_string);
        let profile = Arc::new(profile);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            playlist_id.to_string(),
            CachedProfile {
                fingerprint,
                profile: Arc::clone(&profile),
            },
        );
        Ok(profile)
    }

    pub fn invalidate(&self, playlist_id: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(playlist_id)
            .is_some()
    }

    /// Drops every entry whose playlist id fails `keep`, returning how many went.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|playlist_id, _| keep(playlist_id));
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
