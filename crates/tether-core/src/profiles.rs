use std::collections::HashMap;
use std::sync::Arc;

use tether_db::Database;
use tether_types::models::Profile;

/// Batch profile resolution. Services only ever ask "who are these ids";
/// where profiles live and how avatars are addressed is up to the
/// implementation.
pub trait ProfileLookup: Send + Sync {
    /// Unknown ids are omitted from the result.
    fn get_by_ids(&self, ids: &[i64]) -> anyhow::Result<Vec<Profile>>;
}

impl ProfileLookup for Database {
    fn get_by_ids(&self, ids: &[i64]) -> anyhow::Result<Vec<Profile>> {
        self.get_profiles(ids)
    }
}

/// Rewrites relative avatar paths into absolute URLs under a media host.
pub struct MediaProfiles {
    inner: Arc<dyn ProfileLookup>,
    base_url: String,
}

impl MediaProfiles {
    pub fn new(inner: Arc<dyn ProfileLookup>, base_url: impl Into<String>) -> Self {
        Self {
            inner,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn avatar_url(&self, avatar: &str) -> String {
        if avatar.is_empty() || self.base_url.is_empty() || avatar.contains("://") {
            return avatar.to_string();
        }
        format!("{}/{}", self.base_url, avatar.trim_start_matches('/'))
    }
}

impl ProfileLookup for MediaProfiles {
    fn get_by_ids(&self, ids: &[i64]) -> anyhow::Result<Vec<Profile>> {
        let mut profiles = self.inner.get_by_ids(ids)?;
        for p in &mut profiles {
            p.avatar = self.avatar_url(&p.avatar);
        }
        Ok(profiles)
    }
}

/// Fetch profiles for `ids` (duplicates and non-positive ids skipped)
/// keyed by user id.
pub fn profile_map(lookup: &dyn ProfileLookup, ids: &[i64]) -> anyhow::Result<HashMap<i64, Profile>> {
    let mut wanted: Vec<i64> = ids.iter().copied().filter(|id| *id > 0).collect();
    wanted.sort_unstable();
    wanted.dedup();

    Ok(lookup
        .get_by_ids(&wanted)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect())
}
