//! Blacklist resolution
//!
//! A blacklist line lists what a user must never be recommended:
//!
//! ```text
//! u1:30|a7|45
//! ```
//!
//! Bare fields are external item ids. Fields starting with the artist marker
//! (`a` by default) name an artist whose tracks come from the artist-track
//! file, `7:10|20|30`. Expansion is a single join: the artist file holds item
//! ids only, never further artist references.
//!
//! Exclusion is best effort. Ids that do not parse or are not in the catalog
//! are dropped, and a blacklist or artist line that cannot be read excludes
//! nothing rather than failing the query.

use std::collections::HashSet;

use crate::catalog::ItemCatalog;
use crate::line_store::{LineStore, LineStoreStats};

/// Default prefix marking an artist reference in a blacklist.
pub const DEFAULT_ARTIST_MARKER: char = 'a';

/// Internal indices a query must skip.
pub type ExclusionSet = HashSet<u32>;

/// Expands user blacklists into sets of internal item indices.
pub struct ExclusionResolver {
    blacklist: Option<LineStore>,
    artists: Option<LineStore>,
    artist_marker: char,
}

impl ExclusionResolver {
    /// Either store may be absent; the matching feature is then disabled.
    pub fn new(blacklist: Option<LineStore>, artists: Option<LineStore>, artist_marker: char) -> Self {
        Self {
            blacklist,
            artists,
            artist_marker,
        }
    }

    /// A resolver that never excludes anything.
    pub fn disabled() -> Self {
        Self::new(None, None, DEFAULT_ARTIST_MARKER)
    }

    pub fn has_blacklist(&self) -> bool {
        self.blacklist.is_some()
    }

    pub fn has_artists(&self) -> bool {
        self.artists.is_some()
    }

    pub fn blacklist_stats(&self) -> Option<LineStoreStats> {
        self.blacklist.as_ref().map(LineStore::stats)
    }

    pub fn artist_stats(&self) -> Option<LineStoreStats> {
        self.artists.as_ref().map(LineStore::stats)
    }

    /// Resolve `user_key`'s blacklist against `catalog`.
    pub fn resolve(&self, user_key: &str, catalog: &ItemCatalog) -> ExclusionSet {
        let mut excluded = ExclusionSet::new();
        let Some(blacklist) = &self.blacklist else {
            return excluded;
        };

        let record = match blacklist.lookup(user_key) {
            Ok(Some(record)) => record,
            Ok(None) => return excluded,
            Err(err) => {
                tracing::warn!("Blacklist record for {:?} unreadable: {}", user_key, err);
                return excluded;
            }
        };

        for field in record.fields {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            match field.strip_prefix(self.artist_marker) {
                Some(artist_id) => self.expand_artist(artist_id, catalog, &mut excluded),
                None => insert_item(field, catalog, &mut excluded),
            }
        }

        excluded
    }

    fn expand_artist(&self, artist_id: &str, catalog: &ItemCatalog, excluded: &mut ExclusionSet) {
        let Some(artists) = &self.artists else {
            tracing::debug!("Artist {:?} referenced but no artist file is loaded", artist_id);
            return;
        };

        match artists.lookup(artist_id) {
            Ok(Some(record)) => {
                for track in record.fields {
                    insert_item(track.trim(), catalog, excluded);
                }
            }
            Ok(None) => tracing::debug!("Unknown artist {:?} in blacklist", artist_id),
            Err(err) => tracing::warn!("Artist record for {:?} unreadable: {}", artist_id, err),
        }
    }
}

fn insert_item(raw: &str, catalog: &ItemCatalog, excluded: &mut ExclusionSet) {
    let Ok(external_id) = raw.parse::<i64>() else {
        tracing::debug!("Dropping unparseable exclusion id {:?}", raw);
        return;
    };
    match catalog.internal_index(external_id) {
        Some(index) => {
            excluded.insert(index);
        }
        None => tracing::debug!("Dropping exclusion for unknown item {}", external_id),
    }
}
