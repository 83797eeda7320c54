use super::column::Facet;
use super::search::{filter_tracks, SearchMode};
use crate::library::{LibraryId, Track, TrackId, TrackList};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Opaque filter identity, handed out by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter#{}", self.0)
    }
}

/// Name of a cascade chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of a facet list: a value and how many visible tracks carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetRow {
    pub value: String,
    pub track_count: usize,
    pub selected: bool,
}

/// A single facet filter, pure data.
///
/// `tracks` is the base set the filter was last seeded with, the visible tracks
/// are that base after the search predicate, and `filtered_tracks` is what the
/// filter contributes downstream: the visible tracks narrowed to the selected values.
#[derive(Debug, Clone)]
pub struct FilterNode {
    id: NodeId,
    facet: Facet,
    group: Option<GroupId>,
    index: usize,
    active: bool,
    search: String,
    search_mode: SearchMode,
    selected: Vec<String>,
    tracks: TrackList,
    filtered_tracks: TrackList,
}

impl FilterNode {
    pub fn new(id: NodeId, facet: Facet, search_mode: SearchMode) -> Self {
        Self {
            id,
            facet,
            group: None,
            index: 0,
            active: false,
            search: String::new(),
            search_mode,
            selected: Vec::new(),
            tracks: Vec::new(),
            filtered_tracks: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn facet(&self) -> &Facet {
        &self.facet
    }

    pub fn name(&self) -> &str {
        &self.facet.name
    }

    pub fn group(&self) -> Option<&GroupId> {
        self.group.as_ref()
    }

    pub fn set_group(&mut self, group: Option<GroupId>) {
        self.group = group;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Deactivating also drops the selection, so the filter stops narrowing anything
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active && !self.selected.is_empty() {
            self.selected.clear();
            self.recompute();
        }
    }

    pub fn search_filter(&self) -> &str {
        &self.search
    }

    pub fn set_search_filter(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn selected_values(&self) -> &[String] {
        &self.selected
    }

    /// Tracks considered: the base set from the last reset
    pub fn tracks(&self) -> &TrackList {
        &self.tracks
    }

    pub fn filtered_tracks(&self) -> &TrackList {
        &self.filtered_tracks
    }

    pub fn set_filtered_tracks(&mut self, tracks: TrackList) {
        self.filtered_tracks = tracks;
    }

    /// Drop the matched set and with it the selection
    pub fn clear_filtered_tracks(&mut self) {
        self.filtered_tracks.clear();
        self.selected.clear();
        self.active = false;
    }

    /// Base tracks that pass the search predicate
    pub fn visible_tracks(&self) -> TrackList {
        filter_tracks(&self.tracks, &self.search, self.search_mode)
    }

    /// Re-seed from `base`, forgetting selection and activation
    pub fn reset(&mut self, base: TrackList) {
        self.tracks = base;
        self.selected.clear();
        self.active = false;
        self.recompute();
    }

    /// Re-seed from `base`, keeping selected values that still exist there
    pub fn soft_reset(&mut self, base: TrackList) {
        self.tracks = base;
        self.refetch();
    }

    /// Re-apply predicate and selection to the current base
    pub fn refetch(&mut self) {
        if !self.selected.is_empty() {
            let available: HashSet<String> = self
                .visible_tracks()
                .iter()
                .flat_map(|t| self.facet.values(t))
                .collect();
            self.selected.retain(|v| available.contains(v));
            self.active = !self.selected.is_empty();
        }
        self.recompute();
    }

    /// Select facet values; an empty selection deactivates the filter
    pub fn select(&mut self, values: Vec<String>) {
        let mut unique: Vec<String> = Vec::with_capacity(values.len());
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }

        self.active = !unique.is_empty();
        self.selected = unique;
        self.recompute();
    }

    fn recompute(&mut self) {
        let visible = self.visible_tracks();
        self.filtered_tracks = if self.selected.is_empty() {
            visible
        } else {
            visible
                .into_iter()
                .filter(|t| self.facet.matches_any(t, &self.selected))
                .collect()
        };
    }

    pub fn tracks_added(&mut self, tracks: &[Track]) {
        if tracks.is_empty() {
            return;
        }

        let known: HashSet<TrackId> = self.tracks.iter().map(|t| t.id).collect();
        self.tracks
            .extend(tracks.iter().filter(|t| !known.contains(&t.id)).cloned());
        self.refetch();
    }

    /// Replace stored copies of updated tracks, taking in ones that now belong here
    pub fn tracks_updated(&mut self, tracks: &[Track]) {
        if tracks.is_empty() {
            return;
        }

        let mut incoming: HashMap<TrackId, &Track> = tracks.iter().map(|t| (t.id, t)).collect();
        for track in &mut self.tracks {
            if let Some(new) = incoming.remove(&track.id) {
                *track = new.clone();
            }
        }
        // Keep batch order for the newcomers
        self.tracks
            .extend(tracks.iter().filter(|t| incoming.contains_key(&t.id)).cloned());
        self.refetch();
    }

    /// Prune removed tracks from the base and matched sets, nothing else
    pub fn tracks_removed(&mut self, tracks: &[Track]) {
        let removed: HashSet<TrackId> = tracks.iter().map(|t| t.id).collect();
        self.tracks.retain(|t| !removed.contains(&t.id));
        self.filtered_tracks.retain(|t| !removed.contains(&t.id));
    }

    /// Refresh stored copies (play counts) without touching membership
    pub fn tracks_played(&mut self, tracks: &[Track]) {
        let played: HashMap<TrackId, &Track> = tracks.iter().map(|t| (t.id, t)).collect();
        for track in self.tracks.iter_mut().chain(self.filtered_tracks.iter_mut()) {
            if let Some(new) = played.get(&track.id) {
                *track = (*new).clone();
            }
        }
    }

    pub fn remove_library(&mut self, library_id: LibraryId) {
        self.tracks.retain(|t| t.library_id != library_id);
        let cleaned: TrackList = self
            .filtered_tracks
            .iter()
            .filter(|t| t.library_id != library_id)
            .cloned()
            .collect();
        self.set_filtered_tracks(cleaned);
    }

    /// Facet rows for the visible tracks, sorted by value, unknown last
    pub fn rows(&self) -> Vec<FacetRow> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for track in self.visible_tracks() {
            for value in self.facet.values(&track) {
                *counts.entry(value).or_default() += 1;
            }
        }

        let mut rows: Vec<FacetRow> = counts
            .into_iter()
            .map(|(value, track_count)| FacetRow {
                selected: self.selected.contains(&value),
                value,
                track_count,
            })
            .collect();
        rows.sort_by_key(|row| (row.value == super::column::UNKNOWN_VALUE, row.value.to_lowercase()));
        rows
    }

    /// Label for the summary row above the facet values
    pub fn summary_label(&self) -> String {
        let rows = self.rows().len();
        format!("All ({} {})", rows, if rows == 1 { "item" } else { "items" })
    }
}
