use super::column::{FilterColumn, FilterColumnRegistry};
use super::error::Result;
use super::group::FilterGroup;
use super::intersect::track_intersection;
use super::node::{FilterNode, GroupId, NodeId};
use super::search::{filter_tracks, SearchExecutor, SearchOutcome, SearchResult};
use super::store::FilterStore;
use crate::config::FilterSettings;
use crate::library::{LibraryEvent, LibraryId, MusicLibrary, Track, TrackList};
use crate::selection::{ActionOptions, TrackAction, TrackSelection};
use std::collections::{HashMap, VecDeque};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Everything that can happen to the filter pipeline, funnelled through
/// [`FilterController::dispatch`] so ordering is explicit.
#[derive(Debug, Clone)]
pub enum FilterEvent {
    Library(LibraryEvent),
    SelectionChanged { node: NodeId, values: Vec<String> },
    ActiveChanged { node: NodeId, active: bool },
    SearchChanged { node: NodeId, text: String },
    FilterMoved { node: NodeId, group: Option<GroupId>, index: Option<usize> },
    FilterDeleted(NodeId),
    DoubleClicked(NodeId),
    MiddleClicked(NodeId),
    SearchFinished(SearchResult),
}

/// The cascade engine: owns every filter and keeps each group's results consistent.
///
/// All state changes happen through `&mut self` on one control thread. The only
/// work that leaves it is search evaluation, whose results come back as
/// [`SearchResult`]s and are applied by [`FilterController::apply_search_result`].
pub struct FilterController<L: MusicLibrary, S: TrackSelection> {
    library: L,
    selection: S,
    settings: FilterSettings,
    columns: FilterColumnRegistry,
    default_group: GroupId,
    store: FilterStore,
    search: SearchExecutor,
    // newest outstanding search per filter; anything else is stale
    latest_search: HashMap<NodeId, u64>,
    pending_completions: VecDeque<NodeId>,
}

impl<L: MusicLibrary, S: TrackSelection> FilterController<L, S> {
    pub fn new(library: L, selection: S, settings: FilterSettings, runtime: Handle) -> Self {
        let search = SearchExecutor::new(runtime, settings.search.mode, settings.search.timeout());
        let default_group = GroupId::new(settings.default_group.clone());

        Self {
            library,
            selection,
            columns: settings.column_registry(),
            settings,
            default_group,
            store: FilterStore::new(),
            search,
            latest_search: HashMap::new(),
            pending_completions: VecDeque::new(),
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut L {
        &mut self.library
    }

    pub fn selection(&self) -> &S {
        &self.selection
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn column_registry(&self) -> &FilterColumnRegistry {
        &self.columns
    }

    pub fn default_group(&self) -> &GroupId {
        &self.default_group
    }

    pub fn filter(&self, id: NodeId) -> Option<&FilterNode> {
        self.store.node(id)
    }

    pub fn filter_groups(&self) -> Vec<&FilterGroup> {
        self.store.groups().collect()
    }

    pub fn group_by_id(&self, id: &GroupId) -> Option<&FilterGroup> {
        self.store.group(id)
    }

    pub fn ungrouped_filters(&self) -> Vec<NodeId> {
        self.store.ungrouped()
    }

    pub fn have_ungrouped_filters(&self) -> bool {
        !self.store.ungrouped().is_empty()
    }

    pub fn filter_is_ungrouped(&self, id: NodeId) -> bool {
        self.store.is_ungrouped(id)
    }

    /// Filters of a group in cascade order
    pub fn group_filters(&self, id: &GroupId) -> Vec<&FilterNode> {
        self.store
            .members(id)
            .into_iter()
            .filter_map(|node| self.store.node(node))
            .collect()
    }

    /// Single entry point for pipeline events
    pub fn dispatch(&mut self, event: FilterEvent) {
        match event {
            FilterEvent::Library(event) => self.handle_library_event(event),
            FilterEvent::SelectionChanged { node, values } => {
                self.select(node, values);
            }
            FilterEvent::ActiveChanged { node, active } => {
                self.set_filter_active(node, active);
            }
            FilterEvent::SearchChanged { node, text } => self.search_changed(node, &text),
            FilterEvent::FilterMoved { node, group, index } => {
                self.handle_filter_updated(node, group, index);
            }
            FilterEvent::FilterDeleted(node) => {
                self.remove_filter(node);
            }
            FilterEvent::DoubleClicked(node) => self.filter_clicked(node, self.settings.double_click),
            FilterEvent::MiddleClicked(node) => self.filter_clicked(node, self.settings.middle_click),
            FilterEvent::SearchFinished(result) => {
                self.apply_search_result(result);
            }
        }
    }

    /// Add a filter for `column` at the end of the default group
    pub fn create_filter(&mut self, column: &FilterColumn) -> Result<NodeId> {
        let group = self.default_group.clone();
        self.create_filter_in(column, Some(group))
    }

    /// Add a filter for `column` at the end of `group`, or ungrouped for `None`
    pub fn create_filter_in(&mut self, column: &FilterColumn, group: Option<GroupId>) -> Result<NodeId> {
        let facet = column.compile()?;
        let node = FilterNode::new(self.store.next_node_id(), facet, self.search.mode());
        let id = self.store.add_node(node, group.clone());

        let base = match &group {
            Some(group) => self.tracks_for_group(group),
            None => self.library.tracks(),
        };
        if let Some(node) = self.store.node_mut(id) {
            node.reset(base);
        }
        self.update_filter_playlist_actions(id);

        info!("Created {} ({}) in group {:?}", id, column.name, group.as_ref().map(GroupId::as_str));
        Ok(id)
    }

    /// Remove a filter. Returns false if it isn't where it claims to be.
    pub fn remove_filter(&mut self, id: NodeId) -> bool {
        let group = self.store.node(id).and_then(|n| n.group().cloned());

        if self.store.remove_node(id).is_none() {
            debug!("{} not found, nothing to remove", id);
            return false;
        }
        self.latest_search.remove(&id);

        // The departed filter may have been narrowing the group
        if let Some(group) = group {
            self.get_filtered_tracks(&group);
        }

        info!("Removed {}", id);
        true
    }

    /// Input for the filters of a group: its combined set, or the whole library
    pub fn tracks_for_group(&self, group: &GroupId) -> TrackList {
        match self.store.group(group) {
            Some(g) if !g.filtered_tracks.is_empty() => g.filtered_tracks.clone(),
            _ => self.library.tracks(),
        }
    }

    /// Re-seed every filter of a group from scratch
    pub fn reset_group(&mut self, group: &GroupId) {
        let Some(filter_group) = self.store.group_mut(group) else {
            return;
        };
        filter_group.filtered_tracks.clear();

        let base = self.tracks_for_group(group);
        for id in self.store.members(group) {
            if let Some(node) = self.store.node_mut(id) {
                node.reset(base.clone());
            }
        }
        debug!("Reset group '{}' against {} tracks", group, base.len());
    }

    pub fn reset_all(&mut self) {
        for group in self.store.group_ids() {
            self.reset_group(&group);
        }

        let tracks = self.library.tracks();
        for id in self.store.ungrouped() {
            if let Some(node) = self.store.node_mut(id) {
                node.reset(tracks.clone());
            }
        }
    }

    /// Recompute a group's combined set from its active filters, left to right
    pub fn get_filtered_tracks(&mut self, group: &GroupId) {
        let mut combined: Option<TrackList> = None;

        for id in self.store.members(group) {
            let Some(node) = self.store.node(id) else {
                continue;
            };
            if !node.is_active() {
                continue;
            }

            combined = Some(match combined {
                None => node.filtered_tracks().clone(),
                Some(acc) => track_intersection(node.filtered_tracks(), &acc),
            });
        }

        if let Some(filter_group) = self.store.group_mut(group) {
            filter_group.filtered_tracks = combined.unwrap_or_default();
        }
    }

    fn clear_active_filters(&mut self, group: &GroupId, index: usize) {
        for id in self.store.members(group) {
            if let Some(node) = self.store.node_mut(id) {
                if node.index() > index && node.is_active() {
                    node.clear_filtered_tracks();
                }
            }
        }
    }

    /// Select facet values on a filter and cascade the change
    pub fn select(&mut self, id: NodeId, values: Vec<String>) -> bool {
        let Some(node) = self.store.node_mut(id) else {
            return false;
        };
        node.select(values);
        self.selection_changed(id);
        true
    }

    pub fn set_filter_active(&mut self, id: NodeId, active: bool) -> bool {
        let Some(node) = self.store.node_mut(id) else {
            return false;
        };
        node.set_active(active);
        self.selection_changed(id);
        true
    }

    /// Push a filter's result to the selection, then invalidate everything after it
    pub fn selection_changed(&mut self, id: NodeId) {
        let Some(node) = self.store.node(id) else {
            return;
        };
        let tracks = node.filtered_tracks().clone();
        let group = node.group().cloned();
        let reset_index = node.index();

        self.selection.change_selected_tracks(id, 0, &tracks);

        if self.settings.playlist_enabled {
            let options = ActionOptions {
                keep_active: self.settings.keep_alive,
                switch: self.settings.auto_switch,
                start_playback: false,
            };
            self.selection.execute_action(
                TrackAction::SendNewPlaylist,
                options,
                Some(&self.settings.auto_playlist),
            );
        }

        let Some(group) = group else {
            return;
        };
        if self.store.group(&group).is_none() {
            return;
        }

        self.clear_active_filters(&group, reset_index);
        self.get_filtered_tracks(&group);

        let base = self.tracks_for_group(&group);
        for member in self.store.members(&group) {
            if let Some(node) = self.store.node_mut(member) {
                if node.index() > reset_index {
                    node.reset(base.clone());
                }
            }
        }
        debug!(
            "{} selection cascaded through '{}' with {} tracks",
            id,
            group,
            base.len()
        );
    }

    /// Move a filter to `group` at `index`, or re-seed it in place.
    ///
    /// Same group and same (or unspecified) position only resets; anything else
    /// detaches, reattaches and resets both the old and the new group.
    pub fn handle_filter_updated(&mut self, id: NodeId, group: Option<GroupId>, index: Option<usize>) -> bool {
        let Some(node) = self.store.node(id) else {
            return false;
        };
        let current_index = node.index();
        let old_group = self.store.find_containing_group(id);

        if old_group.is_none() && !self.store.is_ungrouped(id) {
            return false;
        }

        let reorder = old_group.is_some() && index.map_or(false, |i| i != current_index);
        if group == old_group && !reorder {
            match &old_group {
                None => {
                    let tracks = self.library.tracks();
                    if let Some(node) = self.store.node_mut(id) {
                        node.reset(tracks);
                    }
                }
                Some(old) => self.reset_group(old),
            }
            return true;
        }

        self.store.detach(id, old_group.as_ref());
        self.store.attach(id, group.clone(), index);

        if let Some(old) = &old_group {
            if Some(old) != group.as_ref() {
                self.reset_group(old);
            }
        }
        match &group {
            Some(new) => self.reset_group(new),
            None => {
                let tracks = self.library.tracks();
                if let Some(node) = self.store.node_mut(id) {
                    node.reset(tracks);
                }
            }
        }

        info!(
            "Moved {} from {:?} to {:?}",
            id,
            old_group.as_ref().map(GroupId::as_str),
            group.as_ref().map(GroupId::as_str)
        );
        true
    }

    /// Walk one pair of filters: refetch the first, soft reset the second from it
    fn refresh_pair(&mut self, first: NodeId, second: NodeId) {
        let Some(node) = self.store.node_mut(first) else {
            return;
        };
        if !node.is_active() {
            return;
        }

        node.refetch();
        let tracks = node.filtered_tracks().clone();
        if let Some(next) = self.store.node_mut(second) {
            next.soft_reset(tracks);
        }
    }

    /// Incremental refresh after content changes, stepping through filters two at a time
    pub fn refresh_filters(&mut self, group: &GroupId) {
        let members = self.store.members(group);
        let count = members.len();

        let mut i = 0;
        while i + 1 < count {
            self.refresh_pair(members[i], members[i + 1]);
            i += 2;
        }

        if count > 1 && count % 2 == 1 {
            self.refresh_pair(members[count - 2], members[count - 1]);
        }
        debug!("Refreshed {} filters in '{}'", count, group);
    }

    fn incoming_for(&self, node: &FilterNode, tracks: &[Track], active_tracks: &[Track]) -> TrackList {
        if !node.search_filter().is_empty() {
            filter_tracks(tracks, node.search_filter(), self.search.mode())
        } else if active_tracks.is_empty() {
            tracks.to_vec()
        } else {
            track_intersection(active_tracks, tracks)
        }
    }

    /// Feed added or updated tracks down every group's cascade
    pub fn handle_tracks_added_updated(&mut self, tracks: &[Track], updated: bool) {
        if tracks.is_empty() {
            return;
        }

        for group in self.store.group_ids() {
            let members = self.store.members(&group);
            let count = members.len();
            let mut active_filter_tracks: TrackList = Vec::new();

            for id in members {
                let Some(node) = self.store.node(id) else {
                    continue;
                };
                let incoming = self.incoming_for(node, tracks, &active_filter_tracks);

                if updated {
                    if let Some(filter_group) = self.store.group_mut(&group) {
                        filter_group.expect_update(id, count);
                    }
                }

                let Some(node) = self.store.node_mut(id) else {
                    continue;
                };
                if updated {
                    node.tracks_updated(&incoming);
                    self.pending_completions.push_back(id);
                } else {
                    node.tracks_added(&incoming);
                }

                if node.is_active() {
                    active_filter_tracks = node.filtered_tracks().clone();
                }
            }
        }

        for id in self.store.ungrouped() {
            let Some(node) = self.store.node(id) else {
                continue;
            };
            let incoming = self.incoming_for(node, tracks, &[]);
            if let Some(node) = self.store.node_mut(id) {
                if updated {
                    node.tracks_updated(&incoming);
                } else {
                    node.tracks_added(&incoming);
                }
            }
        }

        if updated {
            self.process_update_completions();
        }
        self.refresh_combined_tracks();
    }

    /// Bring every group's combined set back in line with its members' matched
    /// sets after content changes. Nothing is reset.
    fn refresh_combined_tracks(&mut self) {
        for group in self.store.group_ids() {
            self.get_filtered_tracks(&group);
        }
    }

    /// Run queued per-filter completion hooks, refreshing each group once all its
    /// filters have absorbed the update
    fn process_update_completions(&mut self) {
        while let Some(id) = self.pending_completions.pop_front() {
            let Some(group) = self.store.node(id).and_then(|n| n.group().cloned()) else {
                continue;
            };

            let complete = self
                .store
                .group_mut(&group)
                .map_or(false, |g| g.complete_update(id));

            if complete {
                self.refresh_filters(&group);
            }
        }
    }

    /// Prune removed tracks from every filter without recomputing cascades
    pub fn remove_tracks(&mut self, tracks: &[Track]) {
        let ids: Vec<NodeId> = self.store.nodes().map(|n| n.id()).collect();
        for id in ids {
            if let Some(node) = self.store.node_mut(id) {
                node.tracks_removed(tracks);
            }
        }
        self.refresh_combined_tracks();
    }

    pub fn remove_library_tracks(&mut self, library_id: LibraryId) {
        let ids: Vec<NodeId> = self.store.nodes().map(|n| n.id()).collect();
        for id in ids {
            if let Some(node) = self.store.node_mut(id) {
                node.remove_library(library_id);
            }
        }
        self.refresh_combined_tracks();
    }

    fn tracks_played(&mut self, tracks: &[Track]) {
        let ids: Vec<NodeId> = self.store.nodes().map(|n| n.id()).collect();
        for id in ids {
            if let Some(node) = self.store.node_mut(id) {
                node.tracks_played(tracks);
            }
        }
        self.refresh_combined_tracks();
    }

    pub fn handle_library_event(&mut self, event: LibraryEvent) {
        debug!("Library event: {}", event.name());

        match event {
            LibraryEvent::TracksAdded(tracks) | LibraryEvent::TracksScanned { tracks, .. } => {
                self.handle_tracks_added_updated(&tracks, false)
            }
            LibraryEvent::TracksUpdated(tracks) => self.handle_tracks_added_updated(&tracks, true),
            LibraryEvent::TracksRemoved(tracks) => self.remove_tracks(&tracks),
            LibraryEvent::TracksLoaded(_) | LibraryEvent::TracksSorted(_) => self.reset_all(),
            LibraryEvent::TracksPlayed(tracks) => self.tracks_played(&tracks),
            LibraryEvent::LibraryRemoved(library_id) => self.remove_library_tracks(library_id),
        }
    }

    /// React to the search box of a filter changing
    pub fn search_changed(&mut self, id: NodeId, search: &str) {
        let Some(node) = self.store.node(id) else {
            return;
        };
        let Some(group) = node.group().cloned() else {
            return;
        };
        let Some(filter_group) = self.store.group(&group) else {
            return;
        };

        let min_length = self.settings.search.min_length;
        let previous = node.search_filter().to_string();
        let previous_len = previous.chars().count();
        let search_len = search.chars().count();

        if previous_len >= min_length && search_len < min_length {
            // Search cleared; anything still in flight is now stale
            self.latest_search.remove(&id);
            let tracks = self.library.tracks();
            if let Some(node) = self.store.node_mut(id) {
                node.set_search_filter("");
                node.reset(tracks);
            }
            debug!("{} search cleared", id);
            return;
        }

        if search_len < min_length {
            return;
        }

        // Only a strict extension of an active search can reuse the filter's own tracks
        let narrowing = previous_len >= min_length && search_len > previous_len && search.starts_with(&previous);
        let use_library = !filter_group.filtered_tracks.is_empty() || !narrowing;
        let tracks_to_filter = if use_library {
            self.library.tracks()
        } else {
            node.tracks().clone()
        };

        if let Some(node) = self.store.node_mut(id) {
            node.set_search_filter(search);
        }
        let seq = self.search.dispatch(id, search.to_string(), tracks_to_filter);
        self.latest_search.insert(id, seq);
    }

    /// Apply a finished search if it is still the newest one for its filter
    pub fn apply_search_result(&mut self, result: SearchResult) -> bool {
        if self.latest_search.get(&result.node) != Some(&result.seq) {
            debug!("Discarding stale search #{} for {}", result.seq, result.node);
            return false;
        }
        self.latest_search.remove(&result.node);

        let tracks = match result.outcome {
            SearchOutcome::Matched(tracks) => tracks,
            outcome => {
                debug!("Search '{}' for {} ended with {:?}, leaving filter as is", result.text, result.node, outcome);
                return false;
            }
        };

        let Some(node) = self.store.node_mut(result.node) else {
            return false;
        };
        debug!("Search '{}' matched {} tracks for {}", result.text, tracks.len(), result.node);
        node.reset(tracks);

        // The reset may have deactivated a filter that was narrowing its group
        if let Some(group) = node.group().cloned() {
            self.get_filtered_tracks(&group);
        }
        true
    }

    /// Apply every search that has already finished; returns how many were applied
    pub fn drain_search_results(&mut self) -> usize {
        let mut applied = 0;
        while let Some(result) = self.search.try_next() {
            if self.apply_search_result(result) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next finished search and apply it
    pub async fn next_search_result(&mut self) -> bool {
        match self.search.next().await {
            Some(result) => self.apply_search_result(result),
            None => false,
        }
    }

    pub fn has_pending_searches(&self) -> bool {
        !self.latest_search.is_empty()
    }

    pub fn handle_action(&mut self, action: TrackAction) {
        let options = ActionOptions {
            switch: self.settings.auto_switch,
            start_playback: self.settings.send_playback,
            keep_active: false,
        };
        self.selection.execute_action(action, options, None);
    }

    /// Run a click action on the clicked filter's own tracks
    pub fn filter_clicked(&mut self, id: NodeId, action: TrackAction) {
        let Some(node) = self.store.node(id) else {
            return;
        };
        let tracks = node.filtered_tracks().clone();

        self.selection.change_selected_tracks(id, 0, &tracks);
        self.handle_action(action);
    }

    fn update_filter_playlist_actions(&mut self, id: NodeId) {
        self.selection
            .change_playback_on_send(id, self.settings.send_playback);
    }

    pub fn set_send_playback(&mut self, enabled: bool) {
        self.settings.send_playback = enabled;

        for group in self.store.group_ids() {
            for id in self.store.members(&group) {
                self.update_filter_playlist_actions(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::testing::{ids, track};
    use crate::library::InMemoryLibrary;
    use crate::selection::SelectionRecorder;

    type Controller = FilterController<InMemoryLibrary, SelectionRecorder>;

    fn genre() -> FilterColumn {
        FilterColumn::new("Genre", "%<genre>%")
    }

    fn artist() -> FilterColumn {
        FilterColumn::new("Album Artist", "%<albumartist>%")
    }

    fn album() -> FilterColumn {
        FilterColumn::new("Album", "%album%")
    }

    fn library() -> InMemoryLibrary {
        InMemoryLibrary::new(vec![
            track(1, "Rock", "Bob", "Alpha"),
            track(2, "Jazz", "Amy", "Beta"),
            track(3, "Rock", "Amy", "Gamma"),
        ])
    }

    fn controller_with(library: InMemoryLibrary, settings: FilterSettings) -> Controller {
        FilterController::new(library, SelectionRecorder::new(), settings, Handle::current())
    }

    fn controller() -> Controller {
        controller_with(library(), FilterSettings::default())
    }

    fn default_group() -> GroupId {
        GroupId::from("Default")
    }

    fn member_indices(c: &Controller, group: &GroupId) -> Vec<usize> {
        c.group_filters(group).iter().map(|n| n.index()).collect()
    }

    fn matched(c: &Controller, id: NodeId) -> Vec<u64> {
        ids(c.filter(id).unwrap().filtered_tracks())
    }

    #[tokio::test]
    async fn test_genre_selection_cascades_to_artist() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();

        assert!(c.select(g, vec!["Rock".to_string()]));

        assert_eq!(matched(&c, g), vec![1, 3]);
        assert_eq!(ids(&c.group_by_id(&default_group()).unwrap().filtered_tracks), vec![1, 3]);
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![1, 3]);
        assert_eq!(matched(&c, a), vec![1, 3]);

        // The selection collaborator saw the genre result
        assert_eq!(ids(&c.selection().selection(g).unwrap().tracks), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_combined_set_is_ordered_intersection_of_active_filters() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        let al = c.create_filter(&album()).unwrap();

        c.select(g, vec!["Rock".to_string()]);
        c.select(a, vec!["Amy".to_string()]);

        let expected = track_intersection(
            c.filter(a).unwrap().filtered_tracks(),
            c.filter(g).unwrap().filtered_tracks(),
        );
        let group = c.group_by_id(&default_group()).unwrap();
        assert_eq!(ids(&group.filtered_tracks), ids(&expected));
        assert_eq!(ids(&group.filtered_tracks), vec![3]);
        assert_eq!(ids(c.filter(al).unwrap().tracks()), vec![3]);
    }

    #[tokio::test]
    async fn test_narrowing_earlier_filter_never_grows_later_ones() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();

        c.select(g, vec!["Rock".to_string(), "Jazz".to_string()]);
        let wide = c.filter(a).unwrap().filtered_tracks().len();

        c.select(g, vec!["Rock".to_string()]);
        let narrow = c.filter(a).unwrap().filtered_tracks().len();

        assert!(narrow <= wide);
        assert_eq!((wide, narrow), (3, 2));
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let mut c = controller();
        let left = GroupId::from("Left");
        let right = GroupId::from("Right");
        let lg = c.create_filter_in(&genre(), Some(left.clone())).unwrap();
        let _la = c.create_filter_in(&artist(), Some(left)).unwrap();
        let rg = c.create_filter_in(&genre(), Some(right.clone())).unwrap();
        let ra = c.create_filter_in(&artist(), Some(right)).unwrap();

        let before: Vec<Vec<u64>> = vec![matched(&c, rg), matched(&c, ra)];
        c.select(lg, vec!["Jazz".to_string()]);
        let after: Vec<Vec<u64>> = vec![matched(&c, rg), matched(&c, ra)];

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_indices_stay_dense_through_structure_changes() {
        let mut c = controller();
        let group = default_group();
        let nodes: Vec<NodeId> = (0..4).map(|_| c.create_filter(&genre()).unwrap()).collect();
        assert_eq!(member_indices(&c, &group), vec![0, 1, 2, 3]);

        assert!(c.remove_filter(nodes[1]));
        assert_eq!(member_indices(&c, &group), vec![0, 1, 2]);

        c.handle_filter_updated(nodes[3], Some(GroupId::from("Other")), None);
        assert_eq!(member_indices(&c, &group), vec![0, 1]);
        assert_eq!(member_indices(&c, &GroupId::from("Other")), vec![0]);

        // Reorder within the group
        c.handle_filter_updated(nodes[2], Some(group.clone()), Some(0));
        assert_eq!(
            c.group_filters(&group).iter().map(|n| n.id()).collect::<Vec<_>>(),
            vec![nodes[2], nodes[0]]
        );
        assert!(c.store.indices_are_dense());
    }

    #[tokio::test]
    async fn test_move_and_back_restores_membership() {
        let mut c = controller();
        let a = GroupId::from("A");
        let b = GroupId::from("B");
        let a0 = c.create_filter_in(&genre(), Some(a.clone())).unwrap();
        let a1 = c.create_filter_in(&artist(), Some(a.clone())).unwrap();
        let _b0 = c.create_filter_in(&album(), Some(b.clone())).unwrap();

        c.handle_filter_updated(a1, Some(b.clone()), Some(0));
        assert_eq!(member_indices(&c, &a), vec![0]);
        assert_eq!(member_indices(&c, &b), vec![0, 1]);
        assert_eq!(c.filter(a1).unwrap().group(), Some(&b));

        c.handle_filter_updated(a1, Some(a.clone()), Some(1));
        assert_eq!(member_indices(&c, &a), vec![0, 1]);
        assert_eq!(member_indices(&c, &b), vec![0]);
        assert_eq!(
            c.group_filters(&a).iter().map(|n| n.id()).collect::<Vec<_>>(),
            vec![a0, a1]
        );
    }

    #[tokio::test]
    async fn test_moving_last_member_drops_group() {
        let mut c = controller();
        let solo = GroupId::from("Solo");
        let id = c.create_filter_in(&genre(), Some(solo.clone())).unwrap();

        c.handle_filter_updated(id, None, None);
        assert!(c.group_by_id(&solo).is_none());
        assert!(c.filter_is_ungrouped(id));
        assert!(c.have_ungrouped_filters());
        assert_eq!(matched(&c, id), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_search_starts_from_whole_library() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        // Pretend something narrowed the filter's own tracks earlier
        c.store.node_mut(g).unwrap().reset(vec![track(2, "Jazz", "Amy", "Beta")]);

        c.search_changed(g, "ro");
        assert!(c.has_pending_searches());
        assert!(c.next_search_result().await);

        assert_eq!(matched(&c, g), vec![1, 3]);
        assert_eq!(c.filter(g).unwrap().search_filter(), "ro");
    }

    #[tokio::test]
    async fn test_shrinking_search_below_minimum_clears() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();

        c.search_changed(g, "ro");
        assert!(c.next_search_result().await);
        assert_eq!(matched(&c, g), vec![1, 3]);

        c.search_changed(g, "r");
        assert!(!c.has_pending_searches());
        assert_eq!(c.filter(g).unwrap().search_filter(), "");
        assert_eq!(matched(&c, g), vec![1, 2, 3]);

        // Still below the minimum: nothing happens
        c.search_changed(g, "j");
        assert!(!c.has_pending_searches());
        assert_eq!(matched(&c, g), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_only_newest_search_applies() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();

        c.search_changed(g, "am");
        c.search_changed(g, "amy gamma");

        let mut applied = 0;
        for _ in 0..2 {
            if c.next_search_result().await {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(matched(&c, g), vec![3]);
        assert!(!c.has_pending_searches());
    }

    #[tokio::test]
    async fn test_cleared_search_discards_in_flight_result() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();

        c.search_changed(g, "jazz");
        c.search_changed(g, "");

        assert!(!c.next_search_result().await);
        assert_eq!(matched(&c, g), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_added_tracks_pass_through_inactive_filters() {
        let mut c = controller();
        let nodes: Vec<NodeId> = vec![
            c.create_filter(&genre()).unwrap(),
            c.create_filter(&artist()).unwrap(),
            c.create_filter(&album()).unwrap(),
        ];

        let t4 = track(4, "Pop", "Cat", "Delta");
        c.library_mut().apply(&LibraryEvent::TracksAdded(vec![t4.clone()]));
        c.dispatch(FilterEvent::Library(LibraryEvent::TracksAdded(vec![t4])));

        for id in nodes {
            assert_eq!(matched(&c, id), vec![1, 2, 3, 4]);
        }
        assert_eq!(c.group_by_id(&default_group()).unwrap().update_count(), 0);
    }

    #[tokio::test]
    async fn test_added_tracks_narrowed_by_active_filter() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        c.select(g, vec!["Rock".to_string()]);

        let batch = vec![track(4, "Pop", "Cat", "Delta"), track(5, "Rock", "Dan", "Eps")];
        c.handle_tracks_added_updated(&batch, false);

        assert_eq!(matched(&c, g), vec![1, 3, 5]);
        assert_eq!(ids(&c.group_by_id(&default_group()).unwrap().filtered_tracks), vec![1, 3, 5]);
        // Artist only sees what got through the active genre filter
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_update_refreshes_group_once_all_filters_finish() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        c.select(g, vec!["Rock".to_string()]);
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![1, 3]);

        // Track 3 stops being rock
        let changed = track(3, "Jazz", "Amy", "Gamma");
        c.library_mut().apply(&LibraryEvent::TracksUpdated(vec![changed.clone()]));
        c.dispatch(FilterEvent::Library(LibraryEvent::TracksUpdated(vec![changed])));

        assert_eq!(matched(&c, g), vec![1]);
        // The pairwise refresh re-seeded the artist filter from the genre result
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![1]);
        assert_eq!(c.group_by_id(&default_group()).unwrap().update_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_filters_steps_pairwise() {
        let mut c = controller();
        let nodes: Vec<NodeId> = (0..3).map(|_| c.create_filter(&genre()).unwrap()).collect();
        for id in &nodes {
            c.store.node_mut(*id).unwrap().select(vec!["Rock".to_string()]);
        }
        c.store.node_mut(nodes[1]).unwrap().reset(vec![track(2, "Jazz", "Amy", "Beta")]);
        c.store.node_mut(nodes[1]).unwrap().set_active(true);

        c.refresh_filters(&default_group());

        // (0,1) then the odd tail (1,2)
        assert_eq!(ids(c.filter(nodes[1]).unwrap().tracks()), vec![1, 3]);
        assert_eq!(ids(c.filter(nodes[2]).unwrap().tracks()), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_removed_tracks_are_pruned_everywhere() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let loose = c.create_filter_in(&album(), None).unwrap();
        c.select(g, vec!["Rock".to_string()]);

        let gone = vec![track(1, "Rock", "Bob", "Alpha")];
        c.library_mut().apply(&LibraryEvent::TracksRemoved(gone.clone()));
        c.dispatch(FilterEvent::Library(LibraryEvent::TracksRemoved(gone)));

        assert_eq!(matched(&c, g), vec![3]);
        assert_eq!(matched(&c, loose), vec![2, 3]);
        assert_eq!(ids(&c.group_by_id(&default_group()).unwrap().filtered_tracks), vec![3]);

        // A filter added afterwards must not see the removed track
        let al = c.create_filter(&album()).unwrap();
        assert_eq!(ids(c.filter(al).unwrap().tracks()), vec![3]);
    }

    #[tokio::test]
    async fn test_extended_search_narrows_own_tracks() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();

        c.search_changed(g, "ro");
        assert!(c.next_search_result().await);
        assert_eq!(ids(c.filter(g).unwrap().tracks()), vec![1, 3]);

        // In the library, but never delivered to the filter
        c.library_mut()
            .apply(&LibraryEvent::TracksAdded(vec![track(4, "Rock", "Cat", "Delta")]));

        c.search_changed(g, "roc");
        assert!(c.next_search_result().await);
        assert_eq!(matched(&c, g), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_search_in_narrowed_group_uses_library() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let al = c.create_filter(&album()).unwrap();
        c.select(g, vec!["Rock".to_string()]);

        c.search_changed(al, "am");
        assert!(c.next_search_result().await);
        assert_eq!(matched(&c, al), vec![2, 3]);
        assert_eq!(ids(&c.group_by_id(&default_group()).unwrap().filtered_tracks), vec![1, 3]);

        c.library_mut()
            .apply(&LibraryEvent::TracksAdded(vec![track(4, "Pop", "Amy", "Delta")]));

        // Extends the previous search, but the group is narrowed: whole library
        c.search_changed(al, "amy");
        assert!(c.next_search_result().await);
        assert_eq!(matched(&c, al), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_search_stops_pending_without_reset() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();

        c.search_changed(g, "jazz");
        let seq = c.latest_search[&g];
        let applied = c.apply_search_result(SearchResult {
            node: g,
            seq,
            text: "jazz".to_string(),
            outcome: SearchOutcome::TimedOut,
        });

        assert!(!applied);
        assert!(!c.has_pending_searches());
        assert_eq!(matched(&c, g), vec![1, 2, 3]);

        // The real completion is now stale
        assert!(!c.next_search_result().await);
    }

    #[tokio::test]
    async fn test_zero_timeout_search_never_stays_pending() {
        let mut settings = FilterSettings::default();
        settings.search.timeout_ms = 0;
        let mut c = controller_with(library(), settings);
        let g = c.create_filter(&genre()).unwrap();

        c.search_changed(g, "jazz");
        assert!(c.has_pending_searches());
        c.next_search_result().await;

        // Timed out or finished, either way nothing is left waiting
        assert!(!c.has_pending_searches());
    }

    #[tokio::test]
    async fn test_reload_resets_everything() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        c.select(g, vec!["Jazz".to_string()]);

        let reloaded = vec![track(7, "Blues", "Eve", "Omega"), track(8, "Rock", "Fay", "Psi")];
        c.library_mut().apply(&LibraryEvent::TracksLoaded(reloaded.clone()));
        c.dispatch(FilterEvent::Library(LibraryEvent::TracksLoaded(reloaded)));

        assert!(!c.filter(g).unwrap().is_active());
        assert_eq!(matched(&c, g), vec![7, 8]);
        assert_eq!(matched(&c, a), vec![7, 8]);
        assert!(c.group_by_id(&default_group()).unwrap().filtered_tracks.is_empty());
    }

    #[tokio::test]
    async fn test_library_removed_prunes_its_tracks() {
        let mut other = track(4, "Rock", "Zed", "Zeta");
        other.library_id = LibraryId(3);
        let mut lib = library();
        lib.apply(&LibraryEvent::TracksAdded(vec![other]));
        let mut c = controller_with(lib, FilterSettings::default());
        let g = c.create_filter(&genre()).unwrap();

        c.dispatch(FilterEvent::Library(LibraryEvent::LibraryRemoved(LibraryId(3))));
        assert_eq!(matched(&c, g), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_removing_only_active_filter_empties_combined_set() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        c.select(g, vec!["Rock".to_string()]);
        assert!(!c.group_by_id(&default_group()).unwrap().filtered_tracks.is_empty());

        assert!(c.remove_filter(g));
        let group = c.group_by_id(&default_group()).unwrap();
        assert!(group.filtered_tracks.is_empty());
        assert_eq!(c.filter(a).unwrap().index(), 0);

        c.reset_group(&default_group());
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_filters_are_noops() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let ghost = NodeId(999);

        assert!(!c.remove_filter(ghost));
        assert!(!c.select(ghost, vec!["Rock".to_string()]));
        assert!(!c.handle_filter_updated(ghost, None, None));
        c.search_changed(ghost, "rock");
        c.reset_group(&GroupId::from("Nope"));
        c.handle_tracks_added_updated(&[], true);

        assert!(!c.has_pending_searches());
        assert_eq!(matched(&c, g), vec![1, 2, 3]);
        assert!(c.remove_filter(g));
        assert!(!c.remove_filter(g));
        assert!(c.filter_groups().is_empty());
    }

    #[tokio::test]
    async fn test_auto_playlist_and_click_actions() {
        let settings = FilterSettings {
            playlist_enabled: true,
            keep_alive: true,
            auto_playlist: "Browse".to_string(),
            ..FilterSettings::default()
        };
        let mut c = controller_with(library(), settings);
        let g = c.create_filter(&genre()).unwrap();

        c.select(g, vec!["Jazz".to_string()]);
        c.dispatch(FilterEvent::DoubleClicked(g));
        c.dispatch(FilterEvent::MiddleClicked(g));

        let actions = c.selection().actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, TrackAction::SendNewPlaylist);
        assert_eq!(actions[0].playlist_name.as_deref(), Some("Browse"));
        assert!(actions[0].options.keep_active);
        assert_eq!(actions[0].track_count, 1);
        assert_eq!(actions[1].action, TrackAction::AddCurrentPlaylist);
    }

    #[tokio::test]
    async fn test_click_acts_on_clicked_filter() {
        let mut c = controller();
        let left = c.create_filter_in(&genre(), Some(GroupId::from("Left"))).unwrap();
        let right = c.create_filter_in(&genre(), Some(GroupId::from("Right"))).unwrap();
        c.select(left, vec!["Jazz".to_string()]);
        c.select(right, vec!["Rock".to_string()]);

        c.dispatch(FilterEvent::DoubleClicked(left));

        let actions = c.selection().actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].track_count, 1);
        assert_eq!(c.selection().active_context(), Some(left));
    }

    #[tokio::test]
    async fn test_send_playback_reaches_every_filter() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        assert!(!c.selection().selection(g).unwrap().playback_on_send);

        c.set_send_playback(true);
        assert!(c.selection().selection(g).unwrap().playback_on_send);
        assert!(c.selection().selection(a).unwrap().playback_on_send);
    }

    #[tokio::test]
    async fn test_deactivating_filter_widens_later_filters() {
        let mut c = controller();
        let g = c.create_filter(&genre()).unwrap();
        let a = c.create_filter(&artist()).unwrap();
        c.select(g, vec!["Jazz".to_string()]);
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![2]);

        c.dispatch(FilterEvent::ActiveChanged { node: g, active: false });
        assert_eq!(ids(c.filter(a).unwrap().tracks()), vec![1, 2, 3]);
    }
}
