// Track selection - where filter results go once the user picks something
// The filter pipeline only produces into this; playlists and playback live elsewhere

use crate::filters::NodeId;
use crate::library::TrackList;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// What to do with the current selection (double/middle click, auto playlist)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackAction {
    None,
    Play,
    AddCurrentPlaylist,
    AddActivePlaylist,
    SendCurrentPlaylist,
    SendNewPlaylist,
    AddToQueue,
    SendToQueue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    pub switch: bool,
    pub start_playback: bool,
    pub keep_active: bool,
}

/// Consumer of filter selections
pub trait TrackSelection {
    fn change_selected_tracks(&mut self, context: NodeId, first_index: usize, tracks: &TrackList);
    fn change_playback_on_send(&mut self, context: NodeId, enabled: bool);
    fn execute_action(&mut self, action: TrackAction, options: ActionOptions, playlist_name: Option<&str>);
}

#[derive(Debug, Clone, Default)]
pub struct ContextSelection {
    pub first_index: usize,
    pub tracks: TrackList,
    pub playback_on_send: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedAction {
    pub action: TrackAction,
    pub options: ActionOptions,
    pub playlist_name: Option<String>,
    pub track_count: usize,
}

/// Keeps the latest selection per filter and remembers every action requested.
///
/// Good enough for the CLI, and what the controller tests assert against.
#[derive(Debug, Default)]
pub struct SelectionRecorder {
    selections: HashMap<NodeId, ContextSelection>,
    active_context: Option<NodeId>,
    actions: Vec<ExecutedAction>,
}

impl SelectionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self, context: NodeId) -> Option<&ContextSelection> {
        self.selections.get(&context)
    }

    pub fn active_context(&self) -> Option<NodeId> {
        self.active_context
    }

    /// Tracks of the filter that most recently selected something
    pub fn selected_tracks(&self) -> TrackList {
        self.active_context
            .and_then(|ctx| self.selections.get(&ctx))
            .map(|s| s.tracks.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> &[ExecutedAction] {
        &self.actions
    }
}

impl TrackSelection for SelectionRecorder {
    fn change_selected_tracks(&mut self, context: NodeId, first_index: usize, tracks: &TrackList) {
        let selection = self.selections.entry(context).or_default();
        selection.first_index = first_index;
        selection.tracks = tracks.clone();

        if !tracks.is_empty() {
            self.active_context = Some(context);
        }
    }

    fn change_playback_on_send(&mut self, context: NodeId, enabled: bool) {
        self.selections.entry(context).or_default().playback_on_send = enabled;
    }

    fn execute_action(&mut self, action: TrackAction, options: ActionOptions, playlist_name: Option<&str>) {
        if action == TrackAction::None {
            return;
        }

        let track_count = self.selected_tracks().len();
        debug!("Executing {:?} on {} selected tracks", action, track_count);
        self.actions.push(ExecutedAction {
            action,
            options,
            playlist_name: playlist_name.map(|s| s.to_string()),
            track_count,
        });
    }
}
