// Free-text search for filters
// Matching is a pure function; the executor runs it off the control thread

use super::error::{FilterError, Result};
use super::NodeId;
use crate::library::{Track, TrackList};
use fuzzy_matcher::{clangd::ClangdMatcher, FuzzyMatcher};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Every whitespace token must be a substring of some field
    #[default]
    Substring,
    /// Whole query fuzzy-matched against each field
    Fuzzy,
}

fn search_fields(track: &Track) -> Vec<String> {
    let meta = &track.metadata;
    let mut fields = vec![track.display_title()];
    fields.extend(meta.artist.iter().cloned());
    fields.extend(meta.album.iter().cloned());
    fields.extend(meta.album_artist.iter().cloned());
    fields.extend(meta.genre.iter().cloned());
    fields.extend(meta.year.map(|y| y.to_string()));
    if let Some(name) = track.file_path.file_name() {
        fields.push(name.to_string_lossy().into_owned());
    }
    fields
}

/// The search predicate: case-insensitive, tokenized substring match
pub fn matches(track: &Track, search: &str) -> bool {
    let fields: Vec<String> = search_fields(track).iter().map(|f| f.to_lowercase()).collect();

    search
        .to_lowercase()
        .split_whitespace()
        .all(|token| fields.iter().any(|field| field.contains(token)))
}

fn fuzzy_matches(matcher: &ClangdMatcher, track: &Track, search: &str) -> bool {
    // fuzzy_match takes (choice, pattern)
    search_fields(track)
        .iter()
        .any(|field| matcher.fuzzy_match(field, search.trim()).is_some())
}

/// Apply the search predicate to a track list, keeping order
pub fn filter_tracks(tracks: &[Track], search: &str, mode: SearchMode) -> TrackList {
    if search.trim().is_empty() {
        return tracks.to_vec();
    }

    match mode {
        SearchMode::Substring => tracks.iter().filter(|t| matches(t, search)).cloned().collect(),
        SearchMode::Fuzzy => {
            let matcher = ClangdMatcher::default().ignore_case();
            tracks
                .iter()
                .filter(|t| fuzzy_matches(&matcher, t, search))
                .cloned()
                .collect()
        }
    }
}

/// How a dispatched search ended
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Matched(TrackList),
    TimedOut,
    Failed,
}

/// Finished search, handed back to the controller. Failures are delivered too,
/// so the controller can stop waiting on them.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub node: NodeId,
    pub seq: u64,
    pub text: String,
    pub outcome: SearchOutcome,
}

/// Runs searches on tokio's blocking pool over owned snapshots.
///
/// Each dispatch gets a sequence number; results come back through a channel in
/// completion order, and the caller decides which ones are stale.
pub struct SearchExecutor {
    runtime: Handle,
    mode: SearchMode,
    timeout: Duration,
    next_seq: u64,
    results_tx: mpsc::UnboundedSender<SearchResult>,
    results_rx: mpsc::UnboundedReceiver<SearchResult>,
}

impl SearchExecutor {
    pub fn new(runtime: Handle, mode: SearchMode, timeout: Duration) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        Self {
            runtime,
            mode,
            timeout,
            next_seq: 0,
            results_tx,
            results_rx,
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Queue a search and return its sequence number
    pub fn dispatch(&mut self, node: NodeId, text: String, tracks: TrackList) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        let mode = self.mode;
        let timeout = self.timeout;
        let tx = self.results_tx.clone();

        debug!("Dispatching search #{} for {} over {} tracks", seq, node, tracks.len());

        self.runtime.spawn(async move {
            let task_text = text.clone();
            let task = tokio::task::spawn_blocking(move || filter_tracks(&tracks, &task_text, mode));

            let outcome = match await_search(task, timeout, &text).await {
                Ok(tracks) => SearchOutcome::Matched(tracks),
                Err(e) => {
                    warn!("Dropping search #{} for {}: {}", seq, node, e);
                    match e {
                        FilterError::SearchTimedOut { .. } => SearchOutcome::TimedOut,
                        _ => SearchOutcome::Failed,
                    }
                }
            };

            // Receiver only goes away with the controller
            let _ = tx.send(SearchResult { node, seq, text, outcome });
        });

        seq
    }

    /// Next finished search, if one is already waiting
    pub fn try_next(&mut self) -> Option<SearchResult> {
        self.results_rx.try_recv().ok()
    }

    /// Wait for the next finished search
    pub async fn next(&mut self) -> Option<SearchResult> {
        self.results_rx.recv().await
    }
}

async fn await_search(task: JoinHandle<TrackList>, timeout: Duration, text: &str) -> Result<TrackList> {
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(tracks)) => Ok(tracks),
        Ok(Err(source)) => Err(FilterError::SearchTaskFailed {
            text: text.to_string(),
            source,
        }),
        Err(_) => Err(FilterError::SearchTimedOut {
            text: text.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
