// Music library - the canonical track list the filters browse
// The filter pipeline only ever reads from here and reacts to LibraryEvents

pub mod event;   // add/update/remove/reload notifications
#[cfg(feature = "scan")]
pub mod scanner; // builds a library from tagged files on disk
pub mod track;   // track model + tag field lookup

pub use event::LibraryEvent;
#[cfg(feature = "scan")]
pub use scanner::MusicScanner;
pub use track::{AudioFormat, LibraryId, Track, TrackId, TrackList, TrackMetadata};

use std::collections::{HashMap, HashSet};

/// Read side of the music library, as seen by the filter pipeline
pub trait MusicLibrary {
    /// Every track in library order
    fn tracks(&self) -> TrackList;

    /// Tracks for the given ids, in the order the ids were given; unknown ids are skipped
    fn tracks_for_ids(&self, ids: &[TrackId]) -> TrackList;

    fn has_tracks(&self) -> bool {
        !self.tracks().is_empty()
    }
}

/// Plain in-memory library, fed by the scanner or built by hand
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrary {
    tracks: TrackList,
}

impl InMemoryLibrary {
    pub fn new(tracks: TrackList) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Apply a library event to the stored track list.
    ///
    /// The library mutates itself first, then the same event is handed to the
    /// filter controller - so filters always see the post-change library.
    pub fn apply(&mut self, event: &LibraryEvent) {
        match event {
            LibraryEvent::TracksAdded(tracks) | LibraryEvent::TracksScanned { tracks, .. } => {
                let known: HashSet<TrackId> = self.tracks.iter().map(|t| t.id).collect();
                self.tracks
                    .extend(tracks.iter().filter(|t| !known.contains(&t.id)).cloned());
            }
            LibraryEvent::TracksUpdated(tracks) | LibraryEvent::TracksPlayed(tracks) => {
                let updated: HashMap<TrackId, &Track> = tracks.iter().map(|t| (t.id, t)).collect();
                for track in &mut self.tracks {
                    if let Some(new) = updated.get(&track.id) {
                        *track = (*new).clone();
                    }
                }
            }
            LibraryEvent::TracksRemoved(tracks) => {
                let removed: HashSet<TrackId> = tracks.iter().map(|t| t.id).collect();
                self.tracks.retain(|t| !removed.contains(&t.id));
            }
            LibraryEvent::TracksLoaded(tracks) | LibraryEvent::TracksSorted(tracks) => {
                self.tracks = tracks.clone();
            }
            LibraryEvent::LibraryRemoved(library_id) => {
                self.tracks.retain(|t| t.library_id != *library_id);
            }
        }
    }
}

impl MusicLibrary for InMemoryLibrary {
    fn tracks(&self) -> TrackList {
        self.tracks.clone()
    }

    fn tracks_for_ids(&self, ids: &[TrackId]) -> TrackList {
        let by_id: HashMap<TrackId, &Track> = self.tracks.iter().map(|t| (t.id, t)).collect();
        ids.iter()
            .filter_map(|id| by_id.get(id).map(|t| (*t).clone()))
            .collect()
    }

    fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }
}
