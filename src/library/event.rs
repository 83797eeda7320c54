use super::{LibraryId, TrackList};

/// Everything the music library tells the filter pipeline about
#[derive(Debug, Clone)]
pub enum LibraryEvent {
    TracksAdded(TrackList),
    // Same handling as TracksAdded, emitted by a finished directory scan
    TracksScanned {
        library_id: LibraryId,
        tracks: TrackList,
    },
    TracksUpdated(TrackList),
    TracksRemoved(TrackList),
    // Full reload: the payload is the complete new library contents
    TracksLoaded(TrackList),
    TracksSorted(TrackList),
    // Pass-through, only refreshes stored copies (play counts)
    TracksPlayed(TrackList),
    LibraryRemoved(LibraryId),
}

impl LibraryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LibraryEvent::TracksAdded(_) => "tracks_added",
            LibraryEvent::TracksScanned { .. } => "tracks_scanned",
            LibraryEvent::TracksUpdated(_) => "tracks_updated",
            LibraryEvent::TracksRemoved(_) => "tracks_removed",
            LibraryEvent::TracksLoaded(_) => "tracks_loaded",
            LibraryEvent::TracksSorted(_) => "tracks_sorted",
            LibraryEvent::TracksPlayed(_) => "tracks_played",
            LibraryEvent::LibraryRemoved(_) => "library_removed",
        }
    }
}
