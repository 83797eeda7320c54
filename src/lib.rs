// Panfilter Library - cascading facet filters over a music library
// Library, filters and selection are separate so the pipeline can be driven headless

pub mod config;    // settings and filter columns
pub mod filters;   // the filter pipeline itself
pub mod library;   // tracks, library events, scanning
pub mod selection; // where filter results end up

// Export the stuff callers actually use
pub use config::{Config, FilterSettings};
pub use filters::{FilterColumn, FilterController, FilterEvent, GroupId, NodeId};
pub use library::{InMemoryLibrary, LibraryEvent, MusicLibrary, Track, TrackMetadata};
pub use selection::{SelectionRecorder, TrackAction, TrackSelection};
