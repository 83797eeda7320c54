use super::{AudioFormat, LibraryId, Track, TrackId, TrackMetadata, TrackList};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Walks music directories and turns tagged files into library tracks.
///
/// Track ids are handed out sequentially across the whole scan, and every
/// configured directory gets its own `LibraryId` (its position in the list).
#[derive(Clone)]
pub struct MusicScanner {
    supported_extensions: Vec<String>,
}

impl MusicScanner {
    pub fn new() -> Self {
        Self {
            supported_extensions: vec![
                "mp3".to_string(),
                "flac".to_string(),
                "ogg".to_string(),
                "oga".to_string(),
                "mp4".to_string(),
                "m4a".to_string(),
                "aac".to_string(),
                "wav".to_string(),
            ],
        }
    }

    pub fn scan_directory<P: AsRef<Path>>(
        &self,
        path: P,
        library_id: LibraryId,
        next_id: &mut u64,
    ) -> Result<TrackList> {
        let mut tracks = Vec::new();

        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name().into_iter().filter_map(Result::ok) {
            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }

            // Skip hidden files (dotfiles)
            if path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with('.')) {
                continue;
            }

            // Skip empty files or files > 1GB
            if let Ok(metadata) = fs::metadata(path) {
                if metadata.len() == 0 || metadata.len() > 1_000_000_000 {
                    continue;
                }
            }

            if !self.is_supported_file(path) {
                continue;
            }

            match self.create_track_from_file(path, TrackId(*next_id), library_id) {
                Ok(track) => {
                    *next_id += 1;
                    tracks.push(track);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        debug!("Scanned {} tracks for {}", tracks.len(), library_id);
        Ok(tracks)
    }

    pub fn scan_directories(&self, paths: &[PathBuf]) -> Result<TrackList> {
        let mut all_tracks = Vec::new();
        let mut next_id = 1;

        for (index, path) in paths.iter().enumerate() {
            if path.exists() {
                let mut tracks = self.scan_directory(path, LibraryId(index as u32), &mut next_id)?;
                all_tracks.append(&mut tracks);
            } else {
                warn!("Music directory {} does not exist", path.display());
            }
        }

        info!("Library scan found {} tracks in {} directories", all_tracks.len(), paths.len());
        Ok(all_tracks)
    }

    fn is_supported_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let normalized = ext.to_ascii_lowercase();
                self.supported_extensions.contains(&normalized)
            })
            .unwrap_or(false)
    }

    fn create_track_from_file(&self, path: &Path, id: TrackId, library_id: LibraryId) -> Result<Track> {
        let metadata = fs::metadata(path)?;

        let mut track = Track::new(id, library_id, path.to_path_buf());
        track.file_size = metadata.len();

        // Tag readers are best effort; a file without tags still browses by filename
        let tags = match &track.format {
            AudioFormat::Mp3 => self.extract_id3_metadata(path).ok(),
            AudioFormat::Mp4 => self.extract_mp4_metadata(path).ok(),
            _ => None,
        };

        match tags {
            Some(tag_metadata) => track = track.with_metadata(tag_metadata),
            None => {
                track.metadata.title = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(|s| s.to_string());
            }
        }

        Ok(track)
    }

    fn extract_id3_metadata(&self, path: &Path) -> Result<TrackMetadata> {
        let tag = id3::Tag::read_from_path(path)?;
        Ok(TrackMetadata::from_id3_tag(&tag))
    }

    fn extract_mp4_metadata(&self, path: &Path) -> Result<TrackMetadata> {
        let tag = mp4ameta::Tag::read_from_path(path)?;

        Ok(TrackMetadata {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            album_artist: tag.album_artist().map(|s| s.to_string()),
            track_number: tag.track_number().map(|t| t as u32),
            disc_number: tag.disc_number().map(|d| d as u32),
            year: tag.year().and_then(|y| y.parse().ok()),
            genre: tag.genre().map(|s| s.to_string()),
            duration_ms: tag.duration().map(|d| d.as_millis() as u64),
        })
    }
}

impl Default for MusicScanner {
    fn default() -> Self {
        Self::new()
    }
}
