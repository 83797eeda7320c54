use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stable identity of a track inside the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

/// Identity of the library (music directory) a track was scanned from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lib{}", self.0)
    }
}

pub type TrackList = Vec<Track>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "mp4" | "m4a" | "aac" => AudioFormat::Mp4,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub library_id: LibraryId,
    pub file_path: PathBuf,
    pub metadata: TrackMetadata,
    pub format: AudioFormat,
    pub file_size: u64,
    pub duration: Option<Duration>,
    pub play_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub duration_ms: Option<u64>,
}

impl Track {
    pub fn new(id: TrackId, library_id: LibraryId, file_path: PathBuf) -> Self {
        let format = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Unknown);

        Self {
            id,
            library_id,
            file_path,
            metadata: TrackMetadata::default(),
            format,
            file_size: 0,
            duration: None,
            play_count: 0,
        }
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        if let Some(duration_ms) = self.metadata.duration_ms {
            self.duration = Some(Duration::from_millis(duration_ms));
        }
        self
    }

    /// Resolve a tag field by its lowercase name, as used in column field expressions.
    ///
    /// Returns `None` when the field is known but empty on this track. Unknown
    /// names are rejected earlier, when the expression is parsed.
    pub fn field(&self, name: &str) -> Option<String> {
        let meta = &self.metadata;
        match name {
            "title" => Some(self.display_title()),
            "artist" => meta.artist.clone(),
            // album artist falls back to the track artist, the way tag editors show it
            "albumartist" => meta.album_artist.clone().or_else(|| meta.artist.clone()),
            "album" => meta.album.clone(),
            "genre" => meta.genre.clone(),
            "date" | "year" => meta.year.map(|y| y.to_string()),
            "track" | "tracknumber" => meta.track_number.map(|n| format!("{:02}", n)),
            "disc" | "discnumber" => meta.disc_number.map(|n| n.to_string()),
            "filename" => self
                .file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            "path" => Some(self.file_path.display().to_string()),
            "playcount" => Some(self.play_count.to_string()),
            _ => None,
        }
    }

    pub fn display_title(&self) -> String {
        self.metadata
            .title
            .clone()
            .unwrap_or_else(|| {
                self.file_path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or("Unknown")
                    .to_string()
            })
    }

    pub fn display_artist(&self) -> String {
        self.metadata
            .artist
            .clone()
            .unwrap_or_else(|| "Unknown Artist".to_string())
    }

    pub fn display_album(&self) -> String {
        self.metadata
            .album
            .clone()
            .unwrap_or_else(|| "Unknown Album".to_string())
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration.map(|d| d.as_secs())
    }
}

/// Field names accepted inside `%...%` column expressions
pub const KNOWN_FIELDS: &[&str] = &[
    "title",
    "artist",
    "albumartist",
    "album",
    "genre",
    "date",
    "year",
    "track",
    "tracknumber",
    "disc",
    "discnumber",
    "filename",
    "path",
    "playcount",
];

#[cfg(feature = "scan")]
impl TrackMetadata {
    pub fn from_id3_tag(tag: &id3::Tag) -> Self {
        use id3::TagLike;

        Self {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            album_artist: tag.album_artist().map(|s| s.to_string()),
            track_number: tag.track(),
            disc_number: tag.disc(),
            year: tag.year().map(|y| y as u32),
            genre: tag.genre().map(|s| s.to_string()),
            duration_ms: tag.duration().map(|d| d as u64),
        }
    }
}
