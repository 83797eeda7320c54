// Panfilter - browse a music library through cascading tag filters
// Scans the configured directories, builds one filter per column, applies
// selections and searches from the command line and prints what's left

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use panfilter::{
    config::Config,
    filters::{FacetRow, FilterController, FilterEvent, NodeId},
    library::{InMemoryLibrary, LibraryEvent, LibraryId, MusicLibrary, TrackList},
    selection::SelectionRecorder,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "panfilter")]
#[command(about = "Browse a music library through cascading tag filters")]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Music directory to scan (repeatable, overrides config)
    #[arg(long = "dir")]
    dirs: Vec<PathBuf>,

    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the configured filter columns
    Columns,
    /// Filter the library and print every facet plus the resulting tracks
    Browse {
        /// Select a value on a filter, as FILTER=VALUE (repeat to select several values)
        #[arg(long = "select", value_parser = parse_assignment)]
        selections: Vec<(String, String)>,

        /// Search within a filter, as FILTER=TEXT
        #[arg(long = "search", value_parser = parse_assignment)]
        searches: Vec<(String, String)>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// FILTER is a column name (case-insensitive) or its position in the group
fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FILTER=VALUE, got '{}'", s))?;

    if key.trim().is_empty() {
        return Err(format!("missing filter name in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_logging(log_dir: &Path, dev: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(log_dir, "panfilter.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Base filter: info level for general logs, debug for panfilter
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,panfilter=debug"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // Dev mode mirrors everything to stderr
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr).with_target(true));

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}

#[cfg(feature = "scan")]
async fn scan_library(dirs: Vec<PathBuf>) -> Result<TrackList> {
    use panfilter::library::MusicScanner;

    // Walking the disk is blocking work
    tokio::task::spawn_blocking(move || MusicScanner::new().scan_directories(&dirs)).await?
}

#[cfg(not(feature = "scan"))]
async fn scan_library(dirs: Vec<PathBuf>) -> Result<TrackList> {
    warn!("Built without the scan feature, ignoring {} directories", dirs.len());
    Ok(Vec::new())
}

type Controller = FilterController<InMemoryLibrary, SelectionRecorder>;

fn resolve_filter(controller: &Controller, nodes: &[NodeId], key: &str) -> Result<NodeId> {
    if let Some(id) = nodes
        .iter()
        .copied()
        .find(|id| controller.filter(*id).map_or(false, |n| n.name().eq_ignore_ascii_case(key)))
    {
        return Ok(id);
    }

    key.parse::<usize>()
        .ok()
        .and_then(|index| nodes.get(index).copied())
        .ok_or_else(|| anyhow!("No filter named '{}'", key))
}

#[derive(Serialize)]
struct FilterView {
    name: String,
    summary: String,
    selected: Vec<String>,
    rows: Vec<FacetRow>,
}

#[derive(Serialize)]
struct TrackView {
    id: u64,
    artist: String,
    album: String,
    title: String,
    path: PathBuf,
}

#[derive(Serialize)]
struct BrowseView {
    filters: Vec<FilterView>,
    tracks: Vec<TrackView>,
}

fn browse_view(controller: &Controller) -> BrowseView {
    let group = controller.default_group();

    let filters = controller
        .group_filters(group)
        .into_iter()
        .map(|node| FilterView {
            name: node.name().to_string(),
            summary: node.summary_label(),
            selected: node.selected_values().to_vec(),
            rows: node.rows(),
        })
        .collect();

    // What the last filter lets through is what the user is looking at
    let tracks = controller
        .group_filters(group)
        .last()
        .map(|node| node.filtered_tracks().clone())
        .unwrap_or_else(|| controller.library().tracks());

    BrowseView {
        filters,
        tracks: tracks
            .iter()
            .map(|t| TrackView {
                id: t.id.0,
                artist: t.display_artist(),
                album: t.display_album(),
                title: t.display_title(),
                path: t.file_path.clone(),
            })
            .collect(),
    }
}

fn print_view(view: &BrowseView) {
    for filter in &view.filters {
        println!("{} - {}", filter.name, filter.summary);
        for row in &filter.rows {
            let marker = if row.selected { "*" } else { " " };
            println!("  {} {} ({})", marker, row.value, row.track_count);
        }
    }

    println!();
    println!("{} tracks", view.tracks.len());
    for track in &view.tracks {
        println!("  {} - {} - {}", track.artist, track.album, track.title);
    }
}

async fn browse(
    config: Config,
    tracks: TrackList,
    selections: Vec<(String, String)>,
    searches: Vec<(String, String)>,
    json: bool,
) -> Result<()> {
    if tracks.is_empty() {
        warn!("No tracks found in the music directories");
    }

    let mut controller = FilterController::new(
        InMemoryLibrary::default(),
        SelectionRecorder::new(),
        config.filters.clone(),
        Handle::current(),
    );

    let columns = controller.column_registry().columns().to_vec();
    let mut nodes = Vec::with_capacity(columns.len());
    for column in &columns {
        nodes.push(controller.create_filter(column)?);
    }

    // Deliver the scan the way a live library would: one batch per directory
    let mut by_library: BTreeMap<LibraryId, TrackList> = BTreeMap::new();
    for track in tracks {
        by_library.entry(track.library_id).or_default().push(track);
    }
    for (library_id, tracks) in by_library {
        let event = LibraryEvent::TracksScanned { library_id, tracks };
        controller.library_mut().apply(&event);
        controller.dispatch(FilterEvent::Library(event));
    }

    for (key, text) in searches {
        let node = resolve_filter(&controller, &nodes, &key)?;
        controller.dispatch(FilterEvent::SearchChanged { node, text });
        // Timed out searches report back too, so this always ends
        while controller.has_pending_searches() {
            if !controller.next_search_result().await {
                debug!("Search on '{}' left {} unchanged", key, node);
            }
        }
    }

    // Repeated keys accumulate into one multi-value selection, in first-seen order
    let mut grouped: Vec<(NodeId, Vec<String>)> = Vec::new();
    for (key, value) in selections {
        let node = resolve_filter(&controller, &nodes, &key)?;
        match grouped.iter_mut().find(|(id, _)| *id == node) {
            Some((_, values)) => values.push(value),
            None => grouped.push((node, vec![value])),
        }
    }
    for (node, values) in grouped {
        debug!("Selecting {:?} on {}", values, node);
        controller.dispatch(FilterEvent::SelectionChanged { node, values });
    }

    let view = browse_view(&controller);
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }

    info!("Browse finished with {} tracks", view.tracks.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config - falls back to defaults if missing
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let _guard = init_logging(&config.log_directory, args.dev)?;
    info!("Panfilter starting up");

    match args.command {
        Command::Columns => {
            for (index, column) in config.filters.columns.iter().enumerate() {
                println!("{}: {} {}", index, column.name, column.field);
            }
        }
        Command::Browse { selections, searches, json } => {
            let dirs = if args.dirs.is_empty() {
                config.music_directories.clone()
            } else {
                args.dirs
            };
            let tracks = scan_library(dirs).await?;
            browse(config, tracks, selections, searches, json).await?;
        }
    }

    Ok(())
}
