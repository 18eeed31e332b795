use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use playlist_triage::{
    config::TriageConfig,
    observability,
    ranking::ConfidenceTier,
    triage::{LibrarySnapshot, TriageEngine},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Library snapshot (JSON) with saved tracks, playlists and audio features
    #[arg(long, env = "TRIAGE_LIBRARY")]
    library: PathBuf,

    /// Track to triage; defaults to the first unassigned track
    #[arg(long)]
    track: Option<String>,

    /// Maximum number of suggestions
    #[arg(long)]
    top_n: Option<usize>,

    /// Drop suggestions scoring below this value (0-1)
    #[arg(long)]
    min_score: Option<f64>,

    /// Drop suggestions below this confidence tier (none, low, medium, high)
    #[arg(long)]
    min_confidence: Option<ConfidenceTier>,
}

fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            );
        } else {
            error!(thread = thread_name, message, "panic occurred without location information");
        }
    }));

    let cli = Cli::parse();
    let config = TriageConfig::from_env().context("failed to load configuration")?;
    observability::init_tracing(&config).context("failed to initialize tracing")?;

    let mut options = config.options().clone();
    if cli.top_n.is_some() {
        options.top_n = cli.top_n;
    }
    if let Some(min_score) = cli.min_score {
        options.min_score = min_score;
    }
    if let Some(tier) = cli.min_confidence {
        options.min_confidence_tier = tier;
    }
    let config = config.with_options(options);

    let raw = fs::read_to_string(&cli.library)
        .with_context(|| format!("failed to read library snapshot at {}", cli.library.display()))?;
    let snapshot: LibrarySnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse library snapshot at {}", cli.library.display()))?;
    info!(
        saved_tracks = snapshot.saved_tracks.len(),
        playlists = snapshot.playlists.len(),
        unassigned = snapshot.unassigned_tracks().len(),
        "library snapshot loaded"
    );

    let engine = TriageEngine::new(&config).context("invalid triage configuration")?;
    let report = match cli.track.as_deref() {
        Some(track_id) => Some(
            engine
                .suggest(&snapshot, track_id)
                .with_context(|| format!("failed to triage track {track_id}"))?,
        ),
        None => engine.next(&snapshot).context("failed to triage next track")?,
    };

    match report {
        Some(report) => {
            let rendered =
                serde_json::to_string_pretty(&report).context("failed to render triage report")?;
            println!("{rendered}");
        }
        None => println!("nothing to triage: every saved track already belongs to a playlist"),
    }
    Ok(())
}
