//! Generate a clipboard history database with synthetic entries.
//!
//! Entries go through the real store path, so dedup, timestamps and retention
//! behave exactly as they do in the app.
//!
//! Usage:
//!     cargo run --release --bin generate-history-db -- --count 500 history.sqlite

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pesto::database::Database;
use pesto::preview::encode_rgba_png;
use pesto::settings::CaptureSettings;
use pesto::{Candidate, EventBus, HistoryStore, SharedSettings};

#[derive(Parser, Debug)]
#[command(about = "Seed a Pesto history database with synthetic entries")]
struct Args {
    /// Output database path (replaced if it exists)
    output: PathBuf,

    /// Number of entries to generate
    #[arg(long, default_value_t = 200)]
    count: usize,

    /// History limit applied while seeding
    #[arg(long, default_value_t = 500)]
    max_items: usize,

    /// Fraction of entries to pin
    #[arg(long, default_value_t = 0.05)]
    pin_ratio: f64,
}

const SNIPPETS: &[&str] = &[
    "git rebase -i HEAD~3",
    "https://docs.rs/tokio/latest/tokio/",
    "SELECT id, createdAt FROM entries ORDER BY createdAt DESC LIMIT 50;",
    "Meeting moved to Thursday 3pm, same room.",
    "fn main() {\n    println!(\"hello\");\n}",
    "192.168.1.42",
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
    "kubectl get pods -n staging",
    "Café crème, s'il vous plaît",
    "#ff6b35",
];

const FILE_NAMES: &[&str] = &["report.pdf", "screenshot.png", "notes.md", "invoice.xlsx", "photo.jpg"];

fn random_candidate(rng: &mut impl Rng, index: usize) -> Result<Candidate> {
    let roll: u8 = rng.gen_range(0..100);
    let candidate = if roll < 60 {
        let snippet = SNIPPETS.choose(rng).copied().unwrap_or_default();
        Candidate::plain_text(format!("{} #{}", snippet, index))
    } else if roll < 75 {
        let snippet = SNIPPETS.choose(rng).copied().unwrap_or_default();
        let text = format!("{} ({})", snippet, index);
        let rich = format!("{{\\rtf1\\ansi {{\\b {}}}}}", text).into_bytes();
        Candidate::rich_text(text, rich)
    } else if roll < 90 {
        let count = rng.gen_range(1..=3);
        let paths = (0..count)
            .map(|i| {
                let name = FILE_NAMES.choose(rng).copied().unwrap_or("file");
                PathBuf::from(format!("/Users/demo/Documents/{}-{}-{}", index, i, name))
            })
            .collect();
        Candidate::files(paths, None)
    } else {
        let (width, height) = (rng.gen_range(8..64), rng.gen_range(8..64));
        let color = [rng.gen(), rng.gen(), rng.gen(), 255u8];
        let rgba: Vec<u8> = color.iter().copied().cycle().take((width * height * 4) as usize).collect();
        let png = encode_rgba_png(width, height, &rgba).context("encoding synthetic image")?;
        Candidate::image(png, None)
    };
    Ok(candidate)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.output.exists() {
        std::fs::remove_file(&args.output)
            .with_context(|| format!("removing {}", args.output.display()))?;
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    info!(output = %args.output.display(), count = args.count, "Generating history database");

    let db = Database::open(&args.output).context("opening database")?;
    let settings = SharedSettings::default();
    settings.set_capture(CaptureSettings {
        max_items: args.max_items,
        ..Default::default()
    })?;
    let store = HistoryStore::new(Arc::new(db), settings, EventBus::new())?;

    let mut rng = rand::thread_rng();
    let mut pinned = 0usize;
    let mut duplicates = 0usize;

    for index in 0..args.count {
        let outcome = store.insert_or_touch(random_candidate(&mut rng, index)?)?;
        if outcome.is_duplicate() {
            duplicates += 1;
        } else if rng.gen_bool(args.pin_ratio.clamp(0.0, 1.0)) {
            store.toggle_pin(outcome.id())?;
            pinned += 1;
        }
    }

    info!(
        entries = store.count()?,
        pinned,
        duplicates,
        size_bytes = store.database_size(),
        "Done"
    );
    Ok(())
}
