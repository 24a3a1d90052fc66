//! essencewatch.
//!
//! Watches a region of the game window for essence keywords and reports which
//! catalog entries the visible combination matches, and whether they're owned.

mod capture;
mod config;
mod region;
mod scanner;
mod watch;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use data::{Catalog, EssenceMatcher, MatchResult, MatchStatus, OwnershipSet};

use crate::capture::XcapSource;
use crate::config::Config;
use crate::region::CaptureRegion;
use crate::scanner::{Pipeline, ScanEvent, Scanner, SharedPipeline};

#[derive(Parser)]
#[command(
    name = "essencewatch",
    about = "Watches the screen for essence keywords and checks them against the catalog",
    version
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan continuously and print every result (default)
    Watch,
    /// Run detection and classification once on a saved screenshot
    Detect {
        /// Screenshot of the capture region
        image: PathBuf,
    },
    /// Mark catalog entries as owned
    Own {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },
    /// Replace the owned set with exactly these names
    SetOwned {
        #[arg(value_name = "NAME")]
        names: Vec<String>,
    },
    /// List owned entries
    Owned,
}

fn main() -> Result<()> {
    // Structured logging. Use `RUST_LOG=info` etc.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(|| Config::path().ok());
    let config = Config::load_or_default(config_path.as_deref());
    if let Some(path) = config_path.filter(|p| !p.exists()) {
        // Leave an editable copy of the defaults behind.
        if let Err(err) = config.save_to(&path) {
            tracing::warn!(error = %format!("{err:#}"), "failed to write default config");
        }
    }

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&config),
        Command::Detect { image } => detect(&config, &image),
        Command::Own { names } => own(&config, &names),
        Command::SetOwned { names } => {
            let mut essence = essence_matcher(&config);
            essence.replace_owned(&names)?;
            let owned = essence.owned();
            match owned.path() {
                Some(path) => println!("{} entries owned ({})", owned.len(), path.display()),
                None => println!("{} entries owned", owned.len()),
            }
            Ok(())
        }
        Command::Owned => {
            for name in OwnershipSet::load_or_empty(config.owned_path()).names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn essence_matcher(config: &Config) -> EssenceMatcher {
    EssenceMatcher::new(
        Catalog::load_or_empty(config.catalog_path()),
        OwnershipSet::load_or_empty(config.owned_path()),
        config.snap.clone(),
        config.categories.clone(),
    )
}

/// Load the template engine and warn about templates no catalog entry uses.
fn engine(config: &Config, essence: &EssenceMatcher) -> ie::Ie {
    let engine = ie::Ie::load(config.matcher.clone(), config.templates_dir());
    tracing::info!(
        templates = engine.bank().len(),
        scales = engine.config().scales.len(),
        "template bank ready"
    );
    for template in engine.bank().templates() {
        if !essence.vocabulary().contains(&template.keyword) {
            tracing::warn!(keyword = %template.keyword, "template keyword is not used by any catalog entry");
        }
    }
    engine
}

fn watch(config: &Config) -> Result<()> {
    let region_path = config.region_path();
    let essence = essence_matcher(config);
    let pipeline = Pipeline::new(Box::new(XcapSource), engine(config, &essence), essence, config.gate.clone())
        .with_region(CaptureRegion::load_or_default(&region_path))
        .with_window_title(config.game_window_title.clone())
        .with_diagnostics(config.diagnostics.clone());
    tracing::info!(region = ?pipeline.region(), "starting scanner");

    let (tx, rx) = mpsc::channel();
    let mut scanner = Scanner::new(pipeline, config.poll_interval(), tx.clone());

    let _region_watcher = scanner::follow_region(scanner.pipeline(), &region_path)
        .inspect_err(|err| tracing::warn!(error = %format!("{err:#}"), "capture region changes won't be picked up"))
        .ok();
    let _owned_watcher = scanner::follow_ownership(scanner.pipeline(), &config.owned_path(), tx.clone())
        .inspect_err(|err| tracing::warn!(error = %format!("{err:#}"), "owned set changes won't be picked up"))
        .ok();

    let shared = scanner.pipeline();
    let templates_dir = config.templates_dir();
    std::thread::Builder::new()
        .name("commands".to_string())
        .spawn(move || commands(&shared, &templates_dir, &tx))
        .context("spawn command reader")?;

    scanner.start()?;
    println!("commands: own [NAME] marks the current match (or NAME) owned, reload reloads templates");
    let frame_path = config.data_dir.join("last_frame.png");
    for event in rx {
        print_event(&event, &frame_path);
    }
    Ok(())
}

/// Console commands for a running `watch`, one per line on stdin.
fn commands(pipeline: &SharedPipeline, templates_dir: &Path, events: &Sender<ScanEvent>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim();
        let (command, arg) = line.split_once(' ').map_or((line, ""), |(c, a)| (c, a.trim()));

        match command {
            "" => {}
            "own" | "o" => {
                let mut guard = scanner::lock(pipeline);
                let owned = if arg.is_empty() {
                    guard.own_matched(events)
                } else {
                    let Some(name) = guard.essence().catalog().closest_name(arg).map(str::to_string) else {
                        println!("no catalog entry close to {arg:?}");
                        continue;
                    };
                    let saved = guard.mark_owned([name.as_str()], events);
                    saved.map(|()| vec![name])
                };
                match owned {
                    Ok(names) if names.is_empty() => println!("nothing to mark owned"),
                    Ok(names) => println!("owned: {}", names.join(", ")),
                    Err(err) => tracing::warn!(error = %err, "failed to save owned set"),
                }
            }
            "reload" | "r" => {
                scanner::lock(pipeline).reinitialize_templates(templates_dir);
                println!("templates reloaded");
            }
            _ => println!("unknown command {command:?}; try own [NAME] or reload"),
        }
    }
}

fn detect(config: &Config, image: &Path) -> Result<()> {
    let image = xcap::image::open(image)
        .with_context(|| format!("open {:?}", image))?
        .to_rgba8();
    let capture = ie::Capture::from_rgba(image.width(), image.as_raw());

    let essence = essence_matcher(config);
    let detection = engine(config, &essence).detect(&capture.to_frame());
    let result = essence.evaluate(&detection.keywords);

    print_event(
        &ScanEvent::Diagnostics {
            top: detection.top(config.diagnostics.top_n).to_vec(),
            keywords: detection.keywords.clone(),
        },
        Path::new(""),
    );
    print_result(&result);
    Ok(())
}

fn own(config: &Config, names: &[String]) -> Result<()> {
    let mut essence = essence_matcher(config);
    let mut resolved = Vec::new();
    for name in names {
        match essence.catalog().closest_name(name) {
            Some(found) => resolved.push(found.to_string()),
            None => tracing::warn!(name = %name, "no catalog entry close to this name"),
        }
    }
    if resolved.is_empty() {
        bail!("none of the given names are in the catalog");
    }

    essence.mark_owned(&resolved)?;
    for name in &resolved {
        println!("owned: {name}");
    }
    Ok(())
}

fn print_event(event: &ScanEvent, frame_path: &Path) {
    match event {
        ScanEvent::Match { keywords, result } => {
            tracing::debug!(?keywords, "keyword hits");
            print_result(result);
        }
        ScanEvent::Diagnostics { keywords, top } => {
            println!("  hits: {}", keywords.join(", "));
            for m in top {
                println!(
                    "  {:.3} {} at ({}, {}) {}x{}",
                    m.score, m.keyword, m.bbox.x, m.bbox.y, m.bbox.w, m.bbox.h
                );
            }
        }
        ScanEvent::Frame(png) => {
            if let Err(err) = std::fs::write(frame_path, png) {
                tracing::debug!(error = %err, "failed to write diagnostic frame");
            }
        }
    }
}

fn print_result(result: &MatchResult) {
    let name = result.matched_name().unwrap_or_default();
    match result.status {
        MatchStatus::Invalid => println!("invalid   [{}]", result.snapped_essences.join(", ")),
        MatchStatus::ValidUnowned => println!(
            "UNOWNED   {name} (missing: {})  [{}]",
            result.unowned_names.join(", "),
            result.matched_essences.join(", ")
        ),
        MatchStatus::ValidOwned => println!("owned     {name}  [{}]", result.matched_essences.join(", ")),
    }
}
