//! Background scan loop.
//!
//! One worker thread runs capture -> gate -> match -> classify, then sleeps for
//! the poll interval. Cycles never overlap: each one runs to completion while
//! holding the pipeline lock, and anything else that touches the pipeline
//! (ownership changes, template reloads, region updates) takes the same lock.
//! Ownership changes re-classify the last keyword set right away instead of
//! waiting for the screen to change.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use data::{DataError, EssenceMatcher, MatchResult, MatchStatus, OwnershipSet};
use ie::{ChangeGate, DetectedMatch, GateConfig, Ie};

use crate::capture::FrameSource;
use crate::config::DiagnosticsConfig;
use crate::region::{self, CaptureRegion};
use crate::watch::{FileWatcher, watch_file};

/// Messages sent to whoever consumes scan results.
#[derive(Debug, Clone)]
pub enum ScanEvent {
	/// Sent by every cycle that ran the matcher, and again whenever the
	/// owned set changes.
	Match {
		keywords: Vec<String>,
		result: MatchResult,
	},
	/// Raw keyword hits and the best ranked candidates.
	Diagnostics {
		keywords: Vec<String>,
		top: Vec<DetectedMatch>,
	},
	/// The captured frame, PNG encoded.
	Frame(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
	Cancelled,
	/// Nothing to capture.
	Skipped,
	/// The gate saw no change.
	Unchanged,
	Matched,
}

struct LastMatch {
	keywords: Vec<String>,
	result: MatchResult,
}

/// Everything one scan cycle needs.
pub struct Pipeline {
	source: Box<dyn FrameSource>,
	region: CaptureRegion,
	window_title: Option<String>,
	gate: ChangeGate,
	ie: Ie,
	essence: EssenceMatcher,
	diagnostics: DiagnosticsConfig,
	last: Option<LastMatch>,
}

pub type SharedPipeline = Arc<Mutex<Pipeline>>;

/// Lock the pipeline, ignoring poisoning from a cycle that panicked.
pub fn lock(pipeline: &SharedPipeline) -> MutexGuard<'_, Pipeline> {
	pipeline.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Pipeline {
	pub fn new(source: Box<dyn FrameSource>, ie: Ie, essence: EssenceMatcher, gate: GateConfig) -> Self {
		Self {
			source,
			region: CaptureRegion::default(),
			window_title: None,
			gate: ChangeGate::new(gate),
			ie,
			essence,
			diagnostics: DiagnosticsConfig::default(),
			last: None,
		}
	}

	pub fn with_region(mut self, region: CaptureRegion) -> Self {
		self.region = region;
		self
	}

	/// Fallback window title when the region document doesn't name one.
	pub fn with_window_title(mut self, title: Option<String>) -> Self {
		self.window_title = title;
		self
	}

	pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
		self.diagnostics = diagnostics;
		self
	}

	/// One capture -> gate -> match -> classify pass.
	///
	/// `cancel` is checked before capturing, after capturing and after
	/// matching. Capture failures skip the cycle.
	pub fn run_cycle(&mut self, now: Instant, cancel: &AtomicBool, events: &Sender<ScanEvent>) -> Result<CycleOutcome> {
		let cancelled = || cancel.load(Ordering::SeqCst);
		if cancelled() {
			return Ok(CycleOutcome::Cancelled);
		}

		let title = self
			.region
			.game_window_title
			.as_deref()
			.or(self.window_title.as_deref());
		let capture = match self.source.capture(&self.region, title) {
			Ok(capture) if !capture.is_empty() => capture,
			Ok(_) => {
				tracing::debug!("empty capture, skipping cycle");
				return Ok(CycleOutcome::Skipped);
			}
			Err(err) => {
				tracing::debug!("capture unavailable, skipping cycle: {err}");
				return Ok(CycleOutcome::Skipped);
			}
		};
		if cancelled() {
			return Ok(CycleOutcome::Cancelled);
		}

		let frame = capture.to_frame();
		if !self.gate.check(&frame, now).proceeds() {
			return Ok(CycleOutcome::Unchanged);
		}

		let detection = self.ie.detect(&frame);
		if cancelled() {
			// Nothing was delivered for this frame.
			self.gate.reset();
			return Ok(CycleOutcome::Cancelled);
		}

		let result = self.essence.evaluate(&detection.keywords);
		tracing::debug!(
			"matched {} keywords, {:?} {:?}",
			detection.keywords.len(),
			result.status,
			result.matched_name()
		);

		self.last = Some(LastMatch {
			keywords: detection.keywords.clone(),
			result: result.clone(),
		});
		// A closed channel only means nobody is listening.
		let _ = events.send(ScanEvent::Match {
			keywords: detection.keywords.clone(),
			result,
		});
		if self.diagnostics.text {
			let _ = events.send(ScanEvent::Diagnostics {
				top: detection.top(self.diagnostics.top_n).to_vec(),
				keywords: detection.keywords,
			});
		}
		if self.diagnostics.image {
			let png = capture.encode_png().context("encode diagnostic frame")?;
			let _ = events.send(ScanEvent::Frame(png));
		}

		Ok(CycleOutcome::Matched)
	}

	/// Use a new capture region. The next frame is compared against nothing.
	pub fn set_region(&mut self, region: CaptureRegion) {
		tracing::info!(
			"capture region {}x{} at ({}, {})",
			region.width,
			region.height,
			region.left,
			region.top
		);
		self.region = region;
		self.gate.reset();
	}

	pub fn region(&self) -> &CaptureRegion {
		&self.region
	}

	/// The next cycle matches whatever the gate would say.
	pub fn force_rescan(&mut self) {
		self.gate.reset();
	}

	/// Reload the template bank. The next cycle matches with it.
	pub fn reinitialize_templates(&mut self, dir: impl AsRef<Path>) {
		self.ie.reinitialize(dir);
		self.gate.reset();
	}

	pub fn essence(&self) -> &EssenceMatcher {
		&self.essence
	}

	/// Classify the last keyword set again and send the result.
	///
	/// Does nothing before the first match.
	pub fn rematch(&mut self, events: &Sender<ScanEvent>) -> Option<MatchStatus> {
		let last = self.last.as_mut()?;
		last.result = self.essence.evaluate(&last.keywords);
		let _ = events.send(ScanEvent::Match {
			keywords: last.keywords.clone(),
			result: last.result.clone(),
		});
		Some(last.result.status)
	}

	/// Mark names owned, persist, and re-classify the last match.
	///
	/// The in-memory set changes even when persisting fails.
	pub fn mark_owned<S: AsRef<str>>(
		&mut self,
		names: impl IntoIterator<Item = S>,
		events: &Sender<ScanEvent>,
	) -> Result<(), DataError> {
		let saved = self.essence.mark_owned(names);
		self.rematch(events);
		saved
	}

	/// Mark every unowned entry of the last valid match owned. Returns the
	/// names that were marked.
	pub fn own_matched(&mut self, events: &Sender<ScanEvent>) -> Result<Vec<String>, DataError> {
		let names = match &self.last {
			Some(last) if last.result.is_valid() => last.result.unowned_names.clone(),
			_ => Vec::new(),
		};
		if !names.is_empty() {
			self.mark_owned(&names, events)?;
		}
		Ok(names)
	}

	/// Use an owned set that was changed on disk, and re-classify the last
	/// match if it differs from the current one.
	pub fn reload_owned(&mut self, owned: OwnershipSet, events: &Sender<ScanEvent>) {
		if self.essence.set_owned(owned) {
			tracing::info!(owned = self.essence.owned().len(), "owned set reloaded");
			self.rematch(events);
		}
	}
}

/// Apply every change of the region document at `path` to the pipeline.
pub fn follow_region(pipeline: SharedPipeline, path: &Path) -> Result<FileWatcher> {
	region::watch(path, move |region| lock(&pipeline).set_region(region))
}

/// Reload the owned set whenever the file at `path` changes, e.g. when another
/// process marks entries owned.
pub fn follow_ownership(pipeline: SharedPipeline, path: &Path, events: Sender<ScanEvent>) -> Result<FileWatcher> {
	let target = path.to_path_buf();
	watch_file(path, move || {
		let owned = OwnershipSet::load_or_empty(&target);
		lock(&pipeline).reload_owned(owned, &events);
	})
}

/// Cancellation flag plus a sleep that wakes up as soon as it is set.
#[derive(Default)]
struct StopSignal {
	stopped: AtomicBool,
	lock: Mutex<()>,
	cv: Condvar,
}

impl StopSignal {
	fn stop(&self) {
		// Set under the lock so a worker about to sleep can't miss it.
		let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		self.stopped.store(true, Ordering::SeqCst);
		self.cv.notify_all();
	}

	fn is_stopped(&self) -> bool {
		self.stopped.load(Ordering::SeqCst)
	}

	/// Returns `true` if stopped.
	fn sleep(&self, duration: Duration) -> bool {
		let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
		let _ = self
			.cv
			.wait_timeout_while(guard, duration, |_| !self.is_stopped())
			.unwrap_or_else(PoisonError::into_inner);
		self.is_stopped()
	}
}

pub struct Scanner {
	pipeline: SharedPipeline,
	interval: Duration,
	events: Sender<ScanEvent>,
	worker: Option<(Arc<StopSignal>, JoinHandle<()>)>,
}

impl Scanner {
	pub fn new(pipeline: Pipeline, interval: Duration, events: Sender<ScanEvent>) -> Self {
		Self {
			pipeline: Arc::new(Mutex::new(pipeline)),
			interval,
			events,
			worker: None,
		}
	}

	/// Shared handle for operations that must not overlap a cycle.
	pub fn pipeline(&self) -> SharedPipeline {
		self.pipeline.clone()
	}

	pub fn is_running(&self) -> bool {
		self.worker
			.as_ref()
			.is_some_and(|(_, handle)| !handle.is_finished())
	}

	/// Start the worker. Does nothing if it is already running.
	pub fn start(&mut self) -> Result<()> {
		if self.is_running() {
			return Ok(());
		}
		self.stop();
		// A cycle cut short by the last stop may have left the gate primed.
		lock(&self.pipeline).force_rescan();

		let signal = Arc::new(StopSignal::default());
		let pipeline = self.pipeline.clone();
		let events = self.events.clone();
		let interval = self.interval;
		let worker_signal = signal.clone();
		let handle = std::thread::Builder::new()
			.name("scanner".to_string())
			.spawn(move || run(&pipeline, &worker_signal, interval, &events))
			.context("spawn scanner thread")?;

		self.worker = Some((signal, handle));
		Ok(())
	}

	/// Request cancellation and wait for the current cycle to end.
	pub fn stop(&mut self) {
		if let Some((signal, handle)) = self.worker.take() {
			signal.stop();
			if handle.join().is_err() {
				tracing::warn!("scanner thread panicked");
			}
		}
	}
}

impl Drop for Scanner {
	fn drop(&mut self) {
		self.stop();
	}
}

fn run(pipeline: &SharedPipeline, signal: &StopSignal, interval: Duration, events: &Sender<ScanEvent>) {
	tracing::info!(interval_ms = interval.as_millis() as u64, "scanner started");
	while !signal.is_stopped() {
		let started = Instant::now();
		let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
			lock(pipeline).run_cycle(started, &signal.stopped, events)
		}));
		match outcome {
			Ok(Ok(outcome)) => {
				tracing::trace!(?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "scan cycle")
			}
			Ok(Err(err)) => tracing::warn!(error = %format!("{err:#}"), "scan cycle failed"),
			Err(_) => tracing::warn!("scan cycle panicked"),
		}

		if signal.sleep(interval) {
			break;
		}
	}
	tracing::info!("scanner stopped");
}
