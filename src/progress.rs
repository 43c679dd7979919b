//! Status reporting for the scan and process phases.
//!
//! Reporters only observe; nothing in the engine depends on what they do
//! with an update.

use std::{io::IsTerminal, sync::Mutex};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Process,
}

impl Phase {
    /// Human-readable status line for `done` of `total`.
    pub fn status(&self, done: usize, total: usize) -> String {
        match self {
            Phase::Scan => format!("scanned {done} of {total} repositories"),
            Phase::Process => format!("processed {done} of {total} items"),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    /// Called once per settled unit of work; `done` never decreases within a
    /// phase.
    fn update(&self, phase: Phase, done: usize, total: usize);

    fn finish(&self, _phase: Phase) {}
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&self, _phase: Phase, _done: usize, _total: usize) {}
}

/// Emits each update as an `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn update(&self, phase: Phase, done: usize, total: usize) {
        info!("{}", phase.status(done, total));
    }
}

/// Live progress bar on stderr.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<(Phase, ProgressBar)>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_bar(total: usize) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }
}

impl ProgressReporter for TerminalProgress {
    fn update(&self, phase: Phase, done: usize, total: usize) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        let bar = match slot.as_ref() {
            Some((current, bar)) if *current == phase => bar.clone(),
            _ => {
                if let Some((_, old)) = slot.take() {
                    old.finish_and_clear();
                }
                let bar = Self::new_bar(total);
                *slot = Some((phase, bar.clone()));
                bar
            }
        };
        bar.set_length(total as u64);
        bar.set_position(done as u64);
        bar.set_message(phase.status(done, total));
    }

    fn finish(&self, phase: Phase) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        if matches!(slot.as_ref(), Some((current, _)) if *current == phase) {
            if let Some((_, bar)) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

/// A bar when stderr is a terminal, log lines otherwise.
pub fn default_reporter() -> Box<dyn ProgressReporter> {
    if std::io::stderr().is_terminal() {
        Box::new(TerminalProgress::new())
    } else {
        Box::new(LogProgress)
    }
}
