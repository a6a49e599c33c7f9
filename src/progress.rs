use indicatif::{ProgressBar, ProgressStyle};

use crate::dispatch::Outcome;

const TEMPLATE: &str = "Testing latency [{bar:40.cyan/blue}] {pos:>5}/{len:5} {msg} [{elapsed_precise}]";

/// Terminal progress bar, advanced once per finished attempt. Drawn on stderr so it never
/// mixes with the report.
pub struct Progress {
    bar: ProgressBar,
    failed: usize,
}

impl Progress {
    pub fn new(total: usize) -> Progress {
        let style = ProgressStyle::with_template(TEMPLATE)
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);

        Progress { bar, failed: 0 }
    }

    /// Draws nothing. Used for quiet and machine-readable runs.
    pub fn hidden() -> Progress {
        Progress {
            bar: ProgressBar::hidden(),
            failed: 0,
        }
    }

    pub fn observe(&mut self, outcome: &Outcome) {
        if !outcome.succeeded() {
            self.failed += 1;
            self.bar.set_message(format!("{} failed", self.failed));
        }
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
