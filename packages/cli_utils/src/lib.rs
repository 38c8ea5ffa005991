#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `rider_demand` binary.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so log
//! lines and bars share the terminal. [`PageBar`] renders a catchment load,
//! which fetches zones and then places, as a single bar that grows as each
//! collection reports its page count. [`count_bar`] is a plain bar for
//! output of known length such as a passenger schedule.

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressStyle;
use log::LevelFilter;
use rider_demand_geodata::ProgressCallback;

pub use indicatif::{MultiProgress, ProgressBar};

const TICK: Duration = Duration::from_millis(100);

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn pages_style() -> ProgressStyle {
    ProgressStyle::with_template("  {msg} {wide_bar:.cyan/dim} {pos}/{len} pages [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Page progress across every collection of a catchment load.
///
/// `set_total` is reported once per collection, after its first page has
/// arrived, so the bar length becomes the pages already counted plus the
/// new collection's total. A finished bar starts over on the next load.
pub struct PageBar {
    bar: ProgressBar,
}

impl PageBar {
    /// Adds a spinner to `multi` until the first page count arrives.
    #[must_use]
    pub fn new(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.enable_steady_tick(TICK);
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// [`PageBar::new`], ready for `CatchmentCache::with_progress`.
    #[must_use]
    pub fn shared(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(multi, message))
    }
}

impl ProgressCallback for PageBar {
    fn set_total(&self, total: u64) {
        let counted = self.bar.position();
        self.bar.set_length(counted + total);
        self.bar.set_style(pages_style());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        if self.bar.is_finished() {
            self.bar.reset();
            self.bar.set_style(spinner_style());
            self.bar.enable_steady_tick(TICK);
        }
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// A bar of `total` steps, e.g. one per schedule entry.
#[must_use]
pub fn count_bar(multi: &MultiProgress, message: &str, total: u64) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(total));
    bar.set_style(
        ProgressStyle::with_template("{msg} {wide_bar:.green/dim} {pos}/{len} [{eta}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar.set_message(message.to_string());
    bar
}

/// Installs `pretty_env_logger` behind `indicatif-log-bridge`.
///
/// Defaults to `info` and honours `RUST_LOG` on top. Returns the
/// [`MultiProgress`] every bar must be added to so log lines are printed
/// above them.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Fails only when a logger is already installed.
    let _ = indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init();
    log::set_max_level(level);

    multi
}
