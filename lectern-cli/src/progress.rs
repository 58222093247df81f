use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lectern_engine::{LoadError, LoadingState, Phase, ProgressiveLoader, Subscription};
use serde::Serialize;
use tracing::warn;

fn collection_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[derive(Serialize)]
struct ProgressLine<'a> {
    key: &'a str,
    #[serde(flatten)]
    state: &'a LoadingState,
}

/// Outcome of one collection, printed at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub key: String,
    pub loaded: usize,
    pub total: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectionSummary {
    pub fn loaded(key: &str, loaded: usize, total: usize) -> Self {
        Self {
            key: key.to_owned(),
            loaded,
            total,
            skipped: total.saturating_sub(loaded),
            error: None,
        }
    }

    pub fn failed(key: &str, error: &LoadError) -> Self {
        Self {
            key: key.to_owned(),
            loaded: 0,
            total: 0,
            skipped: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Renders loader progress as indicatif bars or JSON lines.
#[derive(Clone)]
pub struct ProgressReporter {
    multi: MultiProgress,
    json: bool,
}

impl ProgressReporter {
    pub fn new(json: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            json,
        }
    }

    /// Follow `key` until the returned subscription is dropped.
    pub fn track(&self, loader: &ProgressiveLoader, key: &str) -> Subscription {
        if self.json {
            let owned_key = key.to_owned();
            return loader.subscribe(key, move |state| print_json(&ProgressLine {
                key: &owned_key,
                state,
            }));
        }

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(collection_style());
        bar.set_prefix(key.to_owned());
        loader.subscribe(key, move |state| render(&bar, state))
    }

    pub fn print_summary(&self, summaries: &[CollectionSummary]) {
        if self.json {
            for summary in summaries {
                print_json(summary);
            }
            return;
        }

        println!();
        println!("{:<24} {:>8} {:>8} {:>8}", "COLLECTION", "LOADED", "TOTAL", "SKIPPED");
        for summary in summaries {
            match &summary.error {
                Some(error) => println!("{:<24} failed: {error}", summary.key),
                None => println!(
                    "{:<24} {:>8} {:>8} {:>8}",
                    summary.key, summary.loaded, summary.total, summary.skipped
                ),
            }
        }
    }
}

fn render(bar: &ProgressBar, state: &LoadingState) {
    match state.phase {
        Phase::Preparing => {
            bar.set_message("resolving");
            bar.enable_steady_tick(Duration::from_millis(200));
        }
        Phase::Loading => {
            bar.set_length(state.total as u64);
            bar.set_position(state.loaded as u64);
            if let Some(label) = &state.current_label {
                bar.set_message(label.clone());
            }
        }
        Phase::Complete => {
            bar.set_length(state.total as u64);
            bar.set_position(state.loaded as u64);
            bar.finish_with_message("done");
        }
        Phase::Error => {
            let reason = state.error.as_deref().unwrap_or("unknown error");
            bar.abandon_with_message(format!("failed: {reason}"));
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize output line"),
    }
}
