// AI
//! 📊 progress.rs — "Are we there yet?" — asked of a pipeline that has no "there".
//!
//! 🚀 A bucket listing has no total. The poll loop runs until someone presses Ctrl-C. So instead
//! of a progress bar this is a spinner with throughput numbers, and at shutdown a table that
//! says what the iterator actually did: how much it listed, skipped, fetched and emitted.
//!
//! ⚠️  Watching the spinner will not make it go faster. Science says no. 🦆

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::iterator::IteratorStats;

// -- 📏 one mebibyte. not a megabyte. I will die on this hill.
const MIB: f64 = 1024.0 * 1024.0;

/// 🔢 "1000000" → "1,000,000" — you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 📊 Records and bytes shipped, with a 5-second sliding window for the rates.
pub(crate) struct ProgressMetrics {
    source_name: String,
    total_bytes: u64,
    total_records: u64,
    spinner: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar doesn't derive Debug, and printing a spinner is a choice anyway
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("total_bytes", &self.total_bytes)
            .field("total_records", &self.total_records)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 `visible = false` keeps the terminal quiet (tests, `--once` in scripts).
    pub(crate) fn new(source_name: String, visible: bool) -> Self {
        let spinner = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(250));

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_name,
            total_bytes: 0,
            total_records: 0,
            spinner,
            rate_samples,
            start_time,
        }
    }

    pub(crate) fn total_records(&self) -> u64 {
        self.total_records
    }

    /// 🔄 Feed it after every batch the sink accepted.
    pub(crate) fn update(&mut self, bytes: u64, records: u64) {
        self.total_bytes += bytes;
        self.total_records += records;
        let (records_per_sec, mib_per_sec) = self.calculate_rates();
        self.spinner.set_message(format!(
            "source: {} | {} records ({} rec/s) | {:.2} MiB/s | {} elapsed",
            self.source_name,
            format_number(self.total_records),
            format_number(records_per_sec as u64),
            mib_per_sec,
            format_duration(self.start_time.elapsed()),
        ));
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    fn calculate_rates(&mut self) -> (f64, f64) {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_records));

        if let Some(&(oldest_time, oldest_bytes, oldest_records)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.total_bytes.saturating_sub(oldest_bytes);
                let records_delta = self.total_records.saturating_sub(oldest_records);
                return (
                    records_delta as f64 / elapsed,
                    (bytes_delta as f64 / elapsed) / MIB,
                );
            }
        }
        (0.0, 0.0)
    }
}

/// 🍽️ The shutdown report. Two columns, right-aligned, no borders.
pub(crate) fn summary_table(stats: &IteratorStats, elapsed: Duration) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let rows = [
        ("pages listed", stats.pages_listed),
        ("objects seen", stats.objects_seen),
        ("unmatched", stats.unmatched),
        ("owned by other tasks", stats.unowned),
        ("already completed", stats.completed_skipped),
        ("objects fetched", stats.objects_fetched),
        ("vanished", stats.vanished),
        ("objects completed", stats.objects_completed),
        ("records emitted", stats.records_emitted),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label).set_alignment(CellAlignment::Right),
            Cell::new(format_number(value)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("elapsed").set_alignment(CellAlignment::Right),
        Cell::new(format_duration(elapsed)).set_alignment(CellAlignment::Right),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_hours_only_show_up_when_earned() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_the_summary_tells_the_whole_story() {
        let the_stats = IteratorStats {
            pages_listed: 3,
            objects_seen: 12,
            records_emitted: 12_345,
            ..IteratorStats::default()
        };
        let the_rendered = summary_table(&the_stats, Duration::from_secs(61)).to_string();
        assert!(the_rendered.contains("pages listed"));
        assert!(the_rendered.contains("12,345"));
        assert!(the_rendered.contains("01:01"));
    }

    #[test]
    fn the_one_where_a_hidden_spinner_still_counts() {
        let mut the_metrics = ProgressMetrics::new("test".to_string(), false);
        the_metrics.update(100, 2);
        the_metrics.update(50, 1);
        assert_eq!(the_metrics.total_records(), 3);
        the_metrics.finish();
    }
}
