//! Human readable summary printed after a run.

use std::time::Duration;

use bytesize::ByteSize;
use perfstore_engine::Operation;
use perfstore_engine::cleanup::CleanupStats;
use perfstore_engine::metrics::{LatencySummary, SeriesSnapshot};
use perfstore_engine::preset::PresetStats;
use perfstore_engine::workload::WorkloadSummary;
use yansi::Paint;

/// Everything that happened during one `run` command.
#[derive(Debug)]
pub struct Report {
    /// The preset phase, if it completed.
    pub preset: Option<PresetStats>,
    /// The workload phase, if it started.
    pub workload: Option<WorkloadSummary>,
    /// Duration of the workload phase.
    pub elapsed: Duration,
    /// Size of every written payload.
    pub payload_size: u64,
    /// Final state of all metric series.
    pub series: Vec<SeriesSnapshot>,
}

impl Report {
    /// Prints the report to stdout.
    pub fn print(&self) {
        if let Some(stats) = self.preset {
            println!();
            println!("{}", "## PRESET".bold());
            print_preset(&stats);
        }

        let Some(summary) = self.workload else {
            println!();
            println!("{}", "interrupted before the workload started".yellow());
            return;
        };

        println!();
        println!(
            "{} ({} workers, {:.2?})",
            "## WORKLOAD".bold(),
            summary.workers.bold(),
            self.elapsed.bold()
        );
        print_workers(&summary);

        for series in &self.series {
            if matches!(series.op, Operation::Insert | Operation::Delete) {
                continue;
            }
            print_series(series, self.elapsed, self.payload_size);
        }
    }
}

fn print_preset(stats: &PresetStats) {
    println!(
        "  {} existing, {} missing, {} created",
        stats.observed.bold(),
        stats.deficit.bold(),
        stats.created.bold().green()
    );
    if stats.failed > 0 {
        println!("  {}", format!("{} FAILED", stats.failed).bold().red());
    }
}

fn print_workers(summary: &WorkloadSummary) {
    let died = summary.connect_failed + summary.panicked;
    if died > 0 {
        println!(
            "  {}",
            format!(
                "{died} WORKERS STOPPED EARLY ({} connect failures, {} panics)",
                summary.connect_failed, summary.panicked
            )
            .bold()
            .red()
        );
    }
}

fn print_series(series: &SeriesSnapshot, elapsed: Duration, payload_size: u64) {
    let label = format!("{}:", series.op.as_str().to_uppercase());
    print!("{} ({} ops", label.bold().green(), series.success.bold());
    if series.failure > 0 {
        print!(", {}", format!("{} FAILURES", series.failure).bold().red());
    }
    println!(")");

    if series.success == 0 {
        return;
    }

    print!("  {:.2} operations/s", per_second(series.success, elapsed).bold());
    if series.op == Operation::Update {
        let bytes = series.success.saturating_mul(payload_size);
        let throughput = per_second(bytes, elapsed) as u64;
        print!(", {:.2}/s", ByteSize::b(throughput).bold());
    }
    println!();
    print_percentiles(&series.latency);
}

fn print_percentiles(latency: &LatencySummary) {
    let avg = Duration::from_secs_f64(latency.avg());
    let p50 = Duration::from_secs_f64(latency.p50);
    let p90 = Duration::from_secs_f64(latency.p90);
    let p99 = Duration::from_secs_f64(latency.p99);
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

/// Prints the result of the `cleanup` command.
pub fn print_cleanup(stats: &CleanupStats, elapsed: Duration) {
    println!(
        "{} ({} deleted, {:.2?})",
        "## CLEANUP".bold(),
        stats.deleted.bold(),
        elapsed
    );
    if stats.failed > 0 {
        println!("  {}", format!("{} FAILED", stats.failed).bold().red());
    }
}

fn per_second(total: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { total as f64 / secs } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates() {
        assert_eq!(per_second(500, Duration::from_secs(10)), 50.0);
        assert_eq!(per_second(500, Duration::ZERO), 0.0);
    }
}
