//! Prints per-operation results and per-phase metrics.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use yansi::{Color, Paint};

use crate::http::Outcome;
use crate::stresstest::{PhaseStatus, PhaseSummary, RunSummary};
use crate::workload::Action;

/// Counters and latencies of all operations within one phase.
#[derive(Default)]
pub struct PhaseMetrics {
    /// Operations that were issued.
    pub attempted: u64,
    /// Operations answered with a `2xx` status.
    pub succeeded: u64,
    /// Operations answered with any other status.
    pub rejected: u64,
    /// Operations that did not get a response.
    pub transport_failures: u64,
    /// Wall time of the whole phase.
    pub elapsed: Duration,
    timing: DDSketch,
}

impl PhaseMetrics {
    /// Accounts for a finished operation that took `elapsed`.
    pub fn record(&mut self, outcome: &Outcome, elapsed: Duration) {
        self.attempted += 1;
        match outcome {
            Outcome::Status(status) if status.is_success() => self.succeeded += 1,
            Outcome::Status(_) => self.rejected += 1,
            Outcome::Transport(_) => self.transport_failures += 1,
        }
        self.timing.add(elapsed.as_secs_f64());
    }

    /// Operations that did not succeed.
    pub fn failures(&self) -> u64 {
        self.rejected + self.transport_failures
    }

    fn quantile(&self, q: f64) -> Option<Duration> {
        let value = self.timing.quantile(q).ok().flatten()?;
        Some(Duration::from_secs_f64(value))
    }
}

impl fmt::Debug for PhaseMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseMetrics")
            .field("attempted", &self.attempted)
            .field("succeeded", &self.succeeded)
            .field("rejected", &self.rejected)
            .field("transport_failures", &self.transport_failures)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// Writes one line per finished operation, and a summary at the end of a run.
///
/// Lines are written synchronously in the order they are reported. Reporting is best effort: if
/// the output is broken, lines are lost but the run carries on.
pub struct Reporter {
    out: Box<dyn Write + Send>,
    color: bool,
}

impl Reporter {
    /// Creates a reporter writing colored output to stdout.
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
            color: true,
        }
    }

    /// Creates a reporter writing uncolored output to the given writer.
    pub fn plain(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            color: false,
        }
    }

    fn colorize<T: fmt::Display>(&self, value: T, color: Color) -> String {
        if self.color {
            value.paint(color).bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        self.out.write_fmt(args).ok();
        self.out.write_all(b"\n").ok();
    }

    /// Reports the outcome of one operation on the container `name`.
    pub fn report(&mut self, action: Action, name: &str, outcome: &Outcome) {
        let color = if outcome.is_success() {
            Color::Green
        } else {
            Color::Red
        };
        let outcome = self.colorize(outcome, color);
        self.line(format_args!("{action} {name}: {outcome}"));
    }

    /// Announces the start of a phase.
    pub fn phase(&mut self, action: Action, targets: usize) {
        let header = self.colorize(format_args!("## {action}"), Color::Blue);
        self.line(format_args!("{header} ({targets} containers)"));
    }

    /// Prints metrics of all phases of a finished run.
    pub fn summary(&mut self, summary: &RunSummary) {
        self.line(format_args!(""));
        let header = self.colorize("## SUMMARY", Color::Blue);
        self.line(format_args!("{header}"));

        for phase in &summary.phases {
            self.phase_summary(phase);
        }

        let remaining = summary.remaining.len();
        self.line(format_args!("{remaining} containers remaining in batch"));
        if summary.cancelled {
            let cancelled = self.colorize("run cancelled", Color::Yellow);
            self.line(format_args!("{cancelled}"));
        }
        self.out.flush().ok();
    }

    fn phase_summary(&mut self, phase: &PhaseSummary) {
        let metrics = &phase.metrics;
        let label = self.colorize(format_args!("{}:", phase.action), Color::Green);

        let status = match &phase.status {
            PhaseStatus::Completed => String::new(),
            PhaseStatus::Aborted(reason) => {
                format!(", {}", self.colorize(format_args!("ABORTED: {reason}"), Color::Red))
            }
            PhaseStatus::Interrupted => format!(", {}", self.colorize("INTERRUPTED", Color::Yellow)),
            PhaseStatus::Skipped => format!(", {}", self.colorize("SKIPPED", Color::Yellow)),
        };
        let failures = match metrics.failures() {
            0 => String::new(),
            n => format!(", {}", self.colorize(format_args!("{n} FAILURES"), Color::Red)),
        };
        self.line(format_args!(
            "{label} ({} ops{failures}{status})",
            metrics.attempted
        ));

        if metrics.attempted == 0 {
            return;
        }
        if metrics.failures() > 0 {
            self.line(format_args!(
                "  {} rejected; {} transport failures",
                metrics.rejected, metrics.transport_failures
            ));
        }

        let ops_ps = metrics.attempted as f64 / metrics.elapsed.as_secs_f64().max(f64::EPSILON);
        self.line(format_args!("  {ops_ps:.2} operations/s"));

        if let (Some(p50), Some(p90), Some(p99)) = (
            metrics.quantile(0.5),
            metrics.quantile(0.9),
            metrics.quantile(0.99),
        ) {
            let avg = metrics
                .timing
                .sum()
                .map(|sum| Duration::from_secs_f64(sum / metrics.attempted as f64))
                .unwrap_or_default();
            self.line(format_args!(
                "  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}"
            ));
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use reqwest::StatusCode;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn one_line_per_report() {
        let buffer = Buffer::default();
        let mut reporter = Reporter::plain(buffer.clone());

        reporter.report(
            Action::Create,
            "nginx-alpine-0",
            &Outcome::Status(StatusCode::OK),
        );
        reporter.report(
            Action::FetchLogs,
            "nginx-alpine-0",
            &Outcome::Transport("connection refused".into()),
        );

        assert_eq!(
            buffer.contents(),
            "CREATE nginx-alpine-0: 200 OK\n\
             FETCH LOGS nginx-alpine-0: FAILED (connection refused)\n"
        );
    }

    #[test]
    fn colors_outcomes() {
        let buffer = Buffer::default();
        let mut reporter = Reporter {
            out: Box::new(buffer.clone()),
            color: true,
        };

        reporter.phase(Action::Stop, 1);
        reporter.report(
            Action::Stop,
            "nginx-alpine-0",
            &Outcome::Status(StatusCode::INTERNAL_SERVER_ERROR),
        );

        let output = buffer.contents();
        assert!(output.contains('\u{1b}'));
        assert!(output.contains("## STOP"));
        assert!(output.contains("500 Internal Server Error"));
    }

    #[test]
    fn counts_outcomes() {
        let mut metrics = PhaseMetrics::default();
        let ms = Duration::from_millis(1);

        metrics.record(&Outcome::Status(StatusCode::OK), ms);
        metrics.record(&Outcome::Status(StatusCode::CREATED), ms);
        metrics.record(&Outcome::Status(StatusCode::NOT_FOUND), ms);
        metrics.record(&Outcome::Transport("timeout".into()), ms);

        assert_eq!(metrics.attempted, 4);
        assert_eq!(metrics.succeeded, 2);
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.transport_failures, 1);
        assert_eq!(metrics.failures(), 2);
        assert!(metrics.quantile(0.5).is_some());
    }

    #[test]
    fn summarizes_phases() {
        let buffer = Buffer::default();
        let mut reporter = Reporter::plain(buffer.clone());

        let mut metrics = PhaseMetrics::default();
        metrics.record(&Outcome::Status(StatusCode::OK), Duration::from_millis(3));
        metrics.record(
            &Outcome::Status(StatusCode::INTERNAL_SERVER_ERROR),
            Duration::from_millis(5),
        );
        metrics.elapsed = Duration::from_millis(8);

        let summary = RunSummary {
            phases: vec![
                PhaseSummary {
                    action: Action::Create,
                    status: PhaseStatus::Completed,
                    targets: vec!["a-0".into(), "a-1".into()],
                    metrics,
                },
                PhaseSummary {
                    action: Action::Restart,
                    status: PhaseStatus::Aborted("too large".into()),
                    targets: vec![],
                    metrics: PhaseMetrics::default(),
                },
            ],
            remaining: vec!["a-0".into(), "a-1".into()],
            cancelled: false,
        };
        reporter.summary(&summary);

        let output = buffer.contents();
        assert!(output.contains("CREATE: (2 ops, 1 FAILURES)"));
        assert!(output.contains("  1 rejected; 0 transport failures"));
        assert!(output.contains("RESTART: (0 ops, ABORTED: too large)"));
        assert!(output.contains("2 containers remaining in batch"));
        assert!(!output.contains("run cancelled"));
    }
}
