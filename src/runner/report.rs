//! Result aggregation and reporting.
//!
//! ## Reporter Trait
//!
//! Aggregation is separated from presentation by the [`Reporter`] trait. The aggregator consumes every result in
//! canonical (file, format) order, keeps the per-format statistics and the failure list, and tells the reporter
//! what happened. [`ConsoleReporter`] renders the classic results table.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shadertest_core::OutputFormat;

use super::cache::KnownGood;
use super::job::{JobError, JobResult, StatusCode, TestFile};
use super::pool::ResultGrid;

// ============================================================================
// Statistics
// ============================================================================

/// Running totals for one output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatStats {
    pub run: usize,
    pub pass: usize,
    pub skip: usize,
    pub fail: usize,
    pub duration: Duration,
}

impl FormatStats {
    pub fn record(&mut self, result: &JobResult) {
        self.run += 1;
        self.duration += result.duration;
        match result.code {
            StatusCode::Pass => self.pass += 1,
            StatusCode::Skip => self.skip += 1,
            StatusCode::Fail => self.fail += 1,
        }
    }

    pub fn count(&self, code: StatusCode) -> usize {
        match code {
            StatusCode::Pass => self.pass,
            StatusCode::Skip => self.skip,
            StatusCode::Fail => self.fail,
        }
    }

    fn add(&mut self, other: &FormatStats) {
        self.run += other.run;
        self.pass += other.pass;
        self.skip += other.skip;
        self.fail += other.fail;
        self.duration += other.duration;
    }
}

/// A failed work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub file: String,
    pub format: OutputFormat,
    pub error: JobError,
}

/// Outcome of every unit of one file.
#[derive(Debug, Clone)]
pub struct Row<'a> {
    pub file: &'a str,
    pub results: Vec<(OutputFormat, StatusCode)>,
}

impl Row<'_> {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|(_, code)| *code == StatusCode::Pass)
    }
}

/// Summary of a complete run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Requested formats, in column order
    pub formats: Vec<OutputFormat>,
    /// Statistics, parallel to `formats`
    pub stats: Vec<FormatStats>,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    pub fn totals(&self) -> FormatStats {
        let mut totals = FormatStats::default();
        for stats in &self.stats {
            totals.add(stats);
        }
        totals
    }

    pub fn any_failed(&self) -> bool {
        self.stats.iter().any(|s| s.fail > 0)
    }
}

// ============================================================================
// Reporter Trait
// ============================================================================

/// Trait for reporting run progress and results.
pub trait Reporter {
    /// Called once per validator during setup; `path` is `None` when validation is disabled
    fn on_validator(&mut self, _format: OutputFormat, _path: Option<&Path>) {}

    /// Called when a validation cache written for another toolchain was discarded
    fn on_toolchain_changed(&mut self) {}

    /// Called before the first result is consumed
    fn on_run_start(&mut self, formats: &[OutputFormat], files: &[Arc<TestFile>]);

    /// Called once per file, after all of its formats completed
    fn on_row(&mut self, row: &Row<'_>);

    /// Called when every result has been consumed
    fn on_run_complete(&mut self, summary: &RunSummary);
}

// ============================================================================
// Aggregation
// ============================================================================

/// Everything the aggregator learned from a run.
#[derive(Debug, Default)]
pub struct Collected {
    pub summary: RunSummary,
    /// Validated hashes observed this run, per (file, format)
    pub observed: KnownGood,
}

/// Consume every result of `grid`, in file-then-format order.
pub async fn collect<R: Reporter + ?Sized>(
    files: &[Arc<TestFile>],
    formats: &[OutputFormat],
    grid: ResultGrid,
    reporter: &mut R,
) -> Collected {
    let mut collected = Collected {
        summary: RunSummary {
            formats: formats.to_vec(),
            stats: vec![FormatStats::default(); formats.len()],
            failures: Vec::new(),
        },
        observed: KnownGood::new(),
    };

    reporter.on_run_start(formats, files);

    for (file, row) in files.iter().zip(grid.into_rows()) {
        let mut results = Vec::with_capacity(formats.len());
        for (column, (&format, receiver)) in formats.iter().zip(row).enumerate() {
            let result = receiver.await.unwrap_or_else(|_| {
                tracing::warn!(file = %file.key, %format, "worker exited without a result");
                JobResult::lost()
            });

            collected.summary.stats[column].record(&result);
            if let Some(error) = result.error {
                collected.summary.failures.push(Failure {
                    file: file.key.clone(),
                    format,
                    error,
                });
            }
            collected.observed.insert((file.key.clone(), format), result.hashes);
            results.push((format, result.code));
        }
        reporter.on_row(&Row {
            file: &file.key,
            results,
        });
    }

    reporter.on_run_complete(&collected.summary);
    collected
}

// ============================================================================
// Console Reporter
// ============================================================================

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

/// Narrowest format column.
const MIN_COLUMN_WIDTH: usize = 6;

/// Results table printer.
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
    /// Print every row, not only rows with a non-PASS result
    pub verbose: bool,
    /// Emit ANSI colors
    pub color: bool,
    name_width: usize,
    formats: Vec<OutputFormat>,
}

impl ConsoleReporter<io::Stdout> {
    pub fn new(verbose: bool) -> Self {
        Self::with_writer(io::stdout(), verbose, true)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn with_writer(out: W, verbose: bool, color: bool) -> Self {
        Self {
            out,
            verbose,
            color,
            name_width: 0,
            formats: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::debug!(error = %e, "failed to write report");
        }
    }

    fn header(&self) -> String {
        let mut line = format!("{} ┃", " ".repeat(self.name_width));
        for format in &self.formats {
            push_cell(&mut line, &self.paint(CYAN, &align_center(format.name(), column_width(*format))));
        }
        line.push('\n');
        line
    }

    fn rule(&self) -> String {
        let mut line = format!("{}╋", "━".repeat(self.name_width + 1));
        for format in &self.formats {
            line.push_str(&"━".repeat(column_width(*format) + 2));
            line.push('┿');
        }
        line.push('\n');
        line
    }

    fn stat_lines(&self, summary: &RunSummary, code: StatusCode, color: &str) -> String {
        if summary.stats.iter().all(|s| s.count(code) == 0) {
            return String::new();
        }

        let mut counts = format!("{} ┃", self.paint(color, &align_right(code.as_str(), self.name_width)));
        let mut percents = format!("{} ┃", " ".repeat(self.name_width));
        for (format, stats) in summary.formats.iter().zip(&summary.stats) {
            let width = column_width(*format);
            let count = stats.count(code);
            let count_text = align_left(&count.to_string(), width);
            let percent_text = align_right(&percentage(count, stats.run), width);
            if count > 0 {
                push_cell(&mut counts, &self.paint(color, &count_text));
                push_cell(&mut percents, &self.paint(color, &percent_text));
            } else {
                push_cell(&mut counts, &count_text);
                push_cell(&mut percents, &percent_text);
            }
        }
        format!("{counts}\n{percents}\n")
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn on_validator(&mut self, format: OutputFormat, path: Option<&Path>) {
        let status = match path {
            Some(path) => format!("ENABLED ({})", path.display()),
            None => self.paint(RED, "DISABLED"),
        };
        let line = format!("{} validation {}\n", self.paint(CYAN, &format!("{:<8}", format.name())), status);
        self.emit(&line);
    }

    fn on_toolchain_changed(&mut self) {
        let line = format!("{}\n", self.paint(YELLOW, "Toolchains have changed - clearing validation cache"));
        self.emit(&line);
    }

    fn on_run_start(&mut self, formats: &[OutputFormat], files: &[Arc<TestFile>]) {
        self.formats = formats.to_vec();
        self.name_width = files.iter().map(|f| f.key.chars().count()).max().unwrap_or(0);
        let text = format!("\n{}{}", self.header(), self.rule());
        self.emit(&text);
    }

    fn on_row(&mut self, row: &Row<'_>) {
        if !self.verbose && row.all_passed() {
            return;
        }
        let mut line = format!("{} ┃", align_right(row.file, self.name_width));
        for (format, code) in &row.results {
            let cell = align_center(code.as_str(), column_width(*format));
            let color = match code {
                StatusCode::Pass => GREEN,
                StatusCode::Fail => RED,
                StatusCode::Skip => YELLOW,
            };
            push_cell(&mut line, &self.paint(color, &cell));
        }
        line.push('\n');
        self.emit(&line);
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        let mut text = self.rule();
        text.push_str(&self.header());
        text.push_str(&self.rule());
        text.push_str(&self.stat_lines(summary, StatusCode::Pass, GREEN));
        text.push_str(&self.stat_lines(summary, StatusCode::Skip, YELLOW));
        text.push_str(&self.stat_lines(summary, StatusCode::Fail, RED));

        text.push_str(&format!("{} ┃", self.paint(CYAN, &align_right("TIME", self.name_width))));
        for (format, stats) in summary.formats.iter().zip(&summary.stats) {
            let time = align_left(&format_duration(stats.duration), column_width(*format));
            push_cell(&mut text, &self.paint(CYAN, &time));
        }
        text.push('\n');

        for failure in &summary.failures {
            text.push_str(&format!(
                "{} {} {}\n{}\n",
                self.paint(BLUE, &failure.file),
                self.paint(CYAN, failure.format.name()),
                self.paint(RED, "FAIL"),
                indent(&failure.error.to_string(), 4)
            ));
        }
        if !summary.failures.is_empty() {
            text.push('\n');
        }

        let totals = summary.totals();
        let part = |count: usize, label: &str, color: &str| {
            let text = format!("{count} tests {label}");
            if count > 0 { self.paint(color, &text) } else { text }
        };
        text.push_str(&format!(
            "{} tests run, {}, {}, {}\n\n",
            totals.run,
            part(totals.pass, "pass", GREEN),
            part(totals.skip, "skipped", YELLOW),
            part(totals.fail, "failed", RED)
        ));
        self.emit(&text);
    }
}

// ============================================================================
// Formatting helpers
// ============================================================================

fn push_cell(line: &mut String, cell: &str) {
    line.push(' ');
    line.push_str(cell);
    line.push_str(" │");
}

fn column_width(format: OutputFormat) -> usize {
    format.name().chars().count().max(MIN_COLUMN_WIDTH)
}

/// Pad `s` to `width`, left aligned.
pub fn align_left(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}

/// Pad `s` to `width`, right aligned.
pub fn align_right(s: &str, width: usize) -> String {
    format!("{s:>width$}")
}

/// Pad `s` to `width`, centered; odd padding goes to the right.
pub fn align_center(s: &str, width: usize) -> String {
    let padding = width.saturating_sub(s.chars().count());
    format!("{}{s}{}", " ".repeat(padding / 2), " ".repeat(padding - padding / 2))
}

/// `n` out of `total` as a percentage with one decimal, or `-` when nothing ran.
pub fn percentage(n: usize, total: usize) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", n as f64 / total as f64 * 100.0)
}

/// Render a duration as `1h2m3s`, dropping zero components.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

/// Indent every line of `s` by `n` spaces.
pub fn indent(s: &str, n: usize) -> String {
    let tab = " ".repeat(n);
    format!("{tab}{}", s.replace('\n', &format!("\n{tab}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn result(code: StatusCode, secs: u64) -> JobResult {
        JobResult {
            code,
            error: (code == StatusCode::Fail).then(|| JobError::Exit("boom".to_string())),
            duration: Duration::from_secs(secs),
            hashes: if code == StatusCode::Pass { vec!["0x1".to_string()] } else { Vec::new() },
        }
    }

    #[test]
    fn test_stats_record() {
        let mut stats = FormatStats::default();
        stats.record(&result(StatusCode::Pass, 1));
        stats.record(&result(StatusCode::Fail, 2));
        stats.record(&result(StatusCode::Skip, 3));
        assert_eq!(
            stats,
            FormatStats {
                run: 3,
                pass: 1,
                skip: 1,
                fail: 1,
                duration: Duration::from_secs(6),
            }
        );
    }

    #[test]
    fn test_align() {
        assert_eq!(align_center("PASS", 8), "  PASS  ");
        assert_eq!(align_center("FAIL", 7), " FAIL  ");
        assert_eq!(align_center("too long", 4), "too long");
        assert_eq!(align_left("1", 3), "1  ");
        assert_eq!(align_right("1", 3), "  1");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), "33.3%");
        assert_eq!(percentage(0, 0), "-");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(300)), "0s");
        assert_eq!(format_duration(Duration::from_secs(61)), "1m1s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\nb", 4), "    a\n    b");
    }

    #[tokio::test]
    async fn test_collect_orders_and_counts() {
        use tokio::sync::oneshot;

        let files: Vec<Arc<TestFile>> = ["a.wgsl", "b.wgsl"]
            .iter()
            .map(|k| {
                Arc::new(TestFile {
                    path: PathBuf::from(format!("/src/{k}")),
                    key: k.to_string(),
                })
            })
            .collect();
        let formats = [OutputFormat::Wgsl, OutputFormat::Msl];

        let outcomes = [
            [result(StatusCode::Pass, 1), result(StatusCode::Pass, 1)],
            [result(StatusCode::Skip, 1), result(StatusCode::Fail, 1)],
        ];
        let mut rows = Vec::new();
        for row in outcomes {
            let mut receivers = Vec::new();
            for outcome in row {
                let (tx, rx) = oneshot::channel();
                tx.send(outcome).unwrap();
                receivers.push(rx);
            }
            rows.push(receivers);
        }
        let grid = ResultGrid::from_rows(rows);

        let mut reporter = ConsoleReporter::with_writer(Vec::new(), false, false);
        let collected = collect(&files, &formats, grid, &mut reporter).await;

        let summary = &collected.summary;
        assert!(summary.any_failed());
        assert_eq!(summary.stats[0].pass, 1);
        assert_eq!(summary.stats[0].skip, 1);
        assert_eq!(summary.stats[1].fail, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file, "b.wgsl");
        assert_eq!(summary.failures[0].format, OutputFormat::Msl);
        assert_eq!(collected.observed.len(), 4);
        assert_eq!(collected.observed[&("a.wgsl".to_string(), OutputFormat::Msl)], vec!["0x1"]);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        // Only the row with a non-PASS result is printed.
        assert!(!text.contains("a.wgsl ┃"));
        assert!(text.contains("b.wgsl ┃"));
        assert!(text.contains("4 tests run, 2 tests pass, 1 tests skipped, 1 tests failed"));
        assert!(text.contains("b.wgsl msl FAIL\n    boom\n"));
    }

    #[tokio::test]
    async fn test_collect_survives_lost_worker() {
        use tokio::sync::oneshot;

        let files = vec![Arc::new(TestFile {
            path: PathBuf::from("/src/a.wgsl"),
            key: "a.wgsl".to_string(),
        })];
        let (tx, rx) = oneshot::channel::<JobResult>();
        drop(tx);
        let grid = ResultGrid::from_rows(vec![vec![rx]]);

        let mut reporter = ConsoleReporter::with_writer(Vec::new(), true, false);
        let collected = collect(&files, &[OutputFormat::Glsl], grid, &mut reporter).await;
        assert_eq!(collected.summary.stats[0].fail, 1);
        assert_eq!(collected.summary.failures[0].error, JobError::Lost);
    }

    #[test]
    fn test_console_table() {
        let files = vec![Arc::new(TestFile {
            path: PathBuf::from("/src/a.wgsl"),
            key: "a.wgsl".to_string(),
        })];
        let formats = [OutputFormat::Wgsl, OutputFormat::HlslDxc];
        let mut reporter = ConsoleReporter::with_writer(Vec::new(), true, false);
        reporter.on_run_start(&formats, &files);
        reporter.on_row(&Row {
            file: "a.wgsl",
            results: vec![(OutputFormat::Wgsl, StatusCode::Pass), (OutputFormat::HlslDxc, StatusCode::Skip)],
        });
        reporter.on_run_complete(&RunSummary {
            formats: formats.to_vec(),
            stats: vec![
                FormatStats {
                    run: 1,
                    pass: 1,
                    duration: Duration::from_secs(2),
                    ..FormatStats::default()
                },
                FormatStats {
                    run: 1,
                    skip: 1,
                    ..FormatStats::default()
                },
            ],
            failures: Vec::new(),
        });

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let rule = "━━━━━━━╋━━━━━━━━┿━━━━━━━━━━┿\n";
        let header = "       ┃  wgsl  │ hlsl-dxc │\n";
        let expected = [
            "\n",
            header,
            rule,
            "a.wgsl ┃  PASS  │   SKIP   │\n",
            rule,
            header,
            rule,
            "  PASS ┃ 1      │ 0        │\n",
            "       ┃ 100.0% │     0.0% │\n",
            "  SKIP ┃ 0      │ 1        │\n",
            "       ┃   0.0% │   100.0% │\n",
            "  TIME ┃ 2s     │ 0s       │\n",
            "2 tests run, 1 tests pass, 1 tests skipped, 0 tests failed\n\n",
        ]
        .concat();
        assert_eq!(text, expected);
    }
}
