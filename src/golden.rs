//! Golden batch files: `name.x` next to `name.batch.json`.
//!
//! The JSON file holds a list of cases. Each case names a top-level function or
//! proc, a batch of rows written as value literals, and either the rows it must
//! produce or the kind of error the whole call must fail with.

use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, ErrorKind};
use crate::harness::{BatchHarness, EmptyRowPolicy, ProcRow, RowFailurePolicy, RunConfig};
use crate::value::Value;

pub const GOLDEN_SUFFIX: &str = ".batch.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    Function,
    Proc,
}

/// One row of expected output: a value, or the kind of error a tagged row carries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpectedRow {
    Value(Value),
    Error { error: ErrorKind },
}

impl Display for ExpectedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Error { error } => write!(f, "<{error} error>"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoldenCase {
    pub name: String,
    pub mode: BatchMode,
    pub top: String,
    #[serde(default)]
    pub batch: Vec<Vec<Value>>,
    #[serde(default)]
    pub initial_state: Vec<Value>,
    #[serde(default)]
    pub tag_rows: bool,
    #[serde(default)]
    pub drop_empty_rows: bool,
    #[serde(default)]
    pub expected: Vec<ExpectedRow>,
    /// When set, the whole call must fail with this kind.
    #[serde(default)]
    pub error: Option<ErrorKind>,
}

impl GoldenCase {
    fn config(&self, base: &RunConfig) -> RunConfig {
        let mut config = base.clone();
        if self.tag_rows {
            config.row_failures = RowFailurePolicy::TagRows;
        }
        if self.drop_empty_rows {
            config.empty_rows = EmptyRowPolicy::Drop;
        }
        config
    }
}

#[derive(Debug)]
pub enum GoldenStatus {
    Passed,
    Mismatch {
        expected: Vec<ExpectedRow>,
        found: Vec<ExpectedRow>,
    },
    UnexpectedError(String),
    MissingError(ErrorKind),
    WrongError {
        expected: ErrorKind,
        found: String,
    },
    ReadError(String),
}

impl GoldenStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, GoldenStatus::Passed)
    }
}

impl Display for GoldenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoldenStatus::Passed => write!(f, "passed"),
            GoldenStatus::Mismatch { expected, found } => {
                write!(f, "expected {} rows, got {}", expected.len(), found.len())
            }
            GoldenStatus::UnexpectedError(message) => write!(f, "failed: {message}"),
            GoldenStatus::MissingError(kind) => {
                write!(f, "expected a {kind} error, but the call succeeded")
            }
            GoldenStatus::WrongError { expected, found } => {
                write!(f, "expected a {expected} error, got: {found}")
            }
            GoldenStatus::ReadError(message) => write!(f, "read error: {message}"),
        }
    }
}

#[derive(Debug)]
pub struct GoldenResult {
    pub name: String,
    pub duration: Duration,
    pub status: GoldenStatus,
}

/// Every `*.batch.json` under `dir`, sorted.
pub fn find_golden_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    visit(dir, &mut files);
    files.sort();
    files
}

fn visit(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            visit(&path, files);
        } else if path.to_string_lossy().ends_with(GOLDEN_SUFFIX) {
            files.push(path);
        }
    }
}

/// The DSLX source a golden file belongs to: `adder.batch.json` -> `adder.x`.
pub fn source_path(golden: &Path) -> PathBuf {
    let name = golden.to_string_lossy();
    let stem = name.strip_suffix(GOLDEN_SUFFIX).unwrap_or(&name);
    PathBuf::from(format!("{stem}.x"))
}

pub fn run_golden_file(
    file: &Path,
    config: &RunConfig,
    filter: Option<&str>,
) -> Vec<GoldenResult> {
    let label = file.to_string_lossy().to_string();
    let read_error = |message: String| {
        vec![GoldenResult {
            name: label.clone(),
            duration: Duration::ZERO,
            status: GoldenStatus::ReadError(message),
        }]
    };

    let source = source_path(file);
    let Ok(code) = fs::read_to_string(&source) else {
        return read_error(format!("Failed to read file: {}", source.display()));
    };
    let cases: Vec<GoldenCase> = match fs::read_to_string(file)
        .map_err(|err| err.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|err| err.to_string()))
    {
        Ok(cases) => cases,
        Err(message) => return read_error(format!("{}: {message}", file.display())),
    };

    cases
        .iter()
        .filter(|case| filter.map(|f| case.name.contains(f)).unwrap_or(true))
        .map(|case| run_case(&code, case, config))
        .collect()
}

fn run_case(code: &str, case: &GoldenCase, config: &RunConfig) -> GoldenResult {
    let start = Instant::now();
    let mut harness = BatchHarness::dslx(case.config(config));
    let outcome: Result<Vec<ExpectedRow>, Error> = match case.mode {
        BatchMode::Function => harness
            .run_function(code, &case.top, &case.batch)
            .map(|rows| rows.into_iter().map(observed).collect()),
        BatchMode::Proc => harness
            .run_proc(code, &case.top, &case.batch, &case.initial_state)
            .map(|rows| {
                rows.into_iter()
                    .map(|row| observed(row.map(ProcRow::into_value)))
                    .collect()
            }),
    };
    debug!(case = %case.name, ok = outcome.is_ok(), "golden case finished");

    let status = match (outcome, case.error) {
        (Ok(found), None) if found == case.expected => GoldenStatus::Passed,
        (Ok(found), None) => GoldenStatus::Mismatch {
            expected: case.expected.clone(),
            found,
        },
        (Ok(_), Some(kind)) => GoldenStatus::MissingError(kind),
        (Err(error), Some(kind)) if error.kind() == kind => GoldenStatus::Passed,
        (Err(error), Some(kind)) => GoldenStatus::WrongError {
            expected: kind,
            found: harness.render_error(&error),
        },
        (Err(error), None) => GoldenStatus::UnexpectedError(harness.render_error(&error)),
    };
    GoldenResult {
        name: case.name.clone(),
        duration: start.elapsed(),
        status,
    }
}

fn observed(row: crate::error::Result<Value>) -> ExpectedRow {
    match row {
        Ok(value) => ExpectedRow::Value(value),
        Err(error) => ExpectedRow::Error { error: error.kind() },
    }
}

/// Runs every golden file and prints a report. Returns whether every case passed.
pub fn run_golden(files: &[PathBuf], config: &RunConfig, filter: Option<&str>) -> bool {
    if files.is_empty() {
        println!("{}", "No golden files found".yellow());
        return false;
    }

    println!("{}", "Running golden batches...".bright_blue());
    println!();

    let mut total = 0;
    let mut passed = 0;
    let start_time = Instant::now();

    for file in files {
        let results = run_golden_file(file, config, filter);
        print_golden_results(file, &results);

        total += results.len();
        passed += results.iter().filter(|r| r.status.is_passed()).count();
    }

    println!();
    print_summary(total, passed, start_time.elapsed());
    passed == total
}

const PASSED: &str = "✓";
const FAILED: &str = "✗";

fn print_golden_results(file: &Path, results: &[GoldenResult]) {
    let file_label = file
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| file.to_string_lossy());
    let all_passed = results.iter().all(|r| r.status.is_passed());
    let icon = if all_passed {
        PASSED.green()
    } else {
        FAILED.red()
    };

    println!("{} {}", icon, file_label.bright_white());

    for r in results {
        let icon = if r.status.is_passed() {
            PASSED.green()
        } else {
            FAILED.red()
        };
        let duration = format!("({:.3}s)", r.duration.as_secs_f32()).dimmed();
        println!("  {} {} {}", icon, r.name, duration);

        match &r.status {
            GoldenStatus::Passed => {}
            GoldenStatus::Mismatch { expected, found } => {
                println!("    {}", r.status.to_string().red());
                let rows = expected.len().max(found.len());
                for row in 0..rows {
                    let want = expected.get(row).map(ToString::to_string).unwrap_or_default();
                    let got = found.get(row).map(ToString::to_string).unwrap_or_default();
                    if want != got {
                        println!("    row {row}: expected {}, got {}", want.green(), got.red());
                    }
                }
            }
            other => println!("    {}", other.to_string().red()),
        }
    }
}

fn print_summary(total: usize, passed: usize, duration: Duration) {
    let failed = total - passed;

    let summary = if failed == 0 {
        format!("Summary: {} passed ({:.3}s)", passed, duration.as_secs_f32()).green()
    } else {
        format!(
            "Summary: {} passed, {} failed ({:.3}s)",
            passed,
            failed,
            duration.as_secs_f32()
        )
        .red()
    };

    println!("{}", summary);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_sits_next_to_the_golden_file() {
        assert_eq!(
            source_path(Path::new("tests/adder.batch.json")),
            PathBuf::from("tests/adder.x")
        );
    }

    #[test]
    fn cases_deserialize_from_literals() {
        let cases: Vec<GoldenCase> = serde_json::from_str(
            r#"[
                {"name": "sum", "mode": "function", "top": "add",
                 "batch": [["u8:1", "u8:2"]], "expected": ["u8:3"]},
                {"name": "tagged", "mode": "proc", "top": "P", "tag_rows": true,
                 "expected": [{"error": "runtime"}, "((), ())"]},
                {"name": "missing", "mode": "function", "top": "nope", "error": "lookup"}
            ]"#,
        )
        .unwrap();
        assert_eq!(cases[0].batch, [vec![Value::ubits(8, 1), Value::ubits(8, 2)]]);
        assert_eq!(cases[0].expected, [ExpectedRow::Value(Value::ubits(8, 3))]);
        assert_eq!(
            cases[1].expected,
            [
                ExpectedRow::Error {
                    error: ErrorKind::Runtime
                },
                ExpectedRow::Value(Value::Tuple(vec![Value::unit(), Value::unit()]))
            ]
        );
        assert_eq!(cases[1].config(&RunConfig::default()).row_failures, RowFailurePolicy::TagRows);
        assert_eq!(cases[2].error, Some(ErrorKind::Lookup));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Vec<GoldenCase>, _> =
            serde_json::from_str(r#"[{"name": "x", "mode": "function", "top": "f", "rows": []}]"#);
        assert!(result.is_err());
    }
}
