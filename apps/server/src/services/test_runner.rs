//! Executing generated tests against a script.
//!
//! `PythonTestRunner` writes the script as `script_to_test.py` and the tests as
//! `test_script.py` into a fresh temporary directory and runs pytest there,
//! falling back to `python -m unittest` when pytest is not installed. Every
//! execution yields exactly one `RunOutcome`; spawn failures and timeouts are
//! outcomes with status `error`, not Rust errors.
//!
//! Both backends report a test that fails on an exception other than an
//! assertion as `error`. unittest does so natively; for pytest a `conftest.py`
//! hook prints `RAISED_MARKER` with the count of such tests.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Output;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RunnerSettings;
use crate::models::TestStatus;
use crate::services::prompts::SCRIPT_MODULE;

const TEST_MODULE: &str = "test_script";

/// Line prefix printed by `CONFTEST` when tests raised non-assertion exceptions.
const RAISED_MARKER: &str = "tests raised exceptions:";

/// pytest plugin counting failures caused by anything but an assertion.
const CONFTEST: &str = r#"import pytest

_raised = []


@pytest.hookimpl(hookwrapper=True)
def pytest_runtest_makereport(item, call):
    outcome = yield
    report = outcome.get_result()
    if (
        report.when == "call"
        and report.failed
        and call.excinfo is not None
        and not call.excinfo.errisinstance((AssertionError, pytest.fail.Exception))
    ):
        _raised.append(item.nodeid)


def pytest_terminal_summary(terminalreporter):
    if _raised:
        terminalreporter.write_line("tests raised exceptions: %d" % len(_raised))
"#;

/// Cap on stored output, in bytes.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Result of one test execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: TestStatus,
    pub output: String,
    /// Wall-clock seconds
    pub execution_time: f64,
}

/// Runs a test suite against a script.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, language: &str, script: &str, tests: &str) -> RunOutcome;
}

/// pytest/unittest runner for Python scripts.
pub struct PythonTestRunner {
    settings: RunnerSettings,
}

enum Attempt {
    Finished(Output),
    NotFound,
    Failed(String),
}

impl PythonTestRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    async fn execute(&self, mut command: Command) -> Attempt {
        command.kill_on_drop(true);

        match tokio::time::timeout(self.settings.timeout, command.output()).await {
            Ok(Ok(output)) => Attempt::Finished(output),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => Attempt::NotFound,
            Ok(Err(e)) => Attempt::Failed(format!("Failed to start test process: {}", e)),
            Err(_) => Attempt::Failed(format!(
                "Test execution timed out after {}s",
                self.settings.timeout.as_secs()
            )),
        }
    }

    async fn run_python(&self, dir: &Path, script: &str, tests: &str) -> (TestStatus, String) {
        let script_path = dir.join(format!("{SCRIPT_MODULE}.py"));
        let test_path = dir.join(format!("{TEST_MODULE}.py"));

        if let Err(e) = tokio::fs::write(&script_path, script).await {
            return (TestStatus::Error, format!("Failed to write script: {}", e));
        }
        if let Err(e) = tokio::fs::write(&test_path, tests).await {
            return (TestStatus::Error, format!("Failed to write tests: {}", e));
        }
        if let Err(e) = tokio::fs::write(dir.join("conftest.py"), CONFTEST).await {
            return (TestStatus::Error, format!("Failed to write conftest: {}", e));
        }

        let mut pytest = Command::new(&self.settings.pytest_bin);
        pytest
            .args(["-q", "-p", "no:cacheprovider"])
            .arg(format!("{TEST_MODULE}.py"))
            .current_dir(dir);

        match self.execute(pytest).await {
            Attempt::Finished(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let status = pytest_status(output.status.code(), &stdout);
                return (status, combined_output(&output));
            }
            Attempt::Failed(message) => return (TestStatus::Error, message),
            Attempt::NotFound => {
                warn!(
                    "{} not found, falling back to unittest",
                    self.settings.pytest_bin
                );
            }
        }

        let mut unittest = Command::new(&self.settings.python_bin);
        unittest
            .args(["-m", "unittest", "-v", TEST_MODULE])
            .current_dir(dir);

        match self.execute(unittest).await {
            Attempt::Finished(output) => {
                let text = combined_output(&output);
                (unittest_status(output.status.code(), &text), text)
            }
            Attempt::Failed(message) => (TestStatus::Error, message),
            Attempt::NotFound => (
                TestStatus::Error,
                format!(
                    "Neither {} nor {} is available to run tests",
                    self.settings.pytest_bin, self.settings.python_bin
                ),
            ),
        }
    }
}

#[async_trait]
impl TestRunner for PythonTestRunner {
    async fn run(&self, language: &str, script: &str, tests: &str) -> RunOutcome {
        let started = Instant::now();

        let (status, output) = if !language.eq_ignore_ascii_case("python") {
            (
                TestStatus::Error,
                format!("Test execution is not supported for language '{}'", language),
            )
        } else {
            match tempfile::tempdir() {
                Ok(dir) => self.run_python(dir.path(), script, tests).await,
                Err(e) => (
                    TestStatus::Error,
                    format!("Failed to create test directory: {}", e),
                ),
            }
        };

        let execution_time = started.elapsed().as_secs_f64();
        info!(
            "Test run finished: language={}, status={}, time={:.2}s",
            language, status, execution_time
        );
        debug!("Test output:\n{}", output);

        RunOutcome {
            status,
            output: truncate_output(output),
            execution_time,
        }
    }
}

fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (true, true) => String::new(),
    }
}

fn truncate_output(mut output: String) -> String {
    if output.len() <= MAX_OUTPUT_BYTES {
        return output;
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str("\n... [output truncated]");
    output
}

/// Last non-empty line; pytest prints its summary there.
fn summary_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}

/// Map a pytest exit code to a status.
///
/// 0 is a pass. 1 means tests ran and some failed; that is an error when the
/// summary reports errors (exceptions outside test bodies) or a test body
/// raised something other than an assertion. Anything else (interrupted,
/// collection or import failure, no tests collected) is an error.
pub fn pytest_status(exit_code: Option<i32>, output: &str) -> TestStatus {
    match exit_code {
        Some(0) => TestStatus::Passed,
        Some(1) => {
            let summary = summary_line(output);
            let raised = output
                .lines()
                .any(|line| line.trim_start().starts_with(RAISED_MARKER));
            if raised || summary.contains(" error") {
                TestStatus::Error
            } else {
                TestStatus::Failed
            }
        }
        _ => TestStatus::Error,
    }
}

/// Map a unittest run to a status from its exit code and `FAILED (...)` line.
pub fn unittest_status(exit_code: Option<i32>, output: &str) -> TestStatus {
    if exit_code == Some(0) {
        return TestStatus::Passed;
    }

    match output.lines().rev().find(|line| line.starts_with("FAILED (")) {
        Some(line) if line.contains("errors=") => TestStatus::Error,
        Some(line) if line.contains("failures=") => TestStatus::Failed,
        _ => TestStatus::Error,
    }
}
