use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Runs the `cadence` binary against a throwaway database in UTC
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        Self { temp_dir, db_path }
    }

    /// Get a Command instance configured for testing
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("cadence").expect("Failed to find cadence binary");
        cmd.current_dir(self.temp_dir.path())
            .env("CADENCE_DATABASE_PATH", &self.db_path)
            .env("CADENCE_DEFAULT_TIMEZONE", "UTC")
            .env_remove("CADENCE_LOG");
        cmd
    }

    pub fn has_database(&self) -> bool {
        self.db_path.exists()
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs a command and returns its stdout without color codes
    pub fn stdout(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        strip_ansi(&String::from_utf8_lossy(&output))
    }

    /// Creates a series and returns the short ID printed for it
    pub fn add_series(&self, args: &[&str]) -> String {
        let mut full = vec!["add"];
        full.extend_from_slice(args);
        let stdout = self.stdout(&full);

        stdout
            .split("Created series ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
            .unwrap_or_else(|| panic!("no series ID in output: {}", stdout))
    }
}

/// Weekly standup on Mondays from 2030-01-07 09:00 UTC, four times
pub fn weekly_standup() -> Vec<&'static str> {
    vec![
        "Standup",
        "--start",
        "2030-01-07 09:00",
        "--every",
        "weekly",
        "--count",
        "4",
        "--location",
        "Room 1",
    ]
}

pub const JANUARY: [&str; 4] = ["--from", "2030-01-01", "--to", "2030-02-01"];

fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // Skip to the end of the escape sequence
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}
