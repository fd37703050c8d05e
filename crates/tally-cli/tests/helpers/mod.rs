use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Runs the `tally` binary against a throwaway database
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("tally.db");

        Self { temp_dir, db_path }
    }

    /// A command isolated from any tally.toml or TALLY_* variable of the host
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("tally").expect("Failed to find tally binary");
        cmd.current_dir(self.temp_dir.path())
            .env("TALLY_DATABASE_PATH", &self.db_path)
            .env("TALLY_DISPLAY_TIMEZONE", "UTC")
            .env_remove("TALLY_DEFAULT_FILTER")
            .env_remove("TALLY_LOG");
        cmd
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Parsed output of `tally export`
    pub fn export(&self) -> Value {
        let output = self.run_success(&["export"]).get_output().stdout.clone();
        serde_json::from_slice(&output).expect("export is not valid JSON")
    }

    /// Full id of the task with this name
    pub fn task_id(&self, name: &str) -> String {
        self.export()["data"]["tasks"]
            .as_array()
            .expect("tasks is not an array")
            .iter()
            .find(|t| t["name"] == name)
            .and_then(|t| t["id"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| panic!("no task named {name}"))
    }

    /// A roster with a main character and one alt
    pub fn with_roster(&self) -> &Self {
        self.run_success(&["character", "add", "Aria", "--main", "--level", "60"]);
        self.run_success(&["character", "add", "Bram"]);
        self
    }
}

/// Utility functions for test assertions
pub mod assertions {
    use predicates::prelude::*;

    pub fn has_task_table_headers() -> impl Predicate<str> {
        predicate::str::contains("ID")
            .and(predicate::str::contains("Character"))
            .and(predicate::str::contains("Every"))
    }

    pub fn succeeded() -> impl Predicate<str> {
        predicate::str::contains("✓")
    }

    pub fn empty_result() -> impl Predicate<str> {
        predicate::str::contains("No tasks found")
    }

    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error").or(predicate::str::contains("error"))
    }
}
