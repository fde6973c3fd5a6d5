//! Integration tests for apidex

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn apidex() -> Command {
        cargo_bin_cmd!("apidex")
    }

    /// Write a config whose state lives under `dir`
    fn write_config(dir: &Path, entries: &str) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            r#"
[general]
journal = true

[paths]
cache_dir = "{cache}"
dist_dir = "{dist}"

[run]
concurrency = 2
timeout_secs = 60
{entries}
"#,
            cache = dir.join("cache").display(),
            dist = dir.join("dist").display(),
            entries = entries,
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    fn with_config(config: &Path) -> Command {
        let mut cmd = apidex();
        cmd.arg("--no-local").arg("--config").arg(config);
        cmd
    }

    #[test]
    fn help_displays() {
        apidex()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental package and image metadata indexer"));
    }

    #[test]
    fn version_displays() {
        apidex()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("apidex"));
    }

    #[test]
    fn run_empty_registry_publishes_manifest() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        with_config(&config)
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("Index published"));

        let manifest = temp.path().join("dist/site/manifest.json");
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manifest).unwrap()).unwrap();
        assert_eq!(parsed["header"]["total"], 0);
        assert!(temp.path().join("dist/journal.log").exists());
    }

    #[test]
    fn status_json_after_run() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        with_config(&config).arg("run").assert().success();

        with_config(&config)
            .args(["status", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"registry_entries\": 0"))
            .stdout(predicate::str::contains("run.committed"));
    }

    #[test]
    fn status_before_any_run() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        with_config(&config)
            .args(["status", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("entries 0"));
    }

    #[test]
    fn list_empty_json() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        with_config(&config)
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::diff("[]\n"));
    }

    #[test]
    fn duplicate_entries_rejected() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            r#"
[[entries]]
kind = "package"
locator = "requests"

[[entries]]
kind = "package"
locator = "requests"
"#,
        );

        with_config(&config)
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Duplicate entry"))
            .stderr(predicate::str::contains("Hint:"));
        assert!(!temp.path().join("dist").exists());
    }

    #[test]
    fn unknown_kind_rejected() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            r#"
[[entries]]
kind = "crate"
locator = "serde"
"#,
        );

        with_config(&config)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn missing_config_file() {
        let temp = TempDir::new().unwrap();

        with_config(&temp.path().join("absent.toml"))
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"));
    }

    #[test]
    fn invalidate_requires_target() {
        apidex().arg("invalidate").assert().failure();
    }

    #[test]
    fn invalidate_all_without_manifest() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        with_config(&config)
            .args(["invalidate", "--all", "--tag", "std"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No manifest to discard"));
    }

    #[test]
    fn invalidate_cache_needs_confirmation() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        with_config(&config)
            .args(["invalidate", "--cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache kept"));

        with_config(&config)
            .args(["invalidate", "--cache", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 cache entries"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        with_config(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("concurrency = 2"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fresh.toml");
        std::fs::write(&path, "").unwrap();

        with_config(&path)
            .args(["config", "init", "--force"])
            .assert()
            .success();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("timeout_secs = 14400"));
    }
}
