//! Integration tests for layercache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's configuration
    fn layercache(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("layercache");
        cmd.env("LAYERCACHE_CONFIG", config_dir.path().join("config.toml"));
        cmd.env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Filesystem caches persisted as OCI images"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("layercache"));
    }

    #[test]
    fn config_path_honors_env() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                temp.path().join("config.toml").display().to_string(),
            ));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[storage]"))
            .stdout(predicate::str::contains("namespace = \"default\""));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(temp.path().join("config.toml").exists());

        layercache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[cache\n").unwrap();
        layercache(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn mount_requires_cache_name_or_image() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .arg("mount")
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "neither cache name nor image specified",
            ));
    }

    #[test]
    fn mount_rejects_relative_dir() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .args(["mount", "--cache-name", "npm", "--dir", "relative/npm"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid request"))
            .stderr(predicate::str::contains("non-absolute mount path"));
    }

    #[test]
    fn unmount_requires_container_or_dir() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .args(["unmount", "--cache-name", "npm"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "neither container name nor mount path provided",
            ));
    }

    #[test]
    fn completions_generate() {
        let temp = TempDir::new().unwrap();
        layercache(&temp)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("layercache"));
    }
}
