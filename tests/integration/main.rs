//! Integration tests for outsync

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Project directory with an isolated global config location
struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        Self { dir }
    }

    fn with_config(config: &str) -> Self {
        let project = Self::new();
        project.write("outsync.toml", config);
        project
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str, contents: &str) {
        fs::write(self.path().join(relative), contents).unwrap();
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path().join(relative)).unwrap()
    }
}

mod cli_tests {
    use super::Project;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn outsync(project: &Project) -> Command {
        let mut cmd = cargo_bin_cmd!("outsync");
        cmd.current_dir(project.path())
            .env("OUTSYNC_CONFIG", project.path().join("global.toml"))
            .env("CI", "1");
        cmd
    }

    #[test]
    fn help_displays() {
        outsync(&Project::new())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental build-output cache"));
    }

    #[test]
    fn version_displays() {
        outsync(&Project::new())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("outsync"));
    }

    #[test]
    fn config_path_honors_env() {
        outsync(&Project::new())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("global.toml"));
    }

    #[test]
    fn config_show() {
        outsync(&Project::new())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[build]"));
    }

    #[test]
    fn config_set_local_then_show() {
        let project = Project::new();

        outsync(&project)
            .args(["config", "set", "build.link_mode", "copy", "--local"])
            .assert()
            .success();

        assert!(project.read("outsync.toml").contains("link_mode = \"copy\""));
        outsync(&project)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("link_mode = \"copy\""));
    }

    #[test]
    fn config_set_global_writes_config_file() {
        let project = Project::new();

        outsync(&project)
            .args(["config", "set", "build.prune_stale", "false"])
            .assert()
            .success();

        assert!(project.read("global.toml").contains("prune_stale = false"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        outsync(&Project::new())
            .args(["config", "set", "compiler.output.path", "/tmp/out"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown configuration key"));
    }

    #[test]
    fn build_without_input_fails() {
        outsync(&Project::new())
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Expected exactly one input directory"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_rejects_reserved_option() {
        let project = Project::with_config(
            r#"
            [build]
            input = "src"

            [compiler]
            program = "true"

            [compiler.output]
            path = "elsewhere"
            "#,
        );

        outsync(&project)
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("`output.path`"));
        assert!(!project.path().join("dist").exists());
    }

    #[test]
    fn verify_without_record_fails() {
        outsync(&Project::new())
            .arg("verify")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Build record not found"));
    }

    #[cfg(unix)]
    mod unix {
        use super::{outsync, Project};
        use predicates::prelude::*;
        use std::fs;

        const EMITTING: &str = r#"
            [build]
            input = "src"

            [compiler]
            program = "sh"
            args = ["-c", '''mkdir -p "$OUTSYNC_OUTPUT_DIR/js" && printf app > "$OUTSYNC_OUTPUT_DIR/js/app.js" && echo "warning: large bundle"''']
        "#;

        #[test]
        fn build_links_artifacts_and_verifies() {
            let project = Project::with_config(EMITTING);

            outsync(&project)
                .arg("build")
                .assert()
                .success()
                .stdout(predicate::str::contains("1 artifacts, 1 changed, 1 written"))
                .stdout(predicate::str::contains("1 compiler warning(s)"));

            let output = project.path().join("dist/js/app.js");
            let meta = fs::symlink_metadata(&output).unwrap();
            assert!(meta.file_type().is_symlink());
            assert_eq!(project.read("dist/js/app.js"), "app");
            assert_eq!(project.read(".outsync/cache/js/app.js"), "app");

            outsync(&project)
                .arg("verify")
                .assert()
                .success()
                .stdout(predicate::str::contains("Output matches the build record"));

            fs::remove_file(&output).unwrap();
            fs::write(&output, "tampered").unwrap();

            outsync(&project)
                .arg("verify")
                .assert()
                .failure()
                .stdout(predicate::str::contains("Modified"))
                .stderr(predicate::str::contains("do not match the build record"));
        }

        #[test]
        fn build_copy_flag_copies() {
            let project = Project::with_config(EMITTING);

            outsync(&project)
                .args(["build", "--copy", "--output", "public"])
                .assert()
                .success()
                .stdout(predicate::str::contains("1 copied"));

            let meta = fs::symlink_metadata(project.path().join("public/js/app.js")).unwrap();
            assert!(!meta.file_type().is_symlink());
            assert_eq!(project.read("public/js/app.js"), "app");
        }

        #[test]
        fn compile_errors_fail_build() {
            let project = Project::with_config(
                r#"
                [build]
                input = "src"

                [compiler]
                program = "sh"
                args = ["-c", "echo 'error: cannot resolve ./missing' >&2; exit 1"]
                "#,
            );

            outsync(&project)
                .arg("build")
                .assert()
                .failure()
                .stderr(predicate::str::contains("cannot resolve ./missing"));
            assert!(!project.path().join(".outsync/build-record.json").exists());
        }

        #[test]
        fn watch_runs_limited_cycles() {
            let project = Project::with_config(EMITTING);

            outsync(&project)
                .args(["watch", "--cycles", "2", "--interval-ms", "10"])
                .assert()
                .success()
                .stdout(predicate::str::contains("0 changed, 0 written"))
                .stdout(predicate::str::contains("2 cycle(s), 0 failed"));
        }
    }
}

#[cfg(unix)]
mod driver_tests {
    use super::Project;
    use outsync::compiler::CommandCompilerFactory;
    use outsync::config::CompilerOptions;
    use outsync::driver::{BuildDriver, DriverSettings};

    const COUNTING: &str = r#"n=$(cat count 2>/dev/null || echo 0); n=$((n+1)); echo $n > count; printf static > "$OUTSYNC_OUTPUT_DIR/static.js"; printf "$n" > "$OUTSYNC_OUTPUT_DIR/counter.js""#;

    fn driver(project: &Project, script: &str) -> BuildDriver {
        let options = CompilerOptions {
            program: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        };
        BuildDriver::new(
            vec![project.path().join("src")],
            DriverSettings::new(project.path().join("cache"), project.path().join("dist")),
            options,
            CommandCompilerFactory::new(project.path().join("work")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rewritten_but_identical_artifacts_are_not_rewritten() {
        let project = Project::new();
        let mut driver = driver(&project, COUNTING);

        let first = driver.build().await.unwrap();
        assert_eq!(first.written, 2);

        let second = driver.build().await.unwrap();
        let changed: Vec<&str> = second.changed.iter().map(String::as_str).collect();
        assert_eq!(changed, vec!["counter.js"]);
        assert_eq!(second.written, 1);
        assert_eq!(project.read("dist/counter.js"), "2");
        assert_eq!(project.read("dist/static.js"), "static");
    }

    #[tokio::test]
    async fn missing_input_keeps_previous_snapshot() {
        let project = Project::new();
        let mut driver = driver(&project, COUNTING);

        driver.build().await.unwrap();
        std::fs::rename(project.path().join("src"), project.path().join("moved")).unwrap();

        let err = driver.build().await.unwrap_err();
        assert!(err.to_string().contains("input directory not found"));
        assert_eq!(driver.previous_snapshot().unwrap().get("counter.js"), Some(&b"1"[..]));

        std::fs::rename(project.path().join("moved"), project.path().join("src")).unwrap();
        let report = driver.build().await.unwrap();
        let changed: Vec<&str> = report.changed.iter().map(String::as_str).collect();
        assert_eq!(changed, vec!["counter.js"]);
    }
}
