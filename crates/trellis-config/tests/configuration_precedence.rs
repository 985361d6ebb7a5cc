//! Layering tests for configuration files and command-line overrides.

use std::ffi::OsString;
use std::fs;

use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use trellis_config::{Config, LogFormat, default_log_filter};

struct Harness {
    temp_dir: TempDir,
    args: Vec<OsString>,
}

impl Harness {
    fn write_config(&mut self, contents: &str) {
        let path = self.temp_dir.path().join("trellis.toml");
        if let Err(error) = fs::write(&path, contents) {
            panic!("failed to write configuration: {error}");
        }
        self.args.push(OsString::from("--config-path"));
        self.args.push(path.into_os_string());
    }

    fn push_arg(&mut self, arg: &str) {
        self.args.push(OsString::from(arg));
    }

    fn load(&self) -> Config {
        match Config::load_from_iter(self.args.clone()) {
            Ok(config) => config,
            Err(error) => panic!("configuration failed to load: {error}"),
        }
    }
}

#[fixture]
fn harness() -> Harness {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(error) => panic!("failed to create temporary directory: {error}"),
    };
    Harness {
        temp_dir,
        args: vec![OsString::from("trellis")],
    }
}

#[rstest]
fn loads_built_in_defaults(harness: Harness) {
    let config = harness.load();
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), LogFormat::Json);
    assert!(!config.verbose_diagnostics());
    assert_eq!(config.excluded_fields(), vec!["active", "_state"]);
}

#[rstest]
fn configuration_file_overrides_defaults(mut harness: Harness) {
    harness.write_config(
        "log_filter = \"debug\"\n\
         log_format = \"compact\"\n\
         verbose_diagnostics = true\n\
         excluded_fields = [\"secret\"]\n",
    );

    let config = harness.load();
    assert_eq!(config.log_filter(), "debug");
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert!(config.verbose_diagnostics());
    assert_eq!(config.excluded_fields(), vec!["secret"]);
}

#[rstest]
fn command_line_overrides_configuration_file(mut harness: Harness) {
    harness.write_config("log_filter = \"debug\"\n");
    harness.push_arg("--log-filter");
    harness.push_arg("trellis=trace");

    let config = harness.load();
    assert_eq!(config.log_filter(), "trellis=trace");
}
