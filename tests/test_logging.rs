use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use groundwork::error::Error;
use groundwork::logging::{configure_logging_formatter, Formatter, InitOptions, LogConfigLoader};
use serde_yaml::Value;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for BufferWriter {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

const COMMON: &str = "\
version: 1
handlers:
  stdout:
    class: stream
    formatter: $STDOUT_FORMATTER
root:
  level: INFO
  handlers: [stdout]
";

/// Project directory with a `conf/` subdirectory holding the given documents.
fn project_with_conf(documents: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let project = TempDir::new().unwrap();
    let conf = project.path().join("conf");
    fs::create_dir(&conf).unwrap();
    for (name, contents) in documents {
        fs::write(conf.join(name), contents).unwrap();
    }
    let root = project.path().to_path_buf();
    (project, root)
}

fn loader_for(root: &Path) -> LogConfigLoader {
    LogConfigLoader::new(root)
}

#[test]
fn test_formatter_names_in_declaration_order() {
    assert_eq!(Formatter::all(), vec!["VERBOSE", "JSON"]);
}

#[test]
fn test_formatter_templates() {
    assert!(Formatter::Verbose.template().contains("{message}"));
    assert!(Formatter::Json.template().contains("{message}"));
    assert_ne!(Formatter::Verbose.template(), Formatter::Json.template());
}

#[test]
fn test_read_config_substitutes_tokens() {
    let (_guard, root) = project_with_conf(&[(
        "feature_logging.yml",
        "log_dir: $PROJECT_DIR/logs\nregion: $REGION\n",
    )]);
    let mut substitutions = HashMap::new();
    substitutions.insert("region".to_string(), "eu-west-1".to_string());

    let mapping = loader_for(&root)
        .read_logging_config("feature_logging.yml", &substitutions)
        .unwrap();
    let value = Value::Mapping(mapping);
    assert_eq!(value["log_dir"], format!("{}/logs", root.display()));
    assert_eq!(value["region"], "eu-west-1");
}

#[test]
fn test_read_config_missing_file() {
    let (_guard, root) = project_with_conf(&[]);
    let err = loader_for(&root)
        .read_logging_config("absent_logging.yml", &HashMap::new())
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_read_config_invalid_yaml() {
    let (_guard, root) = project_with_conf(&[("broken_logging.yml", "handlers: [unclosed\n")]);
    let err = loader_for(&root)
        .read_logging_config("broken_logging.yml", &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::ConfigParse(_)));
}

#[test]
fn test_read_config_rejects_non_mapping_document() {
    let (_guard, root) = project_with_conf(&[("scalar_logging.yml", "just a string\n")]);
    let err = loader_for(&root)
        .read_logging_config("scalar_logging.yml", &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_load_merged_feature_wins_at_top_level() {
    let (_guard, root) = project_with_conf(&[
        ("common_logging.yml", COMMON),
        (
            "feature_logging.yml",
            "root: {level: WARN}\nloggers:\n  my_service: {level: DEBUG}\n",
        ),
    ]);
    let config = loader_for(&root)
        .load_merged("feature_logging.yml", &InitOptions::default())
        .unwrap();

    // Feature document replaced the root section wholesale
    assert_eq!(config.root.as_ref().unwrap().level.as_deref(), Some("WARN"));
    // Sections only present in the common document survive
    assert!(config.handlers.contains_key("stdout"));
    assert_eq!(config.filter_directives(), "warn,my_service=debug");
}

#[test]
fn test_load_merged_injects_stdout_formatter() {
    let (_guard, root) = project_with_conf(&[
        ("common_logging.yml", COMMON),
        ("feature_logging.yml", "loggers: {}\n"),
    ]);
    let options = InitOptions {
        stdout_formatter: Formatter::Json,
        ..InitOptions::default()
    };
    let config = loader_for(&root)
        .load_merged("feature_logging.yml", &options)
        .unwrap();
    assert_eq!(config.stdout_formatter(), Some(Formatter::Json));
}

#[test]
fn test_load_merged_without_common_config() {
    let (_guard, root) = project_with_conf(&[(
        "feature_logging.yml",
        "root: {level: ERROR}\n",
    )]);
    let options = InitOptions {
        load_common_config: false,
        ..InitOptions::default()
    };
    let config = loader_for(&root)
        .load_merged("feature_logging.yml", &options)
        .unwrap();
    assert!(config.handlers.is_empty());
    assert_eq!(config.filter_directives(), "error");
}

#[test]
fn test_load_merged_rejects_invalid_shape() {
    let (_guard, root) = project_with_conf(&[
        ("common_logging.yml", COMMON),
        ("feature_logging.yml", "loggers: 5\n"),
    ]);
    let err = loader_for(&root)
        .load_merged("feature_logging.yml", &InitOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn test_init_logging_from_shipped_conf() {
    // Uses the documents shipped with this crate under conf/
    let loader = LogConfigLoader::default();
    let config = loader
        .load_merged("example_logging.yml", &InitOptions::default())
        .unwrap();
    assert_eq!(config.stdout_formatter(), Some(Formatter::Verbose));
    assert_eq!(config.filter_directives(), "info,groundwork=debug");
}

#[test]
fn test_json_formatter_output_is_machine_parseable() {
    let writer = BufferWriter::default();
    let buffer = writer.0.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(code = 7, "boom happened");
    });

    let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    let line = output.lines().next().unwrap();
    let value: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(value["level"], "ERROR");
    assert!(value["fields"]["message"]
        .as_str()
        .unwrap()
        .contains("boom"));
    assert_eq!(value["fields"]["code"], 7);
}

#[test]
fn test_configure_formatter_installs_once() {
    configure_logging_formatter(Formatter::Verbose).unwrap();
    let err = configure_logging_formatter(Formatter::Json).unwrap_err();
    assert!(matches!(err, Error::AlreadyInitialized));
}
