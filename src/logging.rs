//! Logging setup from layered YAML configuration
//!
//! Configuration documents live in a `conf/` directory and are textually
//! templated (`$PROJECT_DIR`, `$<KEY>`) before parsing, so one document can
//! serve multiple deployments. A shared `common_logging.yml` is merged under
//! each feature document, feature keys winning at the top level.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Conventional name of the shared configuration document.
pub const COMMON_CONFIG: &str = "common_logging.yml";

/// The substitution key injected with the selected stdout formatter name.
pub const STDOUT_FORMATTER_KEY: &str = "STDOUT_FORMATTER";

/// Message formatter for log output, a closed choice between a
/// human-readable and a structured rendering.
///
/// Each variant carries the literal template of the rendered line, exposed
/// through [`Formatter::template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Formatter {
    #[default]
    Verbose,
    Json,
}

impl Formatter {
    /// Template of a rendered log line for this formatter.
    pub const fn template(self) -> &'static str {
        match self {
            Formatter::Verbose => "{timestamp} - {target}({file}:{line}) - {level}: {message}",
            Formatter::Json => "{timestamp} {target} {file} {line} {level} {message}",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Formatter::Verbose => "VERBOSE",
            Formatter::Json => "JSON",
        }
    }

    /// All formatter names, in declaration order.
    pub fn all() -> Vec<&'static str> {
        vec![Formatter::Verbose.name(), Formatter::Json.name()]
    }
}

impl fmt::Display for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Formatter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VERBOSE" => Ok(Formatter::Verbose),
            "JSON" => Ok(Formatter::Json),
            other => Err(Error::InvalidConfig(format!("Unknown formatter: {other}"))),
        }
    }
}

/// Build a stdout subscriber with the chosen formatter without installing it,
/// so tests can scope it with `tracing::subscriber::with_default`.
pub fn subscriber_for(formatter: Formatter, filter: EnvFilter) -> Box<dyn Subscriber + Send + Sync> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    match formatter {
        Formatter::Json => Box::new(builder.json().finish()),
        Formatter::Verbose => Box::new(builder.finish()),
    }
}

/// Install a stdout subscriber with the chosen formatter as the process-wide
/// default, so every logging call site emits through it.
///
/// A subscriber can only be installed once per process; a second call fails
/// with [`Error::AlreadyInitialized`] rather than duplicating output. The
/// level filter comes from `RUST_LOG` when set, defaulting to `info`.
pub fn configure_logging_formatter(formatter: Formatter) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(subscriber_for(formatter, filter))
}

fn install(subscriber: Box<dyn Subscriber + Send + Sync>) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber).map_err(|_| Error::AlreadyInitialized)
}

/// Options for [`LogConfigLoader::init_logging`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Merge the shared [`COMMON_CONFIG`] document under the feature document.
    pub load_common_config: bool,
    /// Fallback stdout formatter; also injected into the substitutions under
    /// [`STDOUT_FORMATTER_KEY`] before any document is loaded.
    pub stdout_formatter: Formatter,
    /// `$<KEY>` replacements applied to document text, keys upper-cased.
    pub substitutions: HashMap<String, String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            load_common_config: true,
            stdout_formatter: Formatter::Verbose,
            substitutions: HashMap::new(),
        }
    }
}

/// Loads layered logging configuration documents relative to an explicit
/// project directory.
#[derive(Debug, Clone)]
pub struct LogConfigLoader {
    project_dir: PathBuf,
    conf_dir: PathBuf,
}

impl Default for LogConfigLoader {
    fn default() -> Self {
        Self::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")))
    }
}

impl LogConfigLoader {
    /// Loader rooted at `project_dir`, reading documents from its `conf/`
    /// subdirectory.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let conf_dir = project_dir.join("conf");
        Self {
            project_dir,
            conf_dir,
        }
    }

    /// Override the configuration directory.
    pub fn with_conf_dir(mut self, conf_dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = conf_dir.into();
        self
    }

    /// Read one configuration document, apply textual substitution and parse
    /// it as a YAML mapping.
    ///
    /// `$PROJECT_DIR` is replaced with the absolute project directory and
    /// `$<KEY>` (key upper-cased) with the corresponding substitution value.
    pub fn read_logging_config(
        &self,
        conf_filename: &str,
        substitutions: &HashMap<String, String>,
    ) -> Result<Mapping> {
        let path = self.conf_dir.join(conf_filename);
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound { path })
            }
            Err(err) => return Err(Error::Io(err)),
        };
        let substituted = self.substitute(&source, substitutions);
        let value: Value = serde_yaml::from_str(&substituted)?;
        match value {
            Value::Mapping(mapping) => Ok(mapping),
            other => Err(Error::InvalidConfig(format!(
                "Expected a mapping at the top level of {conf_filename}, got {}",
                yaml_kind(&other)
            ))),
        }
    }

    /// Load the merged configuration and install the resulting subscriber as
    /// the process-wide default.
    ///
    /// The stdout formatter is taken from the merged document's `stdout`
    /// handler when it names a known formatter, falling back to
    /// `options.stdout_formatter`.
    pub fn init_logging(&self, conf_filename: &str, options: InitOptions) -> Result<()> {
        let config = self.load_merged(conf_filename, &options)?;
        let formatter = config
            .stdout_formatter()
            .unwrap_or(options.stdout_formatter);
        install(subscriber_for(formatter, config.filter()?))
    }

    /// Load `conf_filename` shallow-merged over the common document and
    /// validate the result against the accepted configuration shape.
    pub fn load_merged(&self, conf_filename: &str, options: &InitOptions) -> Result<LoggingConfig> {
        let mut substitutions = options.substitutions.clone();
        substitutions.insert(
            STDOUT_FORMATTER_KEY.to_string(),
            options.stdout_formatter.name().to_lowercase(),
        );

        let mut merged = if options.load_common_config {
            self.read_logging_config(COMMON_CONFIG, &substitutions)?
        } else {
            Mapping::new()
        };
        let feature = self.read_logging_config(conf_filename, &substitutions)?;
        shallow_merge(&mut merged, feature);
        LoggingConfig::from_mapping(merged)
    }

    fn substitute(&self, source: &str, substitutions: &HashMap<String, String>) -> String {
        let mut text = source.replace("$PROJECT_DIR", &self.project_dir.display().to_string());
        // Longest token first, so a key that prefixes another ($ENV vs
        // $ENV_NAME) cannot clobber the longer one
        let mut tokens: Vec<(String, &String)> = substitutions
            .iter()
            .map(|(key, value)| (format!("${}", key.to_uppercase()), value))
            .collect();
        tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        for (token, value) in tokens {
            text = text.replace(&token, value);
        }
        text
    }
}

/// Merge `over` into `base` at the top level only; keys in `over` win.
fn shallow_merge(base: &mut Mapping, over: Mapping) {
    for (key, value) in over {
        base.insert(key, value);
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// The accepted shape of a merged logging configuration document.
///
/// Mirrors the conventional formatters/handlers/loggers/root sections; keys
/// outside these are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub formatters: BTreeMap<String, FormatterSpec>,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerSpec>,
    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerSpec>,
    #[serde(default)]
    pub root: Option<RootSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatterSpec {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandlerSpec {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub formatter: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerSpec {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub propagate: Option<bool>,
    #[serde(default)]
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootSpec {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub handlers: Vec<String>,
}

impl LoggingConfig {
    /// Validate a merged mapping against the accepted configuration shape.
    pub fn from_mapping(mapping: Mapping) -> Result<Self> {
        serde_yaml::from_value(Value::Mapping(mapping))
            .map_err(|err| Error::InvalidConfig(err.to_string()))
    }

    /// Level-filter directives derived from the document: the root level as
    /// the default, plus one `target=level` directive per named logger.
    pub fn filter_directives(&self) -> String {
        let root_level = self
            .root
            .as_ref()
            .and_then(|root| root.level.as_deref())
            .unwrap_or("info");
        let mut directives = vec![root_level.to_lowercase()];
        for (target, spec) in &self.loggers {
            if let Some(level) = &spec.level {
                directives.push(format!("{}={}", target, level.to_lowercase()));
            }
        }
        directives.join(",")
    }

    /// Build the level filter for this document.
    pub fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(self.filter_directives())
            .map_err(|err| Error::InvalidConfig(err.to_string()))
    }

    /// Formatter selected by the `stdout` handler, when it names a known one.
    pub fn stdout_formatter(&self) -> Option<Formatter> {
        self.handlers
            .get("stdout")
            .and_then(|handler| handler.formatter.as_deref())
            .and_then(|name| name.parse().ok())
    }
}
