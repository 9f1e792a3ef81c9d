//! Parameter source and per-run configuration.
//!
//! A [`ParameterSet`] is the raw, user-supplied mapping read from a TOML
//! parameter file plus command-line overrides. Validation turns it into an
//! immutable [`RunConfiguration`]; per-run configurations are derived from the
//! base one with [`RunConfiguration::with`] and never mutate it.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Parameter names the orchestrator reads or binds.
pub mod keys {
    pub const BETA: &str = "BETA";
    pub const NDAT: &str = "NDAT";
    pub const DATA: &str = "DATA";
    pub const X_0: &str = "X_0";
    pub const DATA_IN_HDF5: &str = "DATA_IN_HDF5";
    pub const BASENAME: &str = "BASENAME";
    pub const MODEL_RUNS: &str = "MODEL_RUNS";
    pub const DEFAULT_MODEL: &str = "DEFAULT_MODEL";
    pub const TEXT_OUTPUT: &str = "TEXT_OUTPUT";
    pub const HELP_MODELS: &str = "help.models";
    pub const HELP_GRIDS: &str = "help.grids";

    /// Key naming the `index`-th candidate default model.
    pub fn run(index: usize) -> String {
        format!("RUN_{index}")
    }
}

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("failed to read parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse parameter file {origin}: {source}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("parameter {key} has unsupported {kind} value")]
    UnsupportedValue { key: String, kind: &'static str },
    #[error("malformed override '{0}', expected KEY=VALUE")]
    MalformedOverride(String),
}

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    fn from_toml(key: &str, value: &toml::Value) -> Result<Self, ParamError> {
        match value {
            toml::Value::Boolean(b) => Ok(Self::Bool(*b)),
            toml::Value::Integer(i) => Ok(Self::Int(*i)),
            toml::Value::Float(f) => Ok(Self::Float(*f)),
            toml::Value::String(s) => Ok(Self::Str(s.clone())),
            toml::Value::Datetime(d) => Ok(Self::Str(d.to_string())),
            toml::Value::Array(_) => Err(ParamError::UnsupportedValue {
                key: key.to_string(),
                kind: "array",
            }),
            toml::Value::Table(_) => Err(ParamError::UnsupportedValue {
                key: key.to_string(),
                kind: "table",
            }),
        }
    }

    /// Interprets a command-line value as a TOML scalar, falling back to a
    /// bare string (`DATA=in.dat` needs no quoting).
    pub fn parse_override(raw: &str) -> Self {
        let raw = raw.trim();
        match format!("v = {raw}").parse::<toml::Table>() {
            Ok(table) => match table.get("v").map(|v| Self::from_toml("v", v)) {
                Some(Ok(value)) => value,
                _ => Self::Str(raw.to_string()),
            },
            Err(_) => Self::Str(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            Self::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Renders the value for a `KEY = value` parameter file line.
    fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format!("{f:?}"),
            Self::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            other => f.write_str(&other.render()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Raw parameter source: everything the user supplied, nothing derived.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
    origin: Option<PathBuf>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ParamError> {
        let raw = fs::read_to_string(path).map_err(|source| ParamError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut set = Self::from_toml_str(&raw, &path.display().to_string())?;
        set.origin = Some(path.to_path_buf());
        Ok(set)
    }

    /// Parses TOML text. Nested tables are flattened into dotted keys so
    /// `help.models = true` is stored under `help.models`.
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self, ParamError> {
        let table: toml::Table = raw.parse().map_err(|source| ParamError::Toml {
            origin: origin.to_string(),
            source,
        })?;

        let mut values = BTreeMap::new();
        flatten_into(&mut values, None, &table)?;
        Ok(Self {
            values,
            origin: None,
        })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Applies a `KEY=VALUE` command-line override.
    pub fn apply_override(&mut self, raw: &str) -> Result<(), ParamError> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| ParamError::MalformedOverride(raw.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParamError::MalformedOverride(raw.to_string()));
        }
        self.values
            .insert(key.to_string(), ParamValue::parse_override(value));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// A missing or non-boolean flag reads as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(ParamValue::as_bool).unwrap_or(false)
    }

    /// String value of `key`; non-string scalars are rendered.
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub(crate) fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }
}

fn flatten_into(
    out: &mut BTreeMap<String, ParamValue>,
    prefix: Option<&str>,
    table: &toml::Table,
) -> Result<(), ParamError> {
    for (key, value) in table {
        let full = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            toml::Value::Table(inner) => flatten_into(out, Some(&full), inner)?,
            scalar => {
                let parsed = ParamValue::from_toml(&full, scalar)?;
                out.insert(full, parsed);
            }
        }
    }
    Ok(())
}

/// Immutable parameter mapping for one Solver invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunConfiguration {
    values: BTreeMap<String, ParamValue>,
}

impl RunConfiguration {
    pub fn from_values(values: BTreeMap<String, ParamValue>) -> Self {
        Self { values }
    }

    /// Returns a new configuration with `key` bound to `value`; `self` is left untouched.
    #[must_use]
    pub fn with(&self, key: &str, value: impl Into<ParamValue>) -> Self {
        let mut values = self.values.clone();
        values.insert(key.to_string(), value.into());
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn basename(&self) -> Option<&str> {
        self.get(keys::BASENAME).and_then(ParamValue::as_str)
    }

    pub fn default_model(&self) -> Option<&str> {
        self.get(keys::DEFAULT_MODEL).and_then(ParamValue::as_str)
    }

    /// Renders `KEY = value` lines. Dotted keys are skipped since the help
    /// switches are orchestrator-only.
    pub fn to_parameter_file(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            if key.contains('.') {
                continue;
            }
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&value.render());
            out.push('\n');
        }
        out
    }
}
