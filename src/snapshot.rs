use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MODEL_NAME: &str = "default-model";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: i64 = 1000;

pub const TEMPERATURE_KEY: &str = "temperature";
pub const MAX_TOKENS_KEY: &str = "maxTokens";

/// Error returned by the typed parameter accessors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("parameter '{0}' is not set")]
    Missing(String),

    #[error("expected a {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0} does not fit in a 64-bit integer")]
    OutOfRange(f64),
}

/// A dynamically typed model parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Name of the variant, used in mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    /// Numeric value as a float. Integers are widened.
    pub fn as_f64(&self) -> Result<f64, ParamError> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Integer(v) => Ok(*v as f64),
            other => Err(other.mismatch("number")),
        }
    }

    /// Numeric value as an integer. Floats are accepted only when they have no fractional part
    /// and lie inside the i64 range.
    pub fn as_i64(&self) -> Result<i64, ParamError> {
        match self {
            Self::Integer(v) => Ok(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                // i64::MAX rounds up to 2^63 as a float, so the upper bound is exclusive
                if *v >= i64::MIN as f64 && *v < i64::MAX as f64 {
                    Ok(*v as i64)
                } else {
                    Err(ParamError::OutOfRange(*v))
                }
            }
            other => Err(other.mismatch("integer")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> ParamError {
        ParamError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Author of a prompt template message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt template message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One complete configuration as returned by the provider.
///
/// Snapshots are never edited once built; the cache replaces the whole value.
/// The `with_*` methods consume the snapshot and are meant for construction only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    model_name: String,
    parameters: BTreeMap<String, ParamValue>,
    messages: Vec<Message>,
    enabled: bool,
}

impl ConfigSnapshot {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            parameters: BTreeMap::new(),
            messages: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, ParamValue>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    pub fn param_f64(&self, key: &str) -> Result<f64, ParamError> {
        self.required(key)?.as_f64()
    }

    pub fn param_i64(&self, key: &str) -> Result<i64, ParamError> {
        self.required(key)?.as_i64()
    }

    pub fn temperature(&self) -> Result<f64, ParamError> {
        self.param_f64(TEMPERATURE_KEY)
    }

    pub fn max_tokens(&self) -> Result<i64, ParamError> {
        self.param_i64(MAX_TOKENS_KEY)
    }

    fn required(&self, key: &str) -> Result<&ParamValue, ParamError> {
        self.param(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))
    }
}

impl Default for ConfigSnapshot {
    /// The snapshot served before the first successful fetch
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME)
            .with_param(TEMPERATURE_KEY, DEFAULT_TEMPERATURE)
            .with_param(MAX_TOKENS_KEY, DEFAULT_MAX_TOKENS)
    }
}
