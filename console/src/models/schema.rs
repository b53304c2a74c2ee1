//! Application configuration schema models
//!
//! The records service describes each application version as a list of
//! containers, each with typed environment variables. The schema is the
//! single source of truth for what the configuration form shows and what
//! the deploy parameters may contain.

use serde::{Deserialize, Serialize};

/// Declared input type of a configuration field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Free-form text
    Text,
    /// On/off toggle
    Boolean,
    /// Closed choice from the field's `values`
    Enum,
    /// A type tag this client does not recognize; preserved verbatim
    Unknown(String),
}

impl FieldKind {
    pub fn as_tag(&self) -> &str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Boolean => "boolean",
            FieldKind::Enum => "enum",
            FieldKind::Unknown(tag) => tag,
        }
    }
}

impl From<&str> for FieldKind {
    fn from(tag: &str) -> Self {
        match tag {
            "text" => FieldKind::Text,
            "boolean" => FieldKind::Boolean,
            "enum" => FieldKind::Enum,
            other => FieldKind::Unknown(other.to_string()),
        }
    }
}

impl serde::Serialize for FieldKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> serde::Deserialize<'de> for FieldKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(FieldKind::from(s.as_str()))
    }
}

/// A single configuration value, text or toggle
///
/// Untagged on the wire: booleans stay JSON booleans, everything else is a
/// string. Enum selections are carried as their string value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Toggle(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Toggle(_) => None,
        }
    }

    pub fn as_toggle(&self) -> Option<bool> {
        match self {
            FieldValue::Toggle(on) => Some(*on),
            FieldValue::Text(_) => None,
        }
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.is_empty())
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Toggle(on) => write!(f, "{}", on),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(on: bool) -> Self {
        FieldValue::Toggle(on)
    }
}

/// One named, typed environment variable in a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Environment variable name
    pub name: String,

    /// Input type; drives which control the form renders
    #[serde(rename = "type")]
    pub kind: FieldKind,

    /// Declared default, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,

    /// Short help text shown next to the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Legal options for `enum` fields, in display order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl Field {
    /// Whether `value` is representable under this field's declared type
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (&self.kind, value) {
            (FieldKind::Text, FieldValue::Text(_)) => true,
            (FieldKind::Boolean, FieldValue::Toggle(_)) => true,
            (FieldKind::Enum, FieldValue::Text(s)) => self.values.iter().any(|v| v == s),
            _ => false,
        }
    }

    /// Initial value when nothing usable was persisted: the declared default
    /// if representable, else the type's empty value.
    pub fn fallback_value(&self) -> FieldValue {
        if let Some(default) = &self.default {
            if self.accepts(default) {
                return default.clone();
            }
        }
        match &self.kind {
            FieldKind::Boolean => FieldValue::Toggle(false),
            FieldKind::Enum => FieldValue::Text(self.values.first().cloned().unwrap_or_default()),
            _ => FieldValue::Text(String::new()),
        }
    }
}

/// One deployable container and its configurable environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,

    /// May legitimately be absent for containers with nothing to configure
    #[serde(default)]
    pub env_vars: Vec<Field>,
}

/// Configuration schema for one application version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSchema {
    pub application_name: String,
    pub version: String,
    pub containers: Vec<Container>,
}

impl AppSchema {
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn field(&self, container: &str, field: &str) -> Option<&Field> {
        self.container(container)
            .and_then(|c| c.env_vars.iter().find(|f| f.name == field))
    }

    /// Advisory consistency findings. Callers log these; a schema with
    /// findings still renders and deploys.
    pub fn validate(&self) -> Vec<String> {
        let mut findings = Vec::new();
        let mut seen_containers = std::collections::BTreeSet::new();

        for container in &self.containers {
            if !seen_containers.insert(container.name.as_str()) {
                findings.push(format!("duplicate container name: {}", container.name));
            }

            let mut seen_fields = std::collections::BTreeSet::new();
            for field in &container.env_vars {
                if !seen_fields.insert(field.name.as_str()) {
                    findings.push(format!(
                        "duplicate field name: {}.{}",
                        container.name, field.name
                    ));
                }

                if field.kind == FieldKind::Enum && field.values.is_empty() {
                    findings.push(format!(
                        "enum field {}.{} declares no values",
                        container.name, field.name
                    ));
                }

                if let FieldKind::Unknown(tag) = &field.kind {
                    findings.push(format!(
                        "field {}.{} has unrecognized type {:?}",
                        container.name, field.name, tag
                    ));
                }

                if let Some(default) = &field.default {
                    if !field.accepts(default) {
                        findings.push(format!(
                            "default for {}.{} is not representable as {}",
                            container.name,
                            field.name,
                            field.kind.as_tag()
                        ));
                    }
                }
            }
        }

        findings
    }
}
