//! Canonical form state for a configuration session
//!
//! One value per (container, field) pair the schema declares, no more and
//! no less. Controls never own state; they read from here and every edit
//! produces the next state through [`FormState::apply_edit`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::ConsoleError;
use crate::models::deployment::Parameters;
use crate::models::schema::{AppSchema, FieldValue};

/// Current value of every field the schema declares
///
/// Serializes transparently as the parameters map, so the state is also the
/// exact payload persisted and deployed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormState {
    values: Parameters,
}

impl FormState {
    /// Build the initial state for a schema.
    ///
    /// A persisted value wins field-by-field when it is non-empty and
    /// representable under the field's declared type; everything else takes
    /// the schema fallback. Persisted entries for fields the schema no
    /// longer declares are dropped.
    pub fn init(schema: &AppSchema, persisted: Option<&Parameters>) -> Self {
        let mut values = Parameters::new();

        for container in &schema.containers {
            let mut cells = BTreeMap::new();
            for field in &container.env_vars {
                let recovered = persisted
                    .and_then(|p| p.get(&container.name))
                    .and_then(|c| c.get(&field.name))
                    .filter(|v| !v.is_empty_text() && field.accepts(v));

                let value = match recovered {
                    Some(v) => v.clone(),
                    None => field.fallback_value(),
                };
                cells.insert(field.name.clone(), value);
            }
            values.insert(container.name.clone(), cells);
        }

        Self { values }
    }

    /// Produce the next state with exactly one cell replaced.
    ///
    /// Values the schema cannot represent are rejected: unknown (container,
    /// field) pairs, toggles for text fields and vice versa, and selections
    /// outside an enum's declared values. An empty string is a legal text
    /// value. Applying the same edit twice yields an equal state.
    pub fn apply_edit(
        &self,
        schema: &AppSchema,
        container: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<Self, ConsoleError> {
        let declared = schema.field(container, field).ok_or_else(|| {
            ConsoleError::ValidationError(format!("unknown field {}.{}", container, field))
        })?;

        if !declared.accepts(&value) {
            return Err(ConsoleError::ValidationError(format!(
                "value {:?} is not representable as {} for {}.{}",
                value.to_string(),
                declared.kind.as_tag(),
                container,
                field
            )));
        }

        let mut next = self.clone();
        next.values
            .entry(container.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(next)
    }

    /// Current value of one cell
    pub fn get(&self, container: &str, field: &str) -> Option<&FieldValue> {
        self.values.get(container).and_then(|c| c.get(field))
    }

    /// The parameters map this state stands for
    pub fn parameters(&self) -> &Parameters {
        &self.values
    }

    /// Number of cells held
    pub fn len(&self) -> usize {
        self.values.values().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|c| c.is_empty())
    }
}
