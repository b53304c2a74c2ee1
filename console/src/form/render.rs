//! Field-to-control dispatch for the configuration form
//!
//! Dispatch is closed over the declared field types. A field whose type this
//! client does not recognize renders nothing; the rest of the form is not
//! affected.

use tracing::debug;

use crate::form::state::FormState;
use crate::models::schema::{AppSchema, Container, Field, FieldKind, FieldValue};

/// What the hosting view should draw for one field
///
/// The variant also fixes the edit payload: text inputs and selectors feed
/// string edits, toggles feed booleans.
#[derive(Debug, Clone, PartialEq)]
pub enum InputControl {
    /// Free-form text input, edited on every keystroke
    Text { value: String },
    /// On/off toggle
    Toggle { on: bool },
    /// Closed selector offering exactly the declared values, in declared order
    Select {
        options: Vec<String>,
        selected: String,
    },
}

/// One renderable form row
#[derive(Debug, Clone, PartialEq)]
pub struct FormControl {
    pub container: String,
    pub field: String,
    pub hint: Option<String>,
    pub control: InputControl,
}

/// Dispatch one field to its control, reading the current value from state
pub fn control_for(container: &Container, field: &Field, state: &FormState) -> Option<InputControl> {
    let value = current_value(state, &container.name, field);

    match &field.kind {
        FieldKind::Text => Some(InputControl::Text {
            value: value.to_string(),
        }),
        FieldKind::Boolean => Some(InputControl::Toggle {
            on: value.as_toggle().unwrap_or(false),
        }),
        FieldKind::Enum => Some(InputControl::Select {
            options: field.values.clone(),
            selected: value.to_string(),
        }),
        FieldKind::Unknown(tag) => {
            debug!(
                "no control for {}.{}: unrecognized type {:?}",
                container.name, field.name, tag
            );
            None
        }
    }
}

/// Walk the schema in declared order, skipping fields that render nothing
pub fn form_controls(schema: &AppSchema, state: &FormState) -> Vec<FormControl> {
    let mut controls = Vec::new();

    for container in &schema.containers {
        for field in &container.env_vars {
            if let Some(control) = control_for(container, field, state) {
                controls.push(FormControl {
                    container: container.name.clone(),
                    field: field.name.clone(),
                    hint: field.hint.clone(),
                    control,
                });
            }
        }
    }

    controls
}

/// The state's value for the field when it is representable, else the
/// schema fallback. Keeps a control drawable even against a state built
/// from an older schema.
fn current_value(state: &FormState, container: &str, field: &Field) -> FieldValue {
    match state.get(container, &field.name) {
        Some(value) if field.accepts(value) => value.clone(),
        _ => field.fallback_value(),
    }
}
