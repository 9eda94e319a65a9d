//! Per-state extraction of turn input into named context fields.

use serde::{Deserialize, Serialize};

use ember_core::SessionContext;

/// A menu token and the value it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub token: String,
    pub value: String,
}

impl ChoiceOption {
    pub fn new(token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            value: value.into(),
        }
    }
}

/// How a state records its input in the session context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldCapture {
    /// Map a recognised menu token to a named value. Other input is ignored.
    Choice {
        field: String,
        options: Vec<ChoiceOption>,
    },
    /// Store the raw input.
    Verbatim { field: String },
}

impl FieldCapture {
    /// Build a `Choice` capture numbering `values` from "1".
    pub fn numbered(field: impl Into<String>, values: &[&str]) -> Self {
        FieldCapture::Choice {
            field: field.into(),
            options: values
                .iter()
                .enumerate()
                .map(|(i, value)| ChoiceOption::new((i + 1).to_string(), *value))
                .collect(),
        }
    }

    pub fn verbatim(field: impl Into<String>) -> Self {
        FieldCapture::Verbatim {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldCapture::Choice { field, .. } | FieldCapture::Verbatim { field } => field,
        }
    }

    /// Write the captured value into `context`. Returns whether a field was set.
    pub fn apply(&self, input: &str, context: &mut SessionContext) -> bool {
        match self {
            FieldCapture::Choice { field, options } => {
                match options.iter().find(|opt| opt.token == input) {
                    Some(opt) => {
                        context.insert(field.as_str(), opt.value.as_str());
                        true
                    }
                    None => false,
                }
            }
            FieldCapture::Verbatim { field } => {
                context.insert(field.as_str(), input);
                true
            }
        }
    }
}
