use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("unknown contract status '{0}'")]
    UnknownStatus(String),
    #[error("contract record is missing its id")]
    MissingId,
    #[error("malformed contract record: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature image is required")]
    EmptyImage,
    #[error("signature image must be a data url or an http(s) url")]
    UnsupportedImage,
}

/// Field-level validation failures keyed by the form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("{}", describe(.0))]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn describe(fields: &BTreeMap<&'static str, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_display_in_field_order_and_keep_first_message() {
        let mut errors = FieldErrors::new();
        errors.insert("terms", "terms are required");
        errors.insert("monthlyRent", "monthly rent must be positive");
        errors.insert("terms", "ignored");

        assert_eq!(
            errors.to_string(),
            "monthlyRent: monthly rent must be positive; terms: terms are required"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(errors);
        assert!(boxed.source().is_none());
    }
}
