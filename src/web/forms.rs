//! Per-field error messages for re-rendered forms.

use std::collections::HashMap;
use validator::{ValidationError, ValidationErrors};

#[derive(Debug, Clone, Default)]
pub struct FormErrors(HashMap<String, String>);

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let param = |name: &str| error.params.get(name).map(|v| v.to_string());
    match error.code.as_ref() {
        "length" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("Field must be between {min} and {max} characters long."),
            (Some(min), None) => format!("Field must be at least {min} characters long."),
            (None, Some(max)) => format!("Field cannot be longer than {max} characters."),
            (None, None) => "Invalid length.".to_string(),
        },
        "email" => "Invalid email address.".to_string(),
        "must_match" => "Fields must match.".to_string(),
        _ => "Invalid value.".to_string(),
    }
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&ValidationErrors> for FormErrors {
    fn from(errors: &ValidationErrors) -> Self {
        let mut out = Self::new();
        for (field, list) in errors.field_errors() {
            if let Some(first) = list.first() {
                out.insert(field, describe(first));
            }
        }
        out
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        Self::from(&errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct Sample {
        #[validate(length(min = 2, max = 5))]
        name: String,
        #[validate(email)]
        email: String,
        #[validate(length(min = 8, message = "Too short"))]
        password: String,
    }

    #[test]
    fn test_messages_from_validator() {
        let sample = Sample {
            name: "x".into(),
            email: "nope".into(),
            password: "short".into(),
        };
        let errors = FormErrors::from(sample.validate().expect_err("invalid"));
        assert_eq!(
            errors.get("name"),
            Some("Field must be between 2 and 5 characters long.")
        );
        assert_eq!(errors.get("email"), Some("Invalid email address."));
        assert_eq!(errors.get("password"), Some("Too short"));
        assert!(errors.get("other").is_none());
    }

    #[test]
    fn test_first_message_wins() {
        let mut errors = FormErrors::new();
        errors.insert("title", "first");
        errors.insert("title", "second");
        assert_eq!(errors.get("title"), Some("first"));
        assert!(!errors.is_empty());
    }
}
