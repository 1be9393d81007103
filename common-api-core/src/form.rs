//! Forms that report their errors as structured data.
//!
//! Field errors travel inside the envelope as
//! `{"field": [{"message": "...", "code": "..."}]}`.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::validators::{ValidationError, Validator};

/// Field name to structured error description.
pub type FieldErrors = Map<String, Value>;

/// Anything that can report field errors after validation.
pub trait ValidatedForm {
    fn field_errors(&self) -> FieldErrors;
}

impl ValidatedForm for FieldErrors {
    fn field_errors(&self) -> FieldErrors {
        self.clone()
    }
}

/// A declared form field.
#[derive(Clone)]
pub struct FormField {
    name: String,
    required: bool,
    validators: Vec<Arc<dyn Validator>>,
}

impl fmt::Debug for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormField")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl FormField {
    /// Optional field without validators.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            validators: Vec::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// A form over a JSON object.
///
/// # Example
///
/// ```rust
/// use common_api_core::{FormField, JsonForm, UsernameValidator, ValidatedForm};
///
/// let mut form = JsonForm::new()
///     .field(FormField::new("username").required(true).validator(UsernameValidator))
///     .field(FormField::new("bio"));
///
/// let data = serde_json::json!({"username": "_x"});
/// assert!(!form.validate(data.as_object().unwrap()));
/// assert!(form.field_errors().contains_key("username"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct JsonForm {
    fields: Vec<FormField>,
    errors: FieldErrors,
    cleaned: Map<String, Value>,
}

impl JsonForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. A field with the same name is replaced.
    pub fn field(mut self, field: FormField) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Mark the named fields as required. Unknown names are ignored.
    pub fn make_fields_required(&mut self, names: &[&str]) -> &mut Self {
        self.set_required(names, true)
    }

    /// Set the `required` flag on the named fields.
    pub fn set_required(&mut self, names: &[&str], required: bool) -> &mut Self {
        for field in self.fields.iter_mut() {
            if names.contains(&field.name.as_str()) {
                field.required = required;
            }
        }
        self
    }

    /// Validate `data`, replacing any previous errors. Returns `true` when valid.
    ///
    /// Missing, `null` and empty-string values fail `required` fields.
    /// Validators only run on string values; other JSON types are passed
    /// through unchecked.
    pub fn validate(&mut self, data: &Map<String, Value>) -> bool {
        self.errors.clear();
        self.cleaned.clear();

        for field in &self.fields {
            let value = data.get(&field.name).filter(|v| !is_blank(v));

            let Some(value) = value else {
                if field.required {
                    push_error(
                        &mut self.errors,
                        &field.name,
                        ValidationError::new("This field is required.", "required"),
                    );
                }
                continue;
            };

            let mut valid = true;
            if let Some(text) = value.as_str() {
                for validator in &field.validators {
                    if let Err(err) = validator.validate(text) {
                        push_error(&mut self.errors, &field.name, err);
                        valid = false;
                    }
                }
            }

            if valid {
                self.cleaned.insert(field.name.clone(), value.clone());
            }
        }

        if !self.errors.is_empty() {
            let fields: Vec<&String> = self.errors.keys().collect();
            tracing::debug!(?fields, "form validation failed");
        }

        self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Values of declared fields that passed validation.
    pub fn cleaned_data(&self) -> &Map<String, Value> {
        &self.cleaned
    }
}

impl ValidatedForm for JsonForm {
    fn field_errors(&self) -> FieldErrors {
        self.errors.clone()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn push_error(errors: &mut FieldErrors, field: &str, err: ValidationError) {
    let entry = errors
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = entry {
        list.push(json!({"message": err.message, "code": err.code}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::{PhoneNumberValidator, UsernameValidator};

    fn signup_form() -> JsonForm {
        JsonForm::new()
            .field(
                FormField::new("username")
                    .required(true)
                    .validator(UsernameValidator),
            )
            .field(
                FormField::new("phone_number")
                    .validator(PhoneNumberValidator),
            )
            .field(FormField::new("age"))
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_form() {
        let mut form = signup_form();
        let valid = form.validate(&object(json!({
            "username": "alice",
            "phone_number": "555-123-4567",
            "age": 30,
            "unknown": "dropped",
        })));

        assert!(valid);
        assert!(form.field_errors().is_empty());
        assert_eq!(
            Value::Object(form.cleaned_data().clone()),
            json!({"username": "alice", "phone_number": "555-123-4567", "age": 30})
        );
    }

    #[test]
    fn test_required_field_missing() {
        let mut form = signup_form();
        assert!(!form.validate(&object(json!({"username": ""}))));
        assert_eq!(
            Value::Object(form.field_errors()),
            json!({"username": [{"message": "This field is required.", "code": "required"}]})
        );
    }

    #[test]
    fn test_validator_errors() {
        let mut form = signup_form();
        assert!(!form.validate(&object(json!({
            "username": "alice",
            "phone_number": "nope",
        }))));
        assert_eq!(
            form.field_errors()["phone_number"][0]["message"],
            json!(PhoneNumberValidator::MESSAGE)
        );
        assert!(!form.cleaned_data().contains_key("phone_number"));
    }

    #[test]
    fn test_make_fields_required() {
        let mut form = signup_form();
        form.make_fields_required(&["age", "missing"]);
        assert!(!form.validate(&object(json!({"username": "alice"}))));
        assert!(form.field_errors().contains_key("age"));

        form.set_required(&["age"], false);
        assert!(form.validate(&object(json!({"username": "alice"}))));
    }

    #[test]
    fn test_revalidate_clears_errors() {
        let mut form = signup_form();
        assert!(!form.validate(&Map::new()));
        assert!(form.validate(&object(json!({"username": "alice"}))));
        assert!(form.is_valid());
    }

    #[test]
    fn test_field_redeclared() {
        let form = signup_form().field(FormField::new("username"));
        assert_eq!(form.fields().len(), 3);
        assert!(!form.fields()[0].is_required());
    }
}
