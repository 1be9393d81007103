//! Typed field serialization for frontend payloads.
//!
//! A [`FieldSerializer`] maps frontend field names to accessor functions,
//! fixed when the serializer is built. Nothing is looked up by string at
//! serialization time beyond the registered names.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

type Accessor<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// Ordered `{frontend_name: accessor}` registry for values of `T`.
///
/// # Example
///
/// ```rust
/// use common_api_core::FieldSerializer;
///
/// struct User { id: u32, username: String, password: String }
///
/// let serializer = FieldSerializer::<User>::new()
///     .field("id", |u| u.id.into())
///     .field("name", |u| u.username.clone().into())
///     .field("password", |u| u.password.clone().into())
///     .exclude("password");
///
/// let user = User { id: 1, username: "alice".into(), password: "secret".into() };
/// assert_eq!(
///     serde_json::Value::Object(serializer.serialize(&user)),
///     serde_json::json!({"id": 1, "name": "alice"}),
/// );
/// ```
pub struct FieldSerializer<T> {
    fields: Vec<(String, Accessor<T>)>,
    excluded: HashSet<String>,
}

impl<T> Clone for FieldSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            excluded: self.excluded.clone(),
        }
    }
}

impl<T> fmt::Debug for FieldSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSerializer")
            .field("fields", &self.field_names().collect::<Vec<_>>())
            .field("excluded", &self.excluded)
            .finish()
    }
}

impl<T> Default for FieldSerializer<T> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            excluded: HashSet::new(),
        }
    }
}

impl<T> FieldSerializer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. Re-registering a name replaces its accessor in place.
    pub fn field<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let accessor: Accessor<T> = Arc::new(accessor);
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = accessor,
            None => self.fields.push((name, accessor)),
        }
        self
    }

    /// Always leave `name` out of the output.
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded.insert(name.into());
        self
    }

    /// Registered names, in registration order, without exclusions.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| !self.excluded.contains(*name))
    }

    pub fn serialize(&self, value: &T) -> Map<String, Value> {
        self.serialize_excluding(value, &[])
    }

    /// Serialize with additional per-call exclusions.
    pub fn serialize_excluding(&self, value: &T, exclude: &[&str]) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(name, _)| {
                !self.excluded.contains(name) && !exclude.contains(&name.as_str())
            })
            .map(|(name, accessor)| (name.clone(), accessor(value)))
            .collect()
    }

    /// Serialize every item of `values` into a JSON array.
    pub fn serialize_all<'a, I>(&self, values: I) -> Value
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        Value::Array(
            values
                .into_iter()
                .map(|v| Value::Object(self.serialize(v)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Article {
        id: u64,
        title: String,
        draft: bool,
    }

    fn serializer() -> FieldSerializer<Article> {
        FieldSerializer::new()
            .field("id", |a: &Article| a.id.into())
            .field("title", |a: &Article| a.title.clone().into())
            .field("is_draft", |a: &Article| a.draft.into())
    }

    fn article() -> Article {
        Article {
            id: 7,
            title: "Hello".into(),
            draft: true,
        }
    }

    #[test]
    fn test_serialize() {
        assert_eq!(
            Value::Object(serializer().serialize(&article())),
            json!({"id": 7, "title": "Hello", "is_draft": true})
        );
    }

    #[test]
    fn test_exclusions() {
        let s = serializer().exclude("is_draft");
        assert_eq!(s.field_names().collect::<Vec<_>>(), ["id", "title"]);
        assert_eq!(
            Value::Object(s.serialize_excluding(&article(), &["title", "unknown"])),
            json!({"id": 7})
        );
    }

    #[test]
    fn test_field_replaced_in_place() {
        let prefixed = |a: &Article| Value::from(format!("a-{}", a.id));
        let s = serializer().field("id", prefixed);
        assert_eq!(
            s.field_names().collect::<Vec<_>>(),
            ["id", "title", "is_draft"]
        );
        assert_eq!(s.serialize(&article())["id"], json!("a-7"));
    }

    #[test]
    fn test_keys_keep_registration_order() {
        let s = FieldSerializer::<Article>::new()
            .field("zeta", |a: &Article| a.id.into())
            .field("alpha", |a: &Article| a.draft.into());
        let object = s.serialize(&article());

        assert_eq!(object.keys().collect::<Vec<_>>(), ["zeta", "alpha"]);
        assert_eq!(
            serde_json::to_string(&object).unwrap(),
            r#"{"zeta":7,"alpha":true}"#
        );
        assert_eq!(
            serializer()
                .serialize(&article())
                .keys()
                .collect::<Vec<_>>(),
            ["id", "title", "is_draft"]
        );
    }

    #[test]
    fn test_serialize_all() {
        let items = [article(), article()];
        let value = serializer().exclude("title").serialize_all(&items);
        assert_eq!(
            value,
            json!([{"id": 7, "is_draft": true}, {"id": 7, "is_draft": true}])
        );
    }
}
