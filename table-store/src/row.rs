use crate::errors::StoreError;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

pub const PARTITION_KEY: &str = "PartitionKey";
pub const ROW_KEY: &str = "RowKey";

/// Suffix of the annotation carrying a property's EDM type, e.g.
/// `"started@odata.type": "Edm.DateTime"`.
const TYPE_ANNOTATION: &str = "@odata.type";

/// Properties the table service attaches to every entity. They are never
/// written back.
const SYSTEM_PROPERTIES: &[&str] = &["Timestamp", "etag"];

/// A field value as the table service stores it. Values read from the
/// service keep their JSON form and EDM type so that writing the row back
/// leaves untouched fields as they were.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    value: Value,
    edm_type: Option<String>,
}

impl Property {
    pub fn string(value: impl Into<String>) -> Self {
        Property {
            value: Value::String(value.into()),
            edm_type: None,
        }
    }

    pub fn typed(value: Value, edm_type: Option<String>) -> Self {
        Property { value, edm_type }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn edm_type(&self) -> Option<&str> {
        self.edm_type.as_deref()
    }

    /// The value when it is stored as a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Textual form of the value: strings as-is, numbers and booleans as
    /// their JSON text.
    pub fn as_text(&self) -> Cow<'_, str> {
        match &self.value {
            Value::String(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        }
    }
}

/// One entity in a table.
///
/// Identity is the `(PartitionKey, RowKey)` pair; everything else is an open,
/// insertion-ordered mapping of field name to [`Property`]. The reserved
/// names are routed to the identity and never stored in `fields`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    partition_key: String,
    row_key: String,
    fields: IndexMap<String, Property>,
}

impl Row {
    pub fn new<P, R>(partition_key: P, row_key: R) -> Self
    where
        P: Into<String>,
        R: Into<String>,
    {
        Row {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_field<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.set(name, value);
        self
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    pub fn set_row_key(&mut self, row_key: impl Into<String>) {
        self.row_key = row_key.into();
    }

    /// String value of `name`. Fields stored as numbers or booleans are
    /// reachable through [`Row::text`] and [`Row::property`].
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            PARTITION_KEY => Some(&self.partition_key),
            ROW_KEY => Some(&self.row_key),
            _ => self.fields.get(name).and_then(Property::as_str),
        }
    }

    /// Textual value of `name`, whatever its stored type.
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            PARTITION_KEY => Some(Cow::Borrowed(&self.partition_key)),
            ROW_KEY => Some(Cow::Borrowed(&self.row_key)),
            _ => self.fields.get(name).map(Property::as_text),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.fields.get(name)
    }

    /// Sets a field to a string value, returning the previous value's text
    /// if there was one. Any EDM type the field had is dropped.
    pub fn set<N, V>(&mut self, name: N, value: V) -> Option<String>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        let value = value.into();
        match name.as_str() {
            PARTITION_KEY => Some(std::mem::replace(&mut self.partition_key, value)),
            ROW_KEY => Some(std::mem::replace(&mut self.row_key, value)),
            _ => self
                .fields
                .insert(name, Property::string(value))
                .map(|previous| previous.as_text().into_owned()),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn serialize_entries<S: Serializer>(
        &self,
        serializer: S,
        annotate: bool,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(PARTITION_KEY, &self.partition_key)?;
        map.serialize_entry(ROW_KEY, &self.row_key)?;
        for (name, property) in &self.fields {
            if let (true, Some(edm_type)) = (annotate, &property.edm_type) {
                map.serialize_entry(&format!("{name}{TYPE_ANNOTATION}"), edm_type)?;
            }
            map.serialize_entry(name, &property.value)?;
        }
        map.end()
    }
}

/// Entity payload for the table service, with `@odata.type` annotations for
/// typed fields.
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.serialize_entries(serializer, true)
    }
}

struct PlainRow<'a>(&'a Row);

impl Serialize for PlainRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize_entries(serializer, false)
    }
}

/// JSON object of the identity and field values, without type annotations.
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&PlainRow(self)).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl TryFrom<Map<String, Value>> for Row {
    type Error = StoreError;

    fn try_from(entity: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut partition_key = None;
        let mut row_key = None;
        let mut fields = IndexMap::with_capacity(entity.len());
        // The service may send an annotation before the value it describes.
        let mut edm_types = IndexMap::new();

        for (name, value) in entity {
            match name.as_str() {
                PARTITION_KEY => partition_key = Some(key_string(PARTITION_KEY, value)?),
                ROW_KEY => row_key = Some(key_string(ROW_KEY, value)?),
                _ if name.ends_with(TYPE_ANNOTATION) => {
                    if let Value::String(edm_type) = value {
                        let field = &name[..name.len() - TYPE_ANNOTATION.len()];
                        edm_types.insert(field.to_string(), edm_type);
                    }
                }
                _ if is_metadata(&name) => {}
                _ => match value {
                    Value::Null => {}
                    Value::Array(_) | Value::Object(_) => {
                        return Err(StoreError::Decode(format!(
                            "field {name} is not a scalar value"
                        )));
                    }
                    scalar => {
                        fields.insert(name, Property::typed(scalar, None));
                    }
                },
            }
        }

        for (name, edm_type) in edm_types {
            if let Some(property) = fields.get_mut(&name) {
                property.edm_type = Some(edm_type);
            }
        }

        Ok(Row {
            partition_key: partition_key
                .ok_or_else(|| StoreError::Decode(format!("entity has no {PARTITION_KEY}")))?,
            row_key: row_key
                .ok_or_else(|| StoreError::Decode(format!("entity has no {ROW_KEY}")))?,
            fields,
        })
    }
}

fn key_string(key: &str, value: Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(StoreError::Decode(format!("{key} is not a string"))),
    }
}

fn is_metadata(name: &str) -> bool {
    SYSTEM_PROPERTIES.contains(&name) || name.starts_with("odata.") || name.contains("@odata.")
}

/// Generates a fresh row key: the last group of a random UUID, which is 12
/// lowercase hex characters.
pub fn generate_row_key() -> String {
    let id = Uuid::new_v4().hyphenated().to_string();
    match id.rsplit_once('-') {
        Some((_, last)) => last.to_string(),
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn entity(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_reserved_names_route_to_identity() {
        let mut row = Row::new("p1", "r1").with_field("status", "pending");
        assert_eq!(row.get(PARTITION_KEY), Some("p1"));
        assert_eq!(row.get(ROW_KEY), Some("r1"));
        assert_eq!(row.get("status"), Some("pending"));
        assert_eq!(row.get("owner"), None);

        assert_eq!(row.set(ROW_KEY, "r2"), Some("r1".to_string()));
        assert_eq!(row.row_key(), "r2");
        assert_eq!(row.field_count(), 1);
    }

    #[test]
    fn test_serialize_puts_identity_first() {
        let row = Row::new("p1", "r1")
            .with_field("status", "pending")
            .with_field("owner", "alice");
        assert_eq!(
            row.to_string(),
            r#"{"PartitionKey":"p1","RowKey":"r1","status":"pending","owner":"alice"}"#
        );
    }

    fn field_texts(row: &Row) -> Vec<String> {
        row.fields()
            .map(|(name, property)| format!("{name}={}", property.as_text()))
            .collect()
    }

    #[test]
    fn test_decode_drops_metadata() {
        let row = Row::try_from(entity(json!({
            "odata.etag": "W/\"datetime'2026-10-18T09%3A00%3A00Z'\"",
            "PartitionKey": "p1",
            "RowKey": "r1",
            "Timestamp@odata.type": "Edm.DateTime",
            "Timestamp": "2026-10-18T09:00:00Z",
            "status": "pending",
            "attempts": 3,
            "manual": false,
            "note": null,
        })))
        .unwrap();

        assert_eq!(row.partition_key(), "p1");
        assert_eq!(row.row_key(), "r1");
        assert_eq!(
            field_texts(&row),
            ["status=pending", "attempts=3", "manual=false"]
        );
        assert_eq!(row.get("attempts"), None);
        assert_eq!(row.text("attempts").as_deref(), Some("3"));
        assert_eq!(row.property("manual").unwrap().value(), &json!(false));
    }

    #[test]
    fn test_decode_keeps_types_for_write_back() {
        let mut row = Row::try_from(entity(json!({
            "PartitionKey": "p1",
            "RowKey": "r1",
            "started@odata.type": "Edm.DateTime",
            "started": "2026-10-18T09:00:00Z",
            "attempts": 3,
            "builds": "12",
            "builds@odata.type": "Edm.Int64",
            "owner": "alice",
        })))
        .unwrap();

        let started = row.property("started").unwrap();
        assert_eq!(started.edm_type(), Some("Edm.DateTime"));
        assert_eq!(row.property("builds").unwrap().edm_type(), Some("Edm.Int64"));
        assert_eq!(row.property("attempts").unwrap().edm_type(), None);

        assert_eq!(row.set("owner", "bob"), Some("alice".to_string()));
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({
                "PartitionKey": "p1",
                "RowKey": "r1",
                "started@odata.type": "Edm.DateTime",
                "started": "2026-10-18T09:00:00Z",
                "attempts": 3,
                "builds@odata.type": "Edm.Int64",
                "builds": "12",
                "owner": "bob",
            })
        );
        // Display is for people and leaves the annotations out.
        assert_eq!(
            row.to_string(),
            r#"{"PartitionKey":"p1","RowKey":"r1","started":"2026-10-18T09:00:00Z","attempts":3,"builds":"12","owner":"bob"}"#
        );
    }

    #[test]
    fn test_set_replaces_typed_value_with_string() {
        let mut row = Row::try_from(entity(json!({
            "PartitionKey": "p1",
            "RowKey": "r1",
            "builds": "12",
            "builds@odata.type": "Edm.Int64",
        })))
        .unwrap();

        assert_eq!(row.set("builds", "13"), Some("12".to_string()));
        assert_eq!(row.property("builds"), Some(&Property::string("13")));
    }

    #[test]
    fn test_decode_requires_identity() {
        let err = Row::try_from(entity(json!({"PartitionKey": "p1"}))).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));

        let err = Row::try_from(entity(json!({"PartitionKey": "p1", "RowKey": 7}))).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_nested_values() {
        let err = Row::try_from(entity(json!({
            "PartitionKey": "p1",
            "RowKey": "r1",
            "tags": ["a", "b"],
        })))
        .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn test_generated_row_keys() {
        let keys: HashSet<String> = (0..1000).map(|_| generate_row_key()).collect();
        assert_eq!(keys.len(), 1000);
        for key in &keys {
            assert_eq!(key.len(), 12);
            assert!(!key.contains('-'));
            assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
