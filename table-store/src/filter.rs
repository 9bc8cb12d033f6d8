use crate::row::Row;
use std::fmt;

/// Equality predicate on a single field, the only kind of lookup the
/// upsert path needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    field: String,
    value: String,
}

impl Filter {
    pub fn eq<F, V>(field: F, value: V) -> Self
    where
        F: Into<String>,
        V: Into<String>,
    {
        Filter {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// OData `$filter` expression. String literals escape `'` by doubling it.
    pub fn to_odata(&self) -> String {
        format!("{} eq '{}'", self.field, self.value.replace('\'', "''"))
    }

    /// A string literal only matches string-typed fields, as on the service.
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.field) == Some(self.value.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_odata())
    }
}
