use table_store::Filter;

/// Most field pairs a single request may carry.
pub const MAX_FIELDS: usize = 5;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("at least one field to update is required")]
    NoFields,

    #[error("at most 5 fields can be updated, got {0}")]
    TooManyFields(usize),

    #[error("filter field name cannot be empty")]
    EmptyFilterField,

    #[error("field name cannot be empty")]
    EmptyFieldName,
}

/// A field to write. The value is compared and stored lower-cased.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldUpdate {
    name: String,
    value: String,
}

impl FieldUpdate {
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        FieldUpdate {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn lowercased_value(&self) -> String {
        self.value.to_lowercase()
    }
}

/// Lookup predicate plus the ordered fields to apply to the matched row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    filter: Filter,
    fields: Vec<FieldUpdate>,
}

impl UpdateRequest {
    pub fn new<F, V>(
        filter_field: F,
        filter_value: V,
        fields: Vec<FieldUpdate>,
    ) -> Result<Self, RequestError>
    where
        F: Into<String>,
        V: Into<String>,
    {
        let filter_field = filter_field.into();
        if filter_field.is_empty() {
            return Err(RequestError::EmptyFilterField);
        }
        if fields.is_empty() {
            return Err(RequestError::NoFields);
        }
        if fields.len() > MAX_FIELDS {
            return Err(RequestError::TooManyFields(fields.len()));
        }
        if fields.iter().any(|f| f.name.is_empty()) {
            return Err(RequestError::EmptyFieldName);
        }

        Ok(UpdateRequest {
            filter: Filter::eq(filter_field, filter_value),
            fields,
        })
    }

    /// Builds a request from positional `(name, value)` slots. A slot is
    /// only used when both its name and value are present; a name without a
    /// value (or the reverse) is skipped, not written as null.
    pub fn from_optional_pairs<F, V, I>(
        filter_field: F,
        filter_value: V,
        pairs: I,
    ) -> Result<Self, RequestError>
    where
        F: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (Option<String>, Option<String>)>,
    {
        let fields = pairs
            .into_iter()
            .filter_map(|pair| match pair {
                (Some(name), Some(value)) => Some(FieldUpdate::new(name, value)),
                _ => None,
            })
            .collect();

        Self::new(filter_field, filter_value, fields)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn fields(&self) -> &[FieldUpdate] {
        &self.fields
    }
}
