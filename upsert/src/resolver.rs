use crate::metrics_defs::UPSERT_OUTCOME;
use crate::request::{FieldUpdate, UpdateRequest};
use table_store::{Row, StoreError, TableStore, generate_row_key};

/// What the resolver wrote, and the row exactly as written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The first match already held every requested value and was
    /// replaced in place.
    Updated(Row),
    /// The first match held a different value for at least one field; the
    /// modified copy was inserted under a new row key.
    InsertedDivergent(Row),
    /// Nothing matched the filter; a fresh row was inserted.
    Inserted(Row),
}

impl UpsertOutcome {
    pub fn row(&self) -> &Row {
        match self {
            UpsertOutcome::Updated(row)
            | UpsertOutcome::InsertedDivergent(row)
            | UpsertOutcome::Inserted(row) => row,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Updated(_) => "updated",
            UpsertOutcome::InsertedDivergent(_) => "inserted_divergent",
            UpsertOutcome::Inserted(_) => "inserted",
        }
    }
}

/// Looks up the first row matching the request's filter and either updates
/// it in place or inserts a new row.
///
/// Only the first match is considered; any further matches are left alone.
/// A matched row whose stored values differ from the requested ones is never
/// rewritten: its modified copy is inserted under a fresh row key in the same
/// partition. `partition_key` is only used when nothing matched.
///
/// Store errors are returned as-is. There is no retry, and concurrent callers
/// are not coordinated.
pub async fn resolve<S>(
    store: &S,
    table: &str,
    partition_key: &str,
    request: &UpdateRequest,
) -> Result<UpsertOutcome, StoreError>
where
    S: TableStore + ?Sized,
{
    let filter = request.filter();
    let first_match = store
        .query(table, Some(filter), Some(1))
        .await?
        .into_iter()
        .next();

    let outcome = match first_match {
        Some(mut row) => {
            let original_row_key = row.row_key().to_string();
            if apply_fields(&mut row, request.fields()) {
                row.set_row_key(generate_row_key());
                tracing::info!(
                    table,
                    matched_row_key = %original_row_key,
                    row_key = row.row_key(),
                    "adding new entry since one already existed"
                );
                store.insert(table, &row).await?;
                UpsertOutcome::InsertedDivergent(row)
            } else {
                tracing::info!(table, row_key = row.row_key(), "updating existing entry");
                store.update(table, &row).await?;
                UpsertOutcome::Updated(row)
            }
        }
        None => {
            let mut row = Row::new(partition_key, generate_row_key())
                .with_field(filter.field(), filter.value());
            apply_fields(&mut row, request.fields());
            tracing::info!(table, row_key = row.row_key(), "adding a new entry");
            store.insert(table, &row).await?;
            UpsertOutcome::Inserted(row)
        }
    };

    shared::counter!(UPSERT_OUTCOME, "outcome" => outcome.as_str()).increment(1);
    tracing::debug!(row = %outcome.row(), outcome = outcome.as_str(), "upsert resolved");

    Ok(outcome)
}

/// Writes every field lower-cased into `row`. Returns true if any field was
/// already present with a different value.
fn apply_fields(row: &mut Row, fields: &[FieldUpdate]) -> bool {
    let mut divergent = false;

    for field in fields {
        let value = field.lowercased_value();
        if row.text(field.name()).is_some_and(|current| *current != *value) {
            divergent = true;
        }
        row.set(field.name(), value);
    }

    divergent
}

#[cfg(test)]
mod tests {
    use super::*;
    use table_store::memory::Operation;
    use table_store::MemoryTableStore;

    const TABLE: &str = "pipelines";

    fn request(fields: &[(&str, &str)]) -> UpdateRequest {
        UpdateRequest::new(
            "status",
            "pending",
            fields
                .iter()
                .map(|(name, value)| FieldUpdate::new(*name, *value))
                .collect(),
        )
        .unwrap()
    }

    fn store_with(rows: Vec<Row>) -> MemoryTableStore {
        let store = MemoryTableStore::new();
        store.create_table(TABLE);
        store.seed(TABLE, rows);
        store
    }

    fn alice_row() -> Row {
        Row::new("P", "R1")
            .with_field("status", "pending")
            .with_field("owner", "alice")
    }

    #[tokio::test]
    async fn test_empty_table_inserts_new_row() {
        let store = store_with(vec![]);

        let outcome = resolve(&store, TABLE, "P", &request(&[("owner", "Alice")]))
            .await
            .unwrap();

        let UpsertOutcome::Inserted(row) = &outcome else {
            panic!("expected insert, got {outcome:?}");
        };
        assert_eq!(row.partition_key(), "P");
        let fields: Vec<_> = row.fields().map(|(name, _)| name).collect();
        assert_eq!(fields, vec!["status", "owner"]);
        assert_eq!(row.get("status"), Some("pending"));
        assert_eq!(row.get("owner"), Some("alice"));

        assert_eq!(store.rows(TABLE), vec![row.clone()]);
        assert!(
            !store
                .operations()
                .iter()
                .any(|op| matches!(op, Operation::Update { .. }))
        );
    }

    #[tokio::test]
    async fn test_matching_values_update_in_place() {
        let store = store_with(vec![alice_row()]);

        let outcome = resolve(&store, TABLE, "ignored", &request(&[("owner", "Alice")]))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated(alice_row()));
        assert_eq!(store.rows(TABLE), vec![alice_row()]);
        assert_eq!(
            store.operations()[1],
            Operation::Update {
                table: TABLE.into(),
                row_key: "R1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_new_fields_are_not_divergent() {
        let store = store_with(vec![alice_row()]);

        let outcome = resolve(
            &store,
            TABLE,
            "P",
            &request(&[("owner", "alice"), ("commit", "ABC123")]),
        )
        .await
        .unwrap();

        let UpsertOutcome::Updated(row) = outcome else {
            panic!("expected update");
        };
        assert_eq!(row.row_key(), "R1");
        assert_eq!(row.get("commit"), Some("abc123"));
        assert_eq!(store.rows(TABLE), vec![row]);
    }

    #[tokio::test]
    async fn test_divergent_value_inserts_copy_under_new_key() {
        let store = store_with(vec![alice_row()]);

        let outcome = resolve(&store, TABLE, "other", &request(&[("owner", "Bob")]))
            .await
            .unwrap();

        let UpsertOutcome::InsertedDivergent(row) = &outcome else {
            panic!("expected divergent insert, got {outcome:?}");
        };
        assert_eq!(row.partition_key(), "P");
        assert_ne!(row.row_key(), "R1");
        assert_eq!(row.get("owner"), Some("bob"));
        assert_eq!(row.get("status"), Some("pending"));

        // The original row is untouched and only an insert was issued.
        let rows = store.rows(TABLE);
        assert_eq!(rows, vec![alice_row(), row.clone()]);
        let ops = store.operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[1], Operation::Insert { .. }));
    }

    #[tokio::test]
    async fn test_only_first_match_is_considered() {
        let second = Row::new("P", "R2")
            .with_field("status", "pending")
            .with_field("owner", "bob");
        let store = store_with(vec![alice_row(), second.clone()]);

        let outcome = resolve(&store, TABLE, "P", &request(&[("owner", "alice")]))
            .await
            .unwrap();

        assert_eq!(outcome.row().row_key(), "R1");
        assert_eq!(store.rows(TABLE), vec![alice_row(), second]);
    }

    #[tokio::test]
    async fn test_one_divergent_field_among_many() {
        let store = store_with(vec![alice_row().with_field("env", "prod")]);

        let outcome = resolve(
            &store,
            TABLE,
            "P",
            &request(&[("owner", "ALICE"), ("env", "Staging")]),
        )
        .await
        .unwrap();

        assert_eq!(outcome.as_str(), "inserted_divergent");
        assert_eq!(outcome.row().get("owner"), Some("alice"));
        assert_eq!(outcome.row().get("env"), Some("staging"));
        assert_eq!(store.rows(TABLE).len(), 2);
    }

    #[tokio::test]
    async fn test_generated_keys_differ_across_invocations() {
        let store = store_with(vec![]);
        let req = request(&[("owner", "alice")]);

        let first = resolve(&store, TABLE, "P", &req).await.unwrap();
        // The first insert now matches the filter with equal values.
        let second = resolve(&store, TABLE, "P", &req).await.unwrap();
        let third = resolve(&store, TABLE, "P", &request(&[("owner", "carol")]))
            .await
            .unwrap();

        assert_eq!(first.as_str(), "inserted");
        assert_eq!(second.as_str(), "updated");
        assert_eq!(second.row().row_key(), first.row().row_key());
        assert_eq!(third.as_str(), "inserted_divergent");
        assert_ne!(third.row().row_key(), first.row().row_key());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = MemoryTableStore::new();
        let err = resolve(&store, TABLE, "P", &request(&[("owner", "alice")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
        assert!(store.rows(TABLE).is_empty());
    }

    #[test]
    fn test_apply_fields_flags_divergence_but_writes_anyway() {
        let mut row = alice_row();
        assert!(apply_fields(&mut row, &[FieldUpdate::new("owner", "Dave")]));
        assert_eq!(row.get("owner"), Some("dave"));

        let mut row = alice_row();
        assert!(!apply_fields(
            &mut row,
            &[FieldUpdate::new("owner", "ALICE"), FieldUpdate::new("new", "X")]
        ));
        assert_eq!(row.get("new"), Some("x"));
    }

    #[tokio::test]
    async fn test_untouched_typed_fields_survive_update() {
        let stored = Row::try_from(
            serde_json::json!({
                "PartitionKey": "P",
                "RowKey": "R1",
                "status": "pending",
                "owner": "alice",
                "attempts": 3,
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .unwrap();
        let store = store_with(vec![stored.clone()]);

        let outcome = resolve(&store, TABLE, "P", &request(&[("owner", "Alice")]))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated(stored.clone()));
        assert_eq!(store.rows(TABLE), vec![stored]);
    }

    #[tokio::test]
    async fn test_numeric_field_compares_by_text() {
        let stored = Row::try_from(
            serde_json::json!({
                "PartitionKey": "P",
                "RowKey": "R1",
                "status": "pending",
                "attempts": 3,
            })
            .as_object()
            .unwrap()
            .clone(),
        )
        .unwrap();
        let store = store_with(vec![stored]);

        let same = resolve(&store, TABLE, "P", &request(&[("attempts", "3")]))
            .await
            .unwrap();
        assert_eq!(same.as_str(), "updated");

        let different = resolve(&store, TABLE, "P", &request(&[("attempts", "4")]))
            .await
            .unwrap();
        assert_eq!(different.as_str(), "inserted_divergent");
    }

    #[tokio::test]
    async fn test_filter_value_is_stored_verbatim_on_insert() {
        let store = store_with(vec![]);
        let req = UpdateRequest::new("Build", "MixedCase-42", vec![FieldUpdate::new("a", "B")])
            .unwrap();

        let outcome = resolve(&store, TABLE, "P", &req).await.unwrap();

        assert_eq!(outcome.row().get("Build"), Some("MixedCase-42"));
        assert_eq!(outcome.row().get("a"), Some("b"));
    }
}
