use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use heron_common::error::StorageError;
use heron_common::schema::{RelKind, RelPersistence, TableSchema, TupleDesc};
use heron_common::types::TableId;

/// An opened table handle.
///
/// Cheap to clone; ownership of the open lives with whoever holds a clone.
/// The executor parks one clone per range-table reference in its execution
/// state and drops them all when the query's region is torn down.
#[derive(Debug, Clone)]
pub struct Relation {
    schema: Arc<TableSchema>,
}

impl Relation {
    pub fn id(&self) -> TableId {
        self.schema.id
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn kind(&self) -> RelKind {
        self.schema.kind
    }

    pub fn persistence(&self) -> RelPersistence {
        self.schema.persistence
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn tuple_desc(&self) -> TupleDesc {
        self.schema.tuple_desc()
    }
}

/// System catalog: relation metadata plus the open path used by the
/// executor.
///
/// Opens are metered so callers can assert ordering properties (e.g. a
/// rejected statement must not have opened anything).
#[derive(Default)]
pub struct Catalog {
    tables: DashMap<u64, Arc<TableSchema>>,
    opens: AtomicU64,
}

impl Catalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_table(&self, schema: TableSchema) -> Result<(), StorageError> {
        let id = schema.id;
        if self.tables.contains_key(&id.0) {
            return Err(StorageError::TableAlreadyExists(schema.name));
        }
        self.tables.insert(id.0, Arc::new(schema));
        Ok(())
    }

    /// Metadata lookup without opening. Used for pre-open policy checks.
    pub fn schema(&self, id: TableId) -> Option<Arc<TableSchema>> {
        self.tables.get(&id.0).map(|e| Arc::clone(&e))
    }

    /// Open a relation for query execution.
    pub fn open(&self, id: TableId) -> Result<Relation, StorageError> {
        let schema = self.schema(id).ok_or(StorageError::TableNotFound(id))?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(table = %id, name = %schema.name, "relation opened");
        Ok(Relation { schema })
    }

    /// Number of physical opens since catalog creation.
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_common::schema::ColumnDef;
    use heron_common::types::{ColumnId, DataType};

    fn schema(id: u64, name: &str) -> TableSchema {
        TableSchema::new(
            TableId(id),
            name,
            vec![ColumnDef {
                id: ColumnId(1),
                name: "id".into(),
                data_type: DataType::Int64,
                nullable: false,
            }],
        )
    }

    #[test]
    fn test_open_meters_physical_opens() {
        let catalog = Catalog::new();
        catalog.register_table(schema(1, "t")).unwrap();

        assert_eq!(catalog.open_count(), 0);
        let rel = catalog.open(TableId(1)).unwrap();
        assert_eq!(rel.name(), "t");
        assert_eq!(catalog.open_count(), 1);

        // schema lookup is not an open
        assert!(catalog.schema(TableId(1)).is_some());
        assert_eq!(catalog.open_count(), 1);
    }

    #[test]
    fn test_open_unknown_table_fails() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.open(TableId(42)),
            Err(StorageError::TableNotFound(TableId(42)))
        ));
        assert_eq!(catalog.open_count(), 0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let catalog = Catalog::new();
        catalog.register_table(schema(1, "t")).unwrap();
        assert!(matches!(
            catalog.register_table(schema(1, "t")),
            Err(StorageError::TableAlreadyExists(_))
        ));
    }
}
