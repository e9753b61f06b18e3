
use arrow::record_batch::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use tracing::{debug, info};

use super::{
    VECTOR_COLUMN, entries_from_batch, entries_to_batch, entry_schema, hits_from_batch,
    schema_dimension,
};
use crate::database::{IndexHit, IndexedEntry, VectorIndex};
use crate::{QaError, Result, config::Config};

/// LanceDB table holding one QA collection
pub struct VectorStore {
    connection: Connection,
    table_name: String,
}

impl VectorStore {
    /// Open the store configured in `config`
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(&config.vector_database_path(), &config.index.collection).await
    }

    /// Open (creating if needed) the database directory at `db_path`.
    ///
    /// The collection table itself is created on the first insert, once the
    /// vector dimension is known.
    #[inline]
    pub async fn open(db_path: &Path, collection: &str) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            QaError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        let uri = db_path.to_string_lossy();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to connect to LanceDB: {e}")))?;

        info!("Vector store opened with collection '{}'", collection);
        Ok(Self {
            connection,
            table_name: collection.to_string(),
        })
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.table_name
    }

    /// Names of every collection in the database
    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to list tables: {e}")))
    }

    /// Vector length of the collection, `None` until the first insert
    #[inline]
    pub async fn dimension(&self) -> Result<Option<usize>> {
        let Some(table) = self.open_table().await? else {
            return Ok(None);
        };
        let schema = table
            .schema()
            .await
            .map_err(|e| QaError::Database(format!("Failed to get table schema: {e}")))?;
        Ok(schema_dimension(&schema))
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.list_collections().await?.contains(&self.table_name) {
            return Ok(None);
        }

        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map(Some)
            .map_err(|e| QaError::Database(format!("Failed to open table: {e}")))
    }

    async fn table_for_insert(&self, dimension: usize) -> Result<Table> {
        if let Some(table) = self.open_table().await? {
            let schema = table
                .schema()
                .await
                .map_err(|e| QaError::Database(format!("Failed to get table schema: {e}")))?;
            return match schema_dimension(&schema) {
                Some(existing) if existing == dimension => Ok(table),
                Some(existing) => Err(QaError::Database(format!(
                    "Collection '{}' stores {}-dimensional vectors, got {}; clear it before re-ingesting",
                    self.table_name, existing, dimension
                ))),
                None => Err(QaError::Database(format!(
                    "Collection '{}' has no vector column",
                    self.table_name
                ))),
            };
        }

        info!(
            "Creating collection '{}' with {} dimensions",
            self.table_name, dimension
        );
        self.connection
            .create_empty_table(&self.table_name, entry_schema(dimension))
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to create table: {e}")))
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn add(&self, entries: &[IndexedEntry]) -> Result<()> {
        let Some(first) = entries.first() else {
            debug!("No entries to store");
            return Ok(());
        };

        let dimension = first.vector.len();
        let table = self.table_for_insert(dimension).await?;

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let record_batch = entries_to_batch(entries, dimension, &ingested_at)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to insert entries: {e}")))?;

        debug!("Stored {} entries in '{}'", entries.len(), self.table_name);
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        let Some(table) = self.open_table().await? else {
            debug!("Collection '{}' does not exist yet", self.table_name);
            return Ok(Vec::new());
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {e}")))?;
        if rows == 0 || limit == 0 {
            return Ok(Vec::new());
        }

        let mut results = table
            .vector_search(vector)
            .map_err(|e| QaError::Database(format!("Failed to create vector search: {e}")))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| QaError::Database(format!("Failed to read result stream: {e}")))?
        {
            hits.extend(hits_from_batch(&batch)?);
        }

        // Results arrive per fragment; restore global nearest-first order
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);

        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {e}")))?;
        Ok(count as u64)
    }

    async fn get_all(&self) -> Result<Vec<IndexedEntry>> {
        let Some(table) = self.open_table().await? else {
            return Ok(Vec::new());
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| QaError::Database(format!("Failed to count rows: {e}")))?;
        if rows == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<_> = table
            .query()
            .limit(rows)
            .execute()
            .await
            .map_err(|e| QaError::Database(format!("Failed to scan table: {e}")))?
            .try_collect()
            .await
            .map_err(|e| QaError::Database(format!("Failed to read table: {e}")))?;

        let mut entries = Vec::with_capacity(rows);
        for batch in &batches {
            entries.extend(entries_from_batch(batch)?);
        }
        Ok(entries)
    }

    async fn clear(&self) -> Result<()> {
        if self.list_collections().await?.contains(&self.table_name) {
            info!("Dropping collection '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| QaError::Database(format!("Failed to drop table: {e}")))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}
