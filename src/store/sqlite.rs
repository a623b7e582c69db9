//! SQLite-backed catalog with migrations
//!
//! Persists collections, alias bindings, and records (vectors as
//! little-endian f32 blobs, metadata as JSON) in one database file.
//! Search is an exact cosine scan; deployments needing ANN structures
//! inject their own [`VectorStore`] implementation instead.

use super::{
    cosine_distance, rank_hits, CollectionCatalog, QueryHit, StoredEntry, VectorRecord, VectorStore,
};
use crate::embedding::EmbedderIdentity;
use crate::error::{MindsongError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite-backed collection catalog
pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MindsongError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| MindsongError::Config(format!("Failed to create connection pool: {}", e)))?;

        let catalog = Self { pool };
        catalog.migrate()?;

        Ok(catalog)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| MindsongError::BackendUnavailable(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying store migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }
}

impl CollectionCatalog for SqliteCatalog {
    fn collection(&self, name: &str) -> Result<Arc<dyn VectorStore>> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
            params![name, chrono::Utc::now().timestamp()],
        )?;

        Ok(Arc::new(SqliteCollection {
            name: name.to_string(),
            pool: self.pool.clone(),
        }))
    }

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let target = conn
            .query_row(
                "SELECT collection FROM aliases WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target)
    }

    fn set_alias(&self, alias: &str, collection: &str) -> Result<()> {
        let conn = self.get_conn()?;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(MindsongError::Config(format!(
                "Cannot alias '{}' to unknown collection '{}'",
                alias, collection
            )));
        }

        // Single statement, so readers observe either the old or the new
        // binding, never an absent one.
        conn.execute(
            "INSERT INTO aliases (alias, collection, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(alias) DO UPDATE SET
                collection = excluded.collection,
                updated_at = excluded.updated_at",
            params![alias, collection, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM aliases WHERE collection = ?1", params![name])?;
        conn.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

/// One collection backed by the shared catalog database
struct SqliteCollection {
    name: String,
    pool: DbPool,
}

impl SqliteCollection {
    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| MindsongError::BackendUnavailable(format!("Failed to get connection: {}", e)))
    }

    fn pinned_dimension(&self) -> Result<usize> {
        match self.identity()? {
            Some(identity) => Ok(identity.dimension),
            None => Err(MindsongError::Config(format!(
                "Collection '{}' has no pinned embedder identity",
                self.name
            ))),
        }
    }
}

impl VectorStore for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> Result<Option<EmbedderIdentity>> {
        let conn = self.get_conn()?;
        let row: Option<(Option<String>, Option<i64>)> = conn
            .query_row(
                "SELECT model, dimension FROM collections WHERE name = ?1",
                params![self.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Err(MindsongError::Config(format!(
                "Unknown collection '{}'",
                self.name
            ))),
            Some((Some(model), Some(dimension))) => Ok(Some(EmbedderIdentity {
                model,
                dimension: dimension as usize,
            })),
            Some(_) => Ok(None),
        }
    }

    fn pin_identity(&self, identity: &EmbedderIdentity) -> Result<()> {
        match self.identity()? {
            None => {
                let conn = self.get_conn()?;
                conn.execute(
                    "UPDATE collections SET model = ?1, dimension = ?2 WHERE name = ?3",
                    params![identity.model, identity.dimension as i64, self.name],
                )?;
                Ok(())
            }
            Some(pinned) if pinned == *identity => Ok(()),
            Some(pinned) => Err(MindsongError::DimensionMismatch {
                collection: self.name.clone(),
                pinned_model: pinned.model,
                pinned_dim: pinned.dimension,
                actual_model: identity.model.clone(),
                actual_dim: identity.dimension,
            }),
        }
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let dimension = self.pinned_dimension()?;
        for record in records {
            if record.embedding.len() != dimension {
                return Err(MindsongError::Config(format!(
                    "Vector length {} does not match pinned dimension {} for collection '{}'",
                    record.embedding.len(),
                    dimension,
                    self.name
                )));
            }
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO records (collection, id, embedding, text, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    text = excluded.text,
                    metadata = excluded.metadata",
                params![
                    self.name,
                    record.id,
                    encode_vector(&record.embedding),
                    record.text,
                    encode_metadata(&record.metadata)?,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let dimension = self.pinned_dimension()?;
        if embedding.len() != dimension {
            return Err(MindsongError::Config(format!(
                "Query vector length {} does not match pinned dimension {} for collection '{}'",
                embedding.len(),
                dimension,
                self.name
            )));
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, embedding, text, metadata FROM records WHERE collection = ?1",
        )?;

        let mut hits = Vec::new();
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (id, blob, text, metadata_json) = row?;
            let vector = decode_vector(&blob);
            hits.push(QueryHit {
                distance: cosine_distance(embedding, &vector),
                id,
                text,
                metadata: decode_metadata(&metadata_json)?,
            });
        }

        Ok(rank_hits(hits, k))
    }

    fn delete(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute(
                "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                params![self.name, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list(&self) -> Result<Vec<StoredEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, text, metadata FROM records WHERE collection = ?1 ORDER BY id",
        )?;

        let mut entries = Vec::new();
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, text, metadata_json) = row?;
            entries.push(StoredEntry {
                id,
                text,
                metadata: decode_metadata(&metadata_json)?,
            });
        }
        Ok(entries)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn encode_metadata(metadata: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(metadata).map_err(|e| MindsongError::Json {
        source: e,
        context: "Failed to encode record metadata".to_string(),
    })
}

fn decode_metadata(json: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(json).map_err(|e| MindsongError::Json {
        source: e,
        context: "Failed to decode record metadata".to_string(),
    })
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Collections, each pinned to at most one embedder identity
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        model TEXT,
        dimension INTEGER,
        created_at INTEGER NOT NULL
    );

    -- Alias indirection for swap-on-completion rebuilds
    CREATE TABLE aliases (
        alias TEXT PRIMARY KEY,
        collection TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );

    -- Embedded records
    CREATE TABLE records (
        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
        id TEXT NOT NULL,
        embedding BLOB NOT NULL,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX idx_records_collection ON records(collection);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(dim: usize) -> EmbedderIdentity {
        EmbedderIdentity {
            model: "test-model".to_string(),
            dimension: dim,
        }
    }

    fn record(id: &str, embedding: Vec<f32>) -> VectorRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("source_path".to_string(), format!("{}.md", id));
        VectorRecord {
            id: id.to_string(),
            embedding,
            text: format!("text for {}", id),
            metadata,
        }
    }

    #[test]
    fn test_vector_codec_round_trip() {
        let vector = vec![0.25f32, -1.5, 3.0, f32::MIN_POSITIVE];
        assert_eq!(decode_vector(&encode_vector(&vector)), vector);
    }

    #[test]
    fn test_catalog_creation_and_migration() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("store.sqlite");

        let _catalog = SqliteCatalog::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_upsert_query_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("store.sqlite");

        {
            let catalog = SqliteCatalog::new(&db_path).unwrap();
            let store = catalog.collection("docs").unwrap();
            store.pin_identity(&identity(2)).unwrap();
            store
                .upsert(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
                .unwrap();
        }

        let catalog = SqliteCatalog::new(&db_path).unwrap();
        let store = catalog.collection("docs").unwrap();
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.identity().unwrap(), Some(identity(2)));

        let hits = store.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance < 1e-6);
        assert_eq!(hits[0].metadata.get("source_path").unwrap(), "a.md");
    }

    #[test]
    fn test_identity_mismatch_rejected_after_reopen() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("store.sqlite");

        {
            let catalog = SqliteCatalog::new(&db_path).unwrap();
            let store = catalog.collection("docs").unwrap();
            store.pin_identity(&identity(384)).unwrap();
        }

        let catalog = SqliteCatalog::new(&db_path).unwrap();
        let store = catalog.collection("docs").unwrap();
        let result = store.pin_identity(&EmbedderIdentity {
            model: "bigger-model".to_string(),
            dimension: 768,
        });
        assert!(matches!(
            result,
            Err(MindsongError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_alias_swap_and_drop() {
        let temp = TempDir::new().unwrap();
        let catalog = SqliteCatalog::new(&temp.path().join("store.sqlite")).unwrap();

        let gen1 = catalog.collection("docs__g001").unwrap();
        gen1.pin_identity(&identity(2)).unwrap();
        gen1.upsert(&[record("a", vec![1.0, 0.0])]).unwrap();
        catalog.set_alias("docs", "docs__g001").unwrap();

        let gen2 = catalog.collection("docs__g002").unwrap();
        gen2.pin_identity(&identity(2)).unwrap();
        gen2.upsert(&[record("b", vec![0.0, 1.0])]).unwrap();
        catalog.set_alias("docs", "docs__g002").unwrap();
        catalog.drop_collection("docs__g001").unwrap();

        assert_eq!(
            catalog.resolve_alias("docs").unwrap().as_deref(),
            Some("docs__g002")
        );
        assert_eq!(
            catalog.collection_names().unwrap(),
            vec!["docs__g002".to_string()]
        );

        // Records of the dropped generation are gone
        let gen2 = catalog.collection("docs__g002").unwrap();
        assert_eq!(gen2.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_and_list() {
        let temp = TempDir::new().unwrap();
        let catalog = SqliteCatalog::new(&temp.path().join("store.sqlite")).unwrap();
        let store = catalog.collection("docs").unwrap();
        store.pin_identity(&identity(2)).unwrap();

        store
            .upsert(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .unwrap();
        store.delete(&["a".to_string(), "missing".to_string()]).unwrap();

        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "b");
    }
}
