//! SQLite Storage Implementation
//!
//! Document store with FTS5 lexical retrieval and embedding blobs for
//! semantic retrieval, plus file records, repositories and initiatives.

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::migrations::{self, MigrationError, MigrationRunner, MigrationStatus, SchemaVersion};
use super::{
    DocumentFilter, DocumentStore, FileRecord, InitiativeStore, RepositoryRecord, ScoredHit,
};
use crate::embeddings::{cosine_similarity, vector_from_bytes, vector_to_bytes};
use crate::initiative::{Initiative, InitiativeStatus};
use crate::memory::Document;
use crate::search::tokenize_code;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Schema migration failed while opening the store
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

const DOC_COLUMNS: &str = "d.id, d.doc_type, d.repository, d.branch, d.path, d.initiative_id, \
                           d.content, d.tags, d.metadata, d.created_at, d.updated_at";

const INITIATIVE_COLUMNS: &str = "id, repository, name, goal, status, focused, status_text, \
                                  summary, created_at, last_activity_at, completed_at";

// ============================================================================
// STORAGE
// ============================================================================

/// SQLite document store
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self`, making Storage `Send + Sync` so components can
/// share an `Arc<Storage>`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl Storage {
    /// Apply connection pragmas
    pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
        // Apply encryption key if SQLCipher is enabled and key is provided
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("ENGRAM_ENCRYPTION_KEY")
                && !key.is_empty()
            {
                conn.pragma_update(None, "key", &key)?;
            }
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA journal_size_limit = 67108864;",
        )?;

        Ok(())
    }

    /// Open (creating if needed) and migrate the database
    ///
    /// `None` uses `engram.db` in the platform data directory. Pending
    /// migrations run before any connection is handed out.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        Self::with_migrations(db_path, &MigrationRunner::default())
    }

    /// Open with a specific migration runner
    pub fn with_migrations(db_path: Option<PathBuf>, runner: &MigrationRunner) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => crate::config::default_data_dir().join("engram.db"),
        };
        if let Some(data_dir) = path.parent() {
            std::fs::create_dir_all(data_dir)?;
            // Restrict directory permissions to owner-only on Unix
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                let _ = std::fs::set_permissions(data_dir, perms);
            }
        }

        runner.run(&path)?;

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current schema version and history
    pub fn schema_version(&self) -> Result<SchemaVersion> {
        let reader = self.reader()?;
        Ok(migrations::schema_version(&reader)?)
    }

    /// Schema state relative to `runner`
    pub fn migration_status(&self, runner: &MigrationRunner) -> Result<MigrationStatus> {
        let writer = self.writer()?;
        Ok(runner.status(&writer)?)
    }

    /// Snapshot the live database to `dest`
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        let writer = self.writer()?;
        super::backup::backup_to(&writer, dest)
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn ids_matching(conn: &Connection, filter: &DocumentFilter) -> Result<Vec<String>> {
        let (clause, args) = filter.to_sql("d");
        let sql = format!("SELECT d.id FROM documents d WHERE {clause} ORDER BY d.id");
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
    let doc_type: String = row.get(1)?;
    let tags: String = row.get(7)?;
    Ok(Document {
        id: row.get(0)?,
        doc_type: doc_type.parse().map_err(|e| conversion_error(1, e))?,
        repository: row.get(2)?,
        branch: row.get(3)?,
        path: row.get(4)?,
        initiative_id: row.get(5)?,
        content: row.get(6)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_error(7, e.to_string()))?,
        metadata: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_initiative(row: &Row) -> rusqlite::Result<Initiative> {
    let status: String = row.get(4)?;
    Ok(Initiative {
        id: row.get(0)?,
        repository: row.get(1)?,
        name: row.get(2)?,
        goal: row.get(3)?,
        status: status.parse().map_err(|e| conversion_error(4, e))?,
        focused: row.get::<_, i64>(5)? != 0,
        status_text: row.get(6)?,
        summary: row.get(7)?,
        created_at: row.get(8)?,
        last_activity_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn row_to_file_record(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        repository: row.get(0)?,
        path: row.get(1)?,
        content_hash: row.get(2)?,
        indexed_at: row.get(3)?,
        branch: row.get(4)?,
    })
}

/// Text indexed for lexical retrieval: content plus path and tags
fn index_tokens(doc: &Document) -> String {
    let mut text = String::with_capacity(doc.content.len() + 64);
    if let Some(path) = &doc.path {
        text.push_str(path);
        text.push(' ');
    }
    for tag in &doc.tags {
        text.push_str(tag);
        text.push(' ');
    }
    text.push_str(&doc.content);
    tokenize_code(&text).join(" ")
}

/// FTS5 MATCH expression OR-ing quoted terms
fn match_expression(terms: &[String]) -> Option<String> {
    let mut seen = std::collections::BTreeSet::new();
    let quoted: Vec<String> = terms
        .iter()
        .filter(|t| !t.is_empty() && seen.insert(t.as_str()))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if quoted.is_empty() {
        None
    } else {
        Some(quoted.join(" OR "))
    }
}

fn sort_hits(hits: &mut [ScoredHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

impl DocumentStore for Storage {
    fn upsert(&self, doc: &Document, embedding: Option<&[f32]>) -> Result<()> {
        let tokens = index_tokens(doc);
        let tags = serde_json::to_string(&doc.tags)
            .map_err(|e| StorageError::Init(format!("Failed to encode tags: {}", e)))?;

        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute(
            "INSERT INTO documents (id, doc_type, repository, branch, path, initiative_id,
                                    content, tags, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                doc_type = excluded.doc_type,
                path = excluded.path,
                initiative_id = excluded.initiative_id,
                content = excluded.content,
                tags = excluded.tags,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                doc.id,
                doc.doc_type.as_str(),
                doc.repository,
                doc.branch,
                doc.path,
                doc.initiative_id,
                doc.content,
                tags,
                doc.metadata,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        tx.execute("DELETE FROM documents_fts WHERE document_id = ?1", [&doc.id])?;
        tx.execute(
            "INSERT INTO documents_fts (document_id, tokens) VALUES (?1, ?2)",
            params![doc.id, tokens],
        )?;
        match embedding {
            Some(vector) => tx.execute(
                "INSERT OR REPLACE INTO document_embeddings (document_id, embedding, dimensions)
                 VALUES (?1, ?2, ?3)",
                params![doc.id, vector_to_bytes(vector), vector.len() as i64],
            )?,
            None => tx.execute(
                "DELETE FROM document_embeddings WHERE document_id = ?1",
                [&doc.id],
            )?,
        };
        tx.commit()?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Document>> {
        let reader = self.reader()?;
        let sql = format!("SELECT {DOC_COLUMNS} FROM documents d WHERE d.id = ?1");
        Ok(reader.query_row(&sql, [id], row_to_document).optional()?)
    }

    fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<bool> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE documents SET metadata = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, metadata, Utc::now()],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute("DELETE FROM documents_fts WHERE document_id = ?1", [id])?;
        tx.execute("DELETE FROM document_embeddings WHERE document_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM documents WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn delete_where(&self, filter: &DocumentFilter) -> Result<usize> {
        let mut writer = self.writer()?;
        let ids = Self::ids_matching(&writer, filter)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = writer.transaction()?;
        let mut removed = 0;
        for id in &ids {
            tx.execute("DELETE FROM documents_fts WHERE document_id = ?1", [id])?;
            tx.execute("DELETE FROM document_embeddings WHERE document_id = ?1", [id])?;
            removed += tx.execute("DELETE FROM documents WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn find(&self, filter: &DocumentFilter, limit: usize) -> Result<Vec<Document>> {
        let reader = self.reader()?;
        let (clause, args) = filter.to_sql("d");
        let sql = format!(
            "SELECT {DOC_COLUMNS} FROM documents d WHERE {clause} ORDER BY d.id LIMIT {limit}"
        );
        let mut stmt = reader.prepare(&sql)?;
        let docs = stmt
            .query_map(params_from_iter(args.iter()), row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    fn count(&self, filter: &DocumentFilter) -> Result<usize> {
        let reader = self.reader()?;
        let (clause, args) = filter.to_sql("d");
        let sql = format!("SELECT COUNT(*) FROM documents d WHERE {clause}");
        let count: i64 = reader.query_row(&sql, params_from_iter(args.iter()), |r| r.get(0))?;
        Ok(count as usize)
    }

    fn semantic_query(
        &self,
        embedding: &[f32],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredHit>> {
        if embedding.is_empty() || limit == 0 {
            return Ok(vec![]);
        }
        let reader = self.reader()?;
        let (clause, args) = filter.to_sql("d");
        let sql = format!(
            "SELECT {DOC_COLUMNS}, e.embedding FROM documents d
             JOIN document_embeddings e ON e.document_id = d.id
             WHERE {clause}"
        );
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            let doc = row_to_document(row)?;
            let blob: Vec<u8> = row.get(11)?;
            Ok((doc, blob))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (document, blob) = row?;
            let vector = vector_from_bytes(&blob);
            if vector.len() != embedding.len() {
                continue;
            }
            hits.push(ScoredHit {
                score: cosine_similarity(embedding, &vector),
                document,
            });
        }
        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    fn lexical_query(
        &self,
        terms: &[String],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredHit>> {
        let Some(expression) = match_expression(terms) else {
            return Ok(vec![]);
        };
        if limit == 0 {
            return Ok(vec![]);
        }
        let reader = self.reader()?;
        let (clause, args) = filter.to_sql("d");
        let sql = format!(
            "SELECT {DOC_COLUMNS}, bm25(documents_fts) AS rank FROM documents_fts
             JOIN documents d ON d.id = documents_fts.document_id
             WHERE documents_fts MATCH ? AND {clause}
             ORDER BY rank ASC, d.id ASC
             LIMIT {limit}"
        );
        let mut bound = Vec::with_capacity(args.len() + 1);
        bound.push(expression);
        bound.extend(args);

        let mut stmt = reader.prepare(&sql)?;
        let mut hits = stmt
            .query_map(params_from_iter(bound.iter()), |row| {
                let document = row_to_document(row)?;
                let rank: f64 = row.get(11)?;
                // bm25() is lower-is-better
                Ok(ScoredHit {
                    document,
                    score: (-rank) as f32,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        sort_hits(&mut hits);
        Ok(hits)
    }

    fn upsert_file_record(&self, record: &FileRecord) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO file_records (repository, path, content_hash, indexed_at, branch)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(repository, path) DO UPDATE SET
                content_hash = excluded.content_hash,
                indexed_at = excluded.indexed_at,
                branch = excluded.branch",
            params![
                record.repository,
                record.path,
                record.content_hash,
                record.indexed_at,
                record.branch
            ],
        )?;
        Ok(())
    }

    fn file_record(&self, repository: &str, path: &str) -> Result<Option<FileRecord>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                "SELECT repository, path, content_hash, indexed_at, branch
                 FROM file_records WHERE repository = ?1 AND path = ?2",
                [repository, path],
                row_to_file_record,
            )
            .optional()?)
    }

    fn file_records(&self, repository: &str) -> Result<Vec<FileRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT repository, path, content_hash, indexed_at, branch
             FROM file_records WHERE repository = ?1 ORDER BY path",
        )?;
        let records = stmt
            .query_map([repository], row_to_file_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn delete_file_record(&self, repository: &str, path: &str) -> Result<bool> {
        let writer = self.writer()?;
        let removed = writer.execute(
            "DELETE FROM file_records WHERE repository = ?1 AND path = ?2",
            [repository, path],
        )?;
        Ok(removed > 0)
    }

    fn register_repository(&self, name: &str, root_path: &Path) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO repositories (name, root_path, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                root_path = excluded.root_path,
                updated_at = excluded.updated_at",
            params![name, root_path.to_string_lossy(), Utc::now()],
        )?;
        Ok(())
    }

    fn repository(&self, name: &str) -> Result<Option<RepositoryRecord>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                "SELECT name, root_path, updated_at FROM repositories WHERE name = ?1",
                [name],
                |row| {
                    Ok(RepositoryRecord {
                        name: row.get(0)?,
                        root_path: PathBuf::from(row.get::<_, String>(1)?),
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }
}

// ============================================================================
// INITIATIVE STORE
// ============================================================================

impl InitiativeStore for Storage {
    fn insert_initiative(&self, initiative: &Initiative) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        if initiative.focused {
            tx.execute(
                "UPDATE initiatives SET focused = 0 WHERE repository = ?1 AND focused = 1",
                [&initiative.repository],
            )?;
        }
        tx.execute(
            &format!(
                "INSERT INTO initiatives ({INITIATIVE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                initiative.id,
                initiative.repository,
                initiative.name,
                initiative.goal,
                initiative.status.as_str(),
                initiative.focused as i64,
                initiative.status_text,
                initiative.summary,
                initiative.created_at,
                initiative.last_activity_at,
                initiative.completed_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_initiative(&self, initiative: &Initiative) -> Result<()> {
        let writer = self.writer()?;
        let updated = writer.execute(
            "UPDATE initiatives SET
                goal = ?2, status = ?3, focused = ?4, status_text = ?5, summary = ?6,
                last_activity_at = ?7, completed_at = ?8
             WHERE id = ?1",
            params![
                initiative.id,
                initiative.goal,
                initiative.status.as_str(),
                initiative.focused as i64,
                initiative.status_text,
                initiative.summary,
                initiative.last_activity_at,
                initiative.completed_at,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("initiative {}", initiative.id)));
        }
        Ok(())
    }

    fn initiative(&self, id: &str) -> Result<Option<Initiative>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                &format!("SELECT {INITIATIVE_COLUMNS} FROM initiatives WHERE id = ?1"),
                [id],
                row_to_initiative,
            )
            .optional()?)
    }

    fn initiative_by_name(&self, repository: &str, name: &str) -> Result<Option<Initiative>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                &format!(
                    "SELECT {INITIATIVE_COLUMNS} FROM initiatives
                     WHERE repository = ?1 AND name = ?2 COLLATE NOCASE"
                ),
                [repository, name],
                row_to_initiative,
            )
            .optional()?)
    }

    fn initiatives(
        &self,
        repository: &str,
        status: Option<InitiativeStatus>,
    ) -> Result<Vec<Initiative>> {
        let reader = self.reader()?;
        let mut args = vec![repository.to_string()];
        let mut sql = format!("SELECT {INITIATIVE_COLUMNS} FROM initiatives WHERE repository = ?");
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY last_activity_at DESC, id ASC");
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), row_to_initiative)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn focused_initiative(&self, repository: &str) -> Result<Option<Initiative>> {
        let reader = self.reader()?;
        Ok(reader
            .query_row(
                &format!(
                    "SELECT {INITIATIVE_COLUMNS} FROM initiatives
                     WHERE repository = ?1 AND focused = 1"
                ),
                [repository],
                row_to_initiative,
            )
            .optional()?)
    }

    fn set_focus(&self, repository: &str, id: &str) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute(
            "UPDATE initiatives SET focused = 0 WHERE repository = ?1 AND focused = 1",
            [repository],
        )?;
        let updated = tx.execute(
            "UPDATE initiatives SET focused = 1 WHERE repository = ?1 AND id = ?2",
            [repository, id],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls back the unfocus
            return Err(StorageError::NotFound(format!("initiative {}", id)));
        }
        tx.commit()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::DocumentType;
    use tempfile::tempdir;

    fn create_test_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("test.db"))).unwrap();
        (storage, dir)
    }

    fn code_doc(id: &str, path: &str, branch: &str, content: &str) -> Document {
        let mut doc = Document::new(id, DocumentType::Code, "repo", content);
        doc.path = Some(path.to_string());
        doc.branch = Some(branch.to_string());
        doc
    }

    #[test]
    fn test_upsert_get_delete() {
        let (storage, _dir) = create_test_storage();
        let doc = code_doc("code:1", "src/auth.py", "main", "def login(user): pass");
        storage.upsert(&doc, Some(&[1.0, 0.0])).unwrap();

        let loaded = storage.get("code:1").unwrap().unwrap();
        assert_eq!(loaded.content, doc.content);
        assert_eq!(loaded.path.as_deref(), Some("src/auth.py"));

        assert!(storage.delete("code:1").unwrap());
        assert!(storage.get("code:1").unwrap().is_none());
        assert!(!storage.delete("code:1").unwrap());
    }

    #[test]
    fn test_upsert_keeps_repository_and_branch() {
        let (storage, _dir) = create_test_storage();
        let doc = code_doc("code:1", "a.py", "feature-x", "v1");
        storage.upsert(&doc, None).unwrap();

        let mut changed = doc.clone();
        changed.branch = Some("main".into());
        changed.repository = "other".into();
        changed.content = "v2".into();
        storage.upsert(&changed, None).unwrap();

        let loaded = storage.get("code:1").unwrap().unwrap();
        assert_eq!(loaded.content, "v2");
        assert_eq!(loaded.branch.as_deref(), Some("feature-x"));
        assert_eq!(loaded.repository, "repo");
    }

    #[test]
    fn test_lexical_matches_across_naming_conventions() {
        let (storage, _dir) = create_test_storage();
        storage
            .upsert(&code_doc("code:1", "a.py", "main", "def get_user_name(): pass"), None)
            .unwrap();
        storage
            .upsert(&code_doc("code:2", "b.py", "main", "def unrelated(): pass"), None)
            .unwrap();

        let terms = tokenize_code("getUserName");
        let hits = storage
            .lexical_query(&terms, &DocumentFilter::repository("repo"), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "code:1");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_semantic_query_orders_by_similarity() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&code_doc("code:a", "a.py", "main", "a"), Some(&[1.0, 0.0])).unwrap();
        storage.upsert(&code_doc("code:b", "b.py", "main", "b"), Some(&[0.6, 0.8])).unwrap();
        storage.upsert(&code_doc("code:c", "c.py", "main", "c"), Some(&[1.0, 0.0, 0.0])).unwrap();

        let hits = storage
            .semantic_query(&[1.0, 0.0], &DocumentFilter::default(), 10)
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.document.id.as_str()).collect();
        // Mismatched dimensions are skipped
        assert_eq!(ids, vec!["code:a", "code:b"]);
    }

    #[test]
    fn test_branch_filter_in_queries() {
        let (storage, _dir) = create_test_storage();
        storage
            .upsert(&code_doc("code:x", "x.py", "feature-x", "token refresh"), None)
            .unwrap();
        let mut note = Document::new("note:1", DocumentType::Note, "repo", "token refresh decision");
        note.branch = Some("feature-x".into());
        storage.upsert(&note, None).unwrap();

        let filter = DocumentFilter::repository("repo").with_branches(vec!["main".into()]);
        let hits = storage.lexical_query(&["token".to_string()], &filter, 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["note:1"]);
    }

    #[test]
    fn test_delete_where_by_path() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&code_doc("code:1", "b.py", "main", "one"), None).unwrap();
        storage.upsert(&code_doc("code:2", "b.py", "main", "two"), None).unwrap();
        storage.upsert(&code_doc("code:3", "a.py", "main", "three"), None).unwrap();

        let filter = DocumentFilter::repository("repo")
            .with_types(vec![DocumentType::Code])
            .with_path("b.py");
        assert_eq!(storage.delete_where(&filter).unwrap(), 2);
        assert_eq!(storage.count(&DocumentFilter::repository("repo")).unwrap(), 1);
        let hits = storage
            .lexical_query(&["two".to_string()], &DocumentFilter::default(), 10)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_file_records_unique_per_path() {
        let (storage, _dir) = create_test_storage();
        let mut record = FileRecord {
            repository: "repo".into(),
            path: "a.py".into(),
            content_hash: "h1".into(),
            indexed_at: Utc::now(),
            branch: "main".into(),
        };
        storage.upsert_file_record(&record).unwrap();
        record.content_hash = "h2".into();
        storage.upsert_file_record(&record).unwrap();

        let records = storage.file_records("repo").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content_hash, "h2");
        assert!(storage.delete_file_record("repo", "a.py").unwrap());
        assert!(storage.file_record("repo", "a.py").unwrap().is_none());
    }

    #[test]
    fn test_set_focus_is_exclusive() {
        let (storage, _dir) = create_test_storage();
        let a = Initiative::new("repo", "Alpha", None);
        let b = Initiative::new("repo", "Beta", None);
        storage.insert_initiative(&a).unwrap();
        storage.insert_initiative(&b).unwrap();

        let focused = storage.focused_initiative("repo").unwrap().unwrap();
        assert_eq!(focused.id, b.id);

        storage.set_focus("repo", &a.id).unwrap();
        let all = storage.initiatives("repo", None).unwrap();
        assert_eq!(all.iter().filter(|i| i.focused).count(), 1);
        assert_eq!(storage.focused_initiative("repo").unwrap().unwrap().id, a.id);

        assert!(storage.set_focus("repo", "initiative:missing").is_err());
        assert_eq!(storage.focused_initiative("repo").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_repository_registry() {
        let (storage, dir) = create_test_storage();
        storage.register_repository("repo", dir.path()).unwrap();
        let record = storage.repository("repo").unwrap().unwrap();
        assert_eq!(record.root_path, dir.path());
        assert!(storage.repository("missing").unwrap().is_none());
    }
}
