//! SQLite record store.
//!
//! SQLite has no per-column case-insensitive LIKE: the `case_sensitive_like`
//! pragma is connection-wide, so it is applied by [`Database`] at connect
//! time (ON iff both filesystem and database are case-sensitive). Equality
//! comparisons follow column collation, which `ensure_schema` sets to
//! `NOCASE` for a case-insensitive database; the one mode that still needs
//! explicit `LOWER(…)` wrapping is an insensitive filesystem over a
//! sensitive database.

use async_trait::async_trait;
use exn::ResultExt;
use sqlx::Row as _;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use crate::error::{ErrorKind, Result};
use crate::mode::MatchingMode;
use crate::record::{NewRecord, Record};
use crate::Database;
use crate::store::{RecordStore, TableSpec};

pub struct SqliteStore {
    pool: SqlitePool,
    spec: TableSpec,
}

impl SqliteStore {
    /// Create a store over an existing [`Database`] connection.
    ///
    /// The matching mode is taken from the database handle so the LIKE
    /// pragma and the SQL built here can never disagree.
    pub fn new(db: &Database, table: impl Into<String>, cache_fields: &[String]) -> Result<Self> {
        let spec = TableSpec::new(table, cache_fields, db.mode())?;
        Ok(Self { pool: db.pool().clone(), spec })
    }

    /// Create the index table and its indexes if they don't exist.
    ///
    /// `dir` and `filename` are collated `NOCASE` exactly when the database
    /// side of the matching mode is case-insensitive; the `(dir, filename)`
    /// uniqueness therefore follows the database's own case rules.
    #[tracing::instrument(name = "ensuring index schema", skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        let collate = if self.spec.mode.insensitive_db() { " COLLATE NOCASE" } else { "" };
        let extras: String = self
            .spec
            .extra_fields
            .iter()
            .map(|field| format!("\n                {field} TEXT,"))
            .collect();
        let table = &self.spec.table;
        let hash = &self.spec.hash_field;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                fid INTEGER PRIMARY KEY AUTOINCREMENT,
                dir TEXT NOT NULL{collate},
                filename TEXT NOT NULL{collate},
                {hash} TEXT NOT NULL,{extras}
                UNIQUE (dir, filename)
            )
            "#,
        );
        sqlx::query(&ddl).execute(&self.pool).await.or_raise(|| ErrorKind::Schema)?;
        let index = format!("CREATE INDEX IF NOT EXISTS idx_{table}_{hash} ON {table} ({hash})");
        sqlx::query(&index).execute(&self.pool).await.or_raise(|| ErrorKind::Schema)?;
        Ok(())
    }

    fn dir_predicate(&self) -> &'static str {
        if self.spec.mode.need_sql_lowering() { "LOWER(dir) = ?" } else { "dir = ?" }
    }

    fn filename_predicate(&self) -> &'static str {
        if self.spec.mode.need_sql_lowering() { "LOWER(filename) = ?" } else { "filename = ?" }
    }

    fn row_to_record(&self, row: &SqliteRow) -> Result<Record> {
        let fid: i64 = row.try_get(0).or_raise(|| ErrorKind::Database)?;
        let dir: String = row.try_get(1).or_raise(|| ErrorKind::Database)?;
        let filename: String = row.try_get(2).or_raise(|| ErrorKind::Database)?;
        let hash: String = row.try_get(3).or_raise(|| ErrorKind::Database)?;
        let mut extra = Vec::with_capacity(self.spec.extra_fields.len());
        for (offset, field) in self.spec.extra_fields.iter().enumerate() {
            let value: Option<String> = row.try_get(4 + offset).or_raise(|| ErrorKind::Database)?;
            extra.push((field.clone(), value));
        }
        Ok(Record { fid, dir, filename, hash, extra })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn mode(&self) -> MatchingMode {
        self.spec.mode
    }

    async fn fetch_dir_records(&self, dir: &str) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY dir, filename",
            self.spec.select_list(),
            self.spec.table,
            self.dir_predicate(),
        );
        let rows = sqlx::query(&sql)
            .bind(self.spec.mode.key(dir))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.iter().map(|row| self.row_to_record(row)).collect()
    }

    async fn fetch_one(&self, dir: &str, filename: &str) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} AND {} ORDER BY dir, filename",
            self.spec.select_list(),
            self.spec.table,
            self.dir_predicate(),
            self.filename_predicate(),
        );
        let rows = sqlx::query(&sql)
            .bind(self.spec.mode.key(dir))
            .bind(self.spec.mode.key(filename))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.iter().map(|row| self.row_to_record(row)).collect()
    }

    async fn fetch_subdir_names(&self, dir: &str) -> Result<Vec<String>> {
        // The range predicate never matches the directory's own rows, so the
        // tail is non-empty and the root can't show up as its own child.
        let range = if dir.is_empty() { "dir <> ''" } else { "dir LIKE ? ESCAPE '\\'" };
        let sql = format!(
            r#"
            SELECT DISTINCT
                CASE WHEN instr(tail, '/') = 0 THEN tail ELSE substr(tail, 1, instr(tail, '/') - 1) END AS name
            FROM (SELECT substr(dir, ?) AS tail FROM {} WHERE {range})
            ORDER BY name
            "#,
            self.spec.table,
        );
        let mut query = sqlx::query(&sql).bind(self.spec.tail_start(dir));
        if !dir.is_empty() {
            query = query.bind(self.spec.subtree_pattern(dir));
        }
        let rows = query.fetch_all(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).or_raise(|| ErrorKind::Database))
            .collect()
    }

    async fn insert(&self, record: &NewRecord) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (dir, filename, {}) VALUES (?, ?, ?)",
            self.spec.table, self.spec.hash_field,
        );
        let result = sqlx::query(&sql)
            .bind(&record.dir)
            .bind(&record.filename)
            .bind(&record.hash)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, fid: i64, record: &NewRecord) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET dir = ?, filename = ?, {} = ? WHERE fid = ?",
            self.spec.table, self.spec.hash_field,
        );
        let result = sqlx::query(&sql)
            .bind(&record.dir)
            .bind(&record.filename)
            .bind(&record.hash)
            .bind(fid)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_by_fid(&self, fid: i64) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE fid = ?", self.spec.table);
        let result = sqlx::query(&sql).bind(fid).execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_files_in_dir(&self, dir: &str, filenames: &[String]) -> Result<u64> {
        if filenames.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; filenames.len()].join(", ");
        let name_column = if self.spec.mode.need_sql_lowering() { "LOWER(filename)" } else { "filename" };
        let sql = format!(
            "DELETE FROM {} WHERE {} AND {name_column} IN ({placeholders})",
            self.spec.table,
            self.dir_predicate(),
        );
        let mut query = sqlx::query(&sql).bind(self.spec.mode.key(dir));
        for filename in filenames {
            query = query.bind(self.spec.mode.key(filename));
        }
        let result = query.execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_subtree(&self, dir: &str) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {} OR dir LIKE ? ESCAPE '\\'",
            self.spec.table,
            self.dir_predicate(),
        );
        let result = sqlx::query(&sql)
            .bind(self.spec.mode.key(dir))
            .bind(self.spec.subtree_pattern(dir))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}
