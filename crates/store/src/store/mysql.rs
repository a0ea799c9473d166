//! MySQL record store.
//!
//! MySQL has no ILIKE; forcing a case-insensitive range match on a
//! case-sensitive table is done by re-collating the column for the one
//! comparison (`dir COLLATE utf8mb4_0900_ai_ci LIKE …`). In the
//! insensitive-database modes the table collation is itself accent/case
//! insensitive and plain comparisons already match the filesystem's idea of
//! equality. Backslash is MySQL's default LIKE escape character, so the
//! shared pattern escaping applies without an ESCAPE clause.

use async_trait::async_trait;
use exn::ResultExt;
use sqlx::Row as _;
use sqlx::mysql::{MySqlPool, MySqlRow};

use crate::error::{ErrorKind, Result};
use crate::mode::MatchingMode;
use crate::record::{NewRecord, Record};
use crate::store::{RecordStore, TableSpec};

const CI_COLLATION: &str = "utf8mb4_0900_ai_ci";
const CS_COLLATION: &str = "utf8mb4_0900_as_cs";

pub struct MySqlStore {
    pool: MySqlPool,
    spec: TableSpec,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, table: impl Into<String>, cache_fields: &[String], mode: MatchingMode) -> Result<Self> {
        let spec = TableSpec::new(table, cache_fields, mode)?;
        Ok(Self { pool, spec })
    }

    /// Create the index table and its indexes if they don't exist.
    ///
    /// `dir`/`filename` are VARCHAR rather than TEXT so the composite unique
    /// key stays inside InnoDB's 3072-byte index limit with utf8mb4.
    #[tracing::instrument(name = "ensuring index schema", skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        let collation = if self.spec.mode.insensitive_db() { CI_COLLATION } else { CS_COLLATION };
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
                fid BIGINT AUTO_INCREMENT PRIMARY KEY,
                dir VARCHAR(512) NOT NULL COLLATE {collation},
                filename VARCHAR(255) NOT NULL COLLATE {collation},
                {hash} VARCHAR(128) NOT NULL,{extras}
                UNIQUE KEY uniq_dir_filename (dir, filename),
                KEY idx_{table}_{hash} ({hash})
            ) CHARACTER SET utf8mb4
            "#,
        );
        sqlx::query(&ddl).execute(&self.pool).await.or_raise(|| ErrorKind::Schema)?;
        Ok(())
    }

    fn dir_predicate(&self) -> &'static str {
        if self.spec.mode.need_sql_lowering() { "LOWER(dir) = ?" } else { "dir = ?" }
    }

    fn filename_predicate(&self) -> &'static str {
        if self.spec.mode.need_sql_lowering() { "LOWER(filename) = ?" } else { "filename = ?" }
    }

    fn dir_like(&self) -> String {
        if self.spec.mode.need_sql_lowering() {
            format!("dir COLLATE {CI_COLLATION} LIKE ?")
        } else {
            "dir LIKE ?".to_owned()
        }
    }

    fn row_to_record(&self, row: &MySqlRow) -> Result<Record> {
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
impl RecordStore for MySqlStore {
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
        let range = if dir.is_empty() { "dir <> ''".to_owned() } else { self.dir_like() };
        let sql = format!(
            r#"
            SELECT DISTINCT SUBSTRING_INDEX(SUBSTRING(dir, ?), '/', 1) AS name
            FROM {} WHERE {range}
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
        i64::try_from(result.last_insert_id()).or_raise(|| ErrorKind::InvalidData("fid"))
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
            "DELETE FROM {} WHERE {} OR {}",
            self.spec.table,
            self.dir_predicate(),
            self.dir_like(),
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
