//! PostgreSQL record store.
//!
//! Postgres expresses a case-insensitive range match with `ILIKE`, so that is
//! what the insensitive-filesystem/sensitive-database mode uses; in the
//! insensitive-database modes the table is expected to carry a
//! case-insensitive (ICU, nondeterministic) collation on `dir`/`filename`, so
//! plain comparisons already behave the way the engine assumes.

use async_trait::async_trait;
use exn::ResultExt;
use sqlx::Row as _;
use sqlx::postgres::{PgPool, PgRow};

use crate::error::{ErrorKind, Result};
use crate::mode::MatchingMode;
use crate::record::{NewRecord, Record};
use crate::store::{RecordStore, TableSpec};

/// Name of the case-insensitive collation `ensure_schema` creates when the
/// database side of the matching mode is insensitive.
const CI_COLLATION: &str = "findex_ci";

pub struct PostgresStore {
    pool: PgPool,
    spec: TableSpec,
}

impl PostgresStore {
    pub fn new(pool: PgPool, table: impl Into<String>, cache_fields: &[String], mode: MatchingMode) -> Result<Self> {
        let spec = TableSpec::new(table, cache_fields, mode)?;
        Ok(Self { pool, spec })
    }

    /// Create the index table and its indexes if they don't exist.
    #[tracing::instrument(name = "ensuring index schema", skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        let collate = if self.spec.mode.insensitive_db() {
            let collation = format!(
                "CREATE COLLATION IF NOT EXISTS {CI_COLLATION} \
                 (provider = icu, locale = 'und-u-ks-level2', deterministic = false)",
            );
            sqlx::query(&collation).execute(&self.pool).await.or_raise(|| ErrorKind::Schema)?;
            format!(" COLLATE {CI_COLLATION}")
        } else {
            String::new()
        };
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
                fid BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
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

    fn dir_predicate(&self, placeholder: usize) -> String {
        if self.spec.mode.need_sql_lowering() {
            format!("LOWER(dir) = ${placeholder}")
        } else {
            format!("dir = ${placeholder}")
        }
    }

    fn filename_predicate(&self, placeholder: usize) -> String {
        if self.spec.mode.need_sql_lowering() {
            format!("LOWER(filename) = ${placeholder}")
        } else {
            format!("filename = ${placeholder}")
        }
    }

    fn like_operator(&self) -> &'static str {
        if self.spec.mode.need_sql_lowering() { "ILIKE" } else { "LIKE" }
    }

    fn row_to_record(&self, row: &PgRow) -> Result<Record> {
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
impl RecordStore for PostgresStore {
    fn mode(&self) -> MatchingMode {
        self.spec.mode
    }

    async fn fetch_dir_records(&self, dir: &str) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY dir, filename",
            self.spec.select_list(),
            self.spec.table,
            self.dir_predicate(1),
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
            self.dir_predicate(1),
            self.filename_predicate(2),
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
        let range = if dir.is_empty() {
            "dir <> ''".to_owned()
        } else {
            format!("dir {} $2 ESCAPE '\\'", self.like_operator())
        };
        let sql = format!(
            r#"
            SELECT DISTINCT split_part(substr(dir, $1::int), '/', 1) AS name
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
            "INSERT INTO {} (dir, filename, {}) VALUES ($1, $2, $3) RETURNING fid",
            self.spec.table, self.spec.hash_field,
        );
        let row = sqlx::query(&sql)
            .bind(&record.dir)
            .bind(&record.filename)
            .bind(&record.hash)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.try_get(0).or_raise(|| ErrorKind::Database)
    }

    async fn update(&self, fid: i64, record: &NewRecord) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET dir = $1, filename = $2, {} = $3 WHERE fid = $4",
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
        let sql = format!("DELETE FROM {} WHERE fid = $1", self.spec.table);
        let result = sqlx::query(&sql).bind(fid).execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete_files_in_dir(&self, dir: &str, filenames: &[String]) -> Result<u64> {
        if filenames.is_empty() {
            return Ok(0);
        }
        let placeholders: Vec<String> = (0..filenames.len()).map(|i| format!("${}", i + 2)).collect();
        let name_column = if self.spec.mode.need_sql_lowering() { "LOWER(filename)" } else { "filename" };
        let sql = format!(
            "DELETE FROM {} WHERE {} AND {name_column} IN ({})",
            self.spec.table,
            self.dir_predicate(1),
            placeholders.join(", "),
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
            "DELETE FROM {} WHERE {} OR dir {} $2 ESCAPE '\\'",
            self.spec.table,
            self.dir_predicate(1),
            self.like_operator(),
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
