//! MySQL/MariaDB connector.
//!
//! Uses SQLx for connection pooling and async query execution.

use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use super::dialect::{split_qualified, MysqlDialect, MYSQL_MAX_PLACEHOLDERS};
use crate::config::{DatabaseConfig, DbType};
use crate::core::traits::backup_table_name;
use crate::core::{ColumnInfo, DatabaseConnector, Record, TableSchema, Value};
use crate::error::{Result, SyncError};

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

static NULL_VALUE: Value = Value::Null;

/// MariaDB/MySQL implementation of [`DatabaseConnector`].
pub struct MysqlConnector {
    name: String,
    config: DatabaseConfig,
    dialect: MysqlDialect,
    pool: RwLock<Option<MySqlPool>>,
}

impl MysqlConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            name: config.name.clone(),
            config,
            dialect: MysqlDialect::new(),
            pool: RwLock::new(None),
        }
    }

    fn pool(&self) -> Result<MySqlPool> {
        self.pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| SyncError::connection(&self.name, "not connected"))
    }

    fn ssl_mode(&self) -> MySqlSslMode {
        match self.config.sslmode.to_lowercase().as_str() {
            "disable" | "" => {
                warn!(
                    "MySQL TLS is disabled for {}. Credentials will be transmitted in plaintext.",
                    self.name
                );
                MySqlSslMode::Disabled
            }
            "prefer" => MySqlSslMode::Preferred,
            "require" => MySqlSslMode::Required,
            "verify-ca" | "verify_ca" => MySqlSslMode::VerifyCa,
            "verify-full" | "verify_identity" => MySqlSslMode::VerifyIdentity,
            other => {
                warn!("Unknown sslmode '{}', defaulting to Preferred", other);
                MySqlSslMode::Preferred
            }
        }
    }

    async fn table_exists(&self, pool: &MySqlPool, table: &str) -> Result<bool> {
        let (db, name) = split_qualified(table);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?",
        )
        .bind(db)
        .bind(name)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }
}

fn bind_value<'q>(query: MySqlQuery<'q>, value: &'q Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
    }
}

fn bind_all<'q>(mut query: MySqlQuery<'q>, args: &'q [Value]) -> MySqlQuery<'q> {
    for arg in args {
        query = bind_value(query, arg);
    }
    query
}

/// Decode one column, choosing the Rust type from the server-reported type.
fn decode_column(row: &MySqlRow, i: usize) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => {}
        _ => return Value::Null,
    }

    let type_name = row.columns()[i].type_info().name().to_ascii_uppercase();
    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(i).ok().map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(i).ok().map(Value::Int)
        }
        t if t.ends_with("UNSIGNED") => row.try_get::<u64, _>(i).ok().map(|v| {
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Decimal(Decimal::from(v)))
        }),
        "YEAR" => row.try_get::<u16, _>(i).ok().map(|v| Value::Int(i64::from(v))),
        "FLOAT" => row
            .try_get::<f32, _>(i)
            .ok()
            .map(|v| Value::Float(f64::from(v))),
        "DOUBLE" => row.try_get::<f64, _>(i).ok().map(Value::Float),
        "DECIMAL" => row.try_get::<Decimal, _>(i).ok().map(Value::Decimal),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(i).ok().map(Value::Date),
        "TIME" => row.try_get::<chrono::NaiveTime, _>(i).ok().map(Value::Time),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .ok()
            .map(Value::DateTime),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            row.try_get::<Vec<u8>, _>(i).ok().map(Value::Bytes)
        }
        _ => None,
    };

    decoded
        .or_else(|| row.try_get::<String, _>(i).ok().map(Value::Text))
        .or_else(|| row.try_get::<Vec<u8>, _>(i).ok().map(Value::Bytes))
        .unwrap_or(Value::Null)
}

fn row_to_record(row: &MySqlRow) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), decode_column(row, i)))
        .collect()
}

/// Text column that may come back as VARBINARY on some servers.
fn get_text(row: &MySqlRow, idx: usize) -> String {
    row.try_get::<String, _>(idx).unwrap_or_else(|_| {
        row.try_get::<Vec<u8>, _>(idx)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    })
}

#[async_trait]
impl DatabaseConnector for MysqlConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn db_type(&self) -> &str {
        DbType::MariaDb.as_str()
    }

    async fn connect(&self) -> Result<()> {
        let port = self.config.port_for(DbType::MariaDb);
        let options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(port)
            .database(&self.config.dbname)
            .username(&self.config.user)
            .password(&self.config.password)
            .ssl_mode(self.ssl_mode());

        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|e| SyncError::connection(&self.name, e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| SyncError::connection(&self.name, e))?;

        info!(
            "Connected to MariaDB {}: {}:{}/{}",
            self.name, self.config.host, port, self.config.dbname
        );

        *self.pool.write().unwrap_or_else(|e| e.into_inner()) = Some(pool);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let pool = self.pool()?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| SyncError::connection(&self.name, e))?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("Disconnected from MariaDB {}", self.name);
        }
        Ok(())
    }

    async fn get_count(&self, table: &str, schema: &TableSchema) -> Result<u64> {
        if !schema.has_primary_key() {
            return Err(SyncError::SchemaResolution(format!(
                "{}: primary key required for row count",
                table
            )));
        }
        let pool = self.pool()?;
        let count: i64 = sqlx::query_scalar(&self.dialect.count(table))
            .fetch_one(&pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn get_batch(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
        schema: &TableSchema,
    ) -> Result<Vec<Record>> {
        if !schema.has_primary_key() {
            return Err(SyncError::SchemaResolution(format!(
                "{}: primary key required for paginated reads",
                table
            )));
        }
        let pool = self.pool()?;
        let sql = self.dialect.select_batch(table, schema);
        let rows = sqlx::query(&sql)
            .bind(limit as u64)
            .bind(offset)
            .fetch_all(&pool)
            .await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let pool = self.pool()?;
        let (db, name) = split_qualified(table);

        let rows = sqlx::query(
            r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                CAST(IS_NULLABLE AS CHAR(3)) AS IS_NULLABLE,
                CAST(EXTRA AS CHAR(255)) AS EXTRA,
                CAST(COLUMN_KEY AS CHAR(3)) AS COLUMN_KEY
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(db)
        .bind(name)
        .fetch_all(&pool)
        .await?;

        if rows.is_empty() {
            return Err(SyncError::SchemaResolution(format!(
                "table {} not found on {}",
                table, self.name
            )));
        }

        let mut schema = TableSchema::default();
        let mut pk = Vec::new();
        for row in &rows {
            let name = get_text(row, 0);
            if get_text(row, 4) == "PRI" {
                pk.push(name.clone());
            }
            schema.columns.push(ColumnInfo {
                name,
                data_type: get_text(row, 1),
                is_nullable: get_text(row, 2).eq_ignore_ascii_case("YES"),
                auto_increment: get_text(row, 3).contains("auto_increment"),
            });
        }

        // KEY_COLUMN_USAGE gives composite keys in key order.
        let key_rows = sqlx::query(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
              AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            "#,
        )
        .bind(db)
        .bind(name)
        .fetch_all(&pool)
        .await?;
        if !key_rows.is_empty() {
            pk = key_rows.iter().map(|r| get_text(r, 0)).collect();
        }
        schema.primary_key = pk.join(",");

        let index_rows = sqlx::query(
            r#"
            SELECT CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX SEPARATOR ',') AS CHAR(1024))
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
              AND INDEX_NAME <> 'PRIMARY'
            GROUP BY INDEX_NAME
            ORDER BY INDEX_NAME
            "#,
        )
        .bind(db)
        .bind(name)
        .fetch_all(&pool)
        .await?;
        schema.indexes = index_rows.iter().map(|r| get_text(r, 0)).collect();

        debug!(
            "Described {}: {} columns, pk [{}], {} indexes",
            table,
            schema.columns.len(),
            schema.primary_key,
            schema.indexes.len()
        );
        Ok(schema)
    }

    async fn create_temp_table(
        &self,
        _original: &str,
        temp: &str,
        schema: &TableSchema,
    ) -> Result<()> {
        if !schema.has_columns() {
            return Err(SyncError::temp_table(temp, "schema has no columns"));
        }
        let pool = self.pool()?;
        sqlx::query(&self.dialect.drop_table(temp))
            .execute(&pool)
            .await?;
        sqlx::query(&self.dialect.create_table(temp, schema))
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn insert_batch(
        &self,
        table: &str,
        records: &[Record],
        columns: &[String],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = if columns.is_empty() {
            records[0].keys().cloned().collect()
        } else {
            columns.to_vec()
        };
        if columns.is_empty() {
            return Ok(0);
        }

        let pool = self.pool()?;
        let max_rows = (MYSQL_MAX_PLACEHOLDERS / columns.len()).max(1);
        let mut tx = pool.begin().await?;

        for chunk in records.chunks(max_rows) {
            let sql = self.dialect.insert(table, &columns, chunk.len());
            let mut query = sqlx::query(&sql);
            for record in chunk {
                for col in &columns {
                    query = bind_value(query, record.get(col).unwrap_or(&NULL_VALUE));
                }
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("MariaDB: wrote {} rows to {}", records.len(), table);
        Ok(records.len() as u64)
    }

    async fn swap_tables(&self, original: &str, temp: &str) -> Result<()> {
        let pool = self.pool()?;
        let backup = backup_table_name(original);

        if !self.table_exists(&pool, original).await? {
            info!("{} does not exist yet, renaming {} into place", original, temp);
            sqlx::query(&self.dialect.rename(temp, original))
                .execute(&pool)
                .await?;
            return Ok(());
        }

        sqlx::query(&self.dialect.drop_table(&backup))
            .execute(&pool)
            .await?;
        sqlx::query(&self.dialect.swap(original, &backup, temp))
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let pool = self.pool()?;
        sqlx::query(&self.dialect.drop_table(table))
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn execute_procedure(&self, name: &str, args: &[Value]) -> Result<u64> {
        let pool = self.pool()?;
        let sql = self.dialect.call(name, args.len());
        let result = bind_all(sqlx::query(&sql), args).execute(&pool).await?;
        Ok(result.rows_affected())
    }

    async fn execute_select(&self, query: &str, args: &[Value]) -> Result<Vec<Record>> {
        let pool = self.pool()?;
        let rows = bind_all(sqlx::query(query), args).fetch_all(&pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute_select_with_schema(&self, query: &str, args: &[Value]) -> Result<TableSchema> {
        let pool = self.pool()?;
        // Temporary tables are per-session, so everything runs on one connection.
        let mut conn = pool.acquire().await?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let probe = format!("dbswap_probe_{}", nanos);

        bind_all(sqlx::query(&self.dialect.probe_table(&probe, query)), args)
            .execute(&mut *conn)
            .await?;

        let described = sqlx::query(&format!("SHOW COLUMNS FROM {}", self.dialect.quote_ident(&probe)))
            .fetch_all(&mut *conn)
            .await;

        let drop_sql = format!(
            "DROP TEMPORARY TABLE IF EXISTS {}",
            self.dialect.quote_ident(&probe)
        );
        if let Err(e) = sqlx::query(&drop_sql).execute(&mut *conn).await {
            warn!("Failed to drop probe table {}: {}", probe, e);
        }

        // SHOW COLUMNS: Field, Type, Null, Key, Default, Extra
        let columns = described?
            .iter()
            .map(|row| ColumnInfo {
                name: get_text(row, 0),
                data_type: get_text(row, 1),
                is_nullable: get_text(row, 2).eq_ignore_ascii_case("YES"),
                auto_increment: get_text(row, 5).contains("auto_increment"),
            })
            .collect();

        Ok(TableSchema::new(columns))
    }
}
