//! PostgreSQL connector backed by a deadpool-postgres pool.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use super::dialect::{PostgresDialect, PG_MAX_PARAMS};
use super::value::{params, row_to_record};
use crate::config::{DatabaseConfig, DbType};
use crate::core::traits::backup_table_name;
use crate::core::{ColumnInfo, DatabaseConnector, Record, TableSchema, Value};
use crate::drivers::common::TlsBuilder;
use crate::error::{Result, SyncError};

static NULL_VALUE: Value = Value::Null;

/// PostgreSQL implementation of [`DatabaseConnector`].
pub struct PostgresConnector {
    name: String,
    config: DatabaseConfig,
    dialect: PostgresDialect,
    pool: RwLock<Option<Pool>>,
}

impl PostgresConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            name: config.name.clone(),
            config,
            dialect: PostgresDialect::new(),
            pool: RwLock::new(None),
        }
    }

    async fn client(&self) -> Result<Object> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| SyncError::connection(&self.name, "not connected"))?;
        pool.get()
            .await
            .map_err(|e| SyncError::pool(e, format!("acquiring connection to {}", self.name)))
    }

    fn pg_config(&self) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.config.host);
        pg_config.port(self.config.port_for(DbType::Postgres));
        pg_config.dbname(&self.config.dbname);
        pg_config.user(&self.config.user);
        pg_config.password(&self.config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(self.config.connect_timeout());
        pg_config
    }

    fn build_pool(&self) -> Result<Pool> {
        let tls = TlsBuilder::parse(&self.config.sslmode)?;
        let mut pg_config = self.pg_config();
        pg_config.ssl_mode(tls.ssl_mode().to_pg());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let max_size = self.config.max_connections as usize;

        let pool = match tls.build()? {
            None => {
                warn!(
                    "PostgreSQL TLS is disabled for {}. Credentials will be transmitted in plaintext.",
                    self.name
                );
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr).max_size(max_size).build()
            }
            Some(connector) => {
                let mgr = Manager::from_config(pg_config, connector, mgr_config);
                Pool::builder(mgr).max_size(max_size).build()
            }
        };
        pool.map_err(|e| SyncError::pool(e, format!("creating PostgreSQL pool for {}", self.name)))
    }
}

#[async_trait]
impl DatabaseConnector for PostgresConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn db_type(&self) -> &str {
        DbType::Postgres.as_str()
    }

    async fn connect(&self) -> Result<()> {
        let pool = self.build_pool()?;

        let client = pool
            .get()
            .await
            .map_err(|e| SyncError::connection(&self.name, e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::connection(&self.name, e))?;
        drop(client);

        info!(
            "Connected to PostgreSQL {}: {}:{}/{}",
            self.name,
            self.config.host,
            self.config.port_for(DbType::Postgres),
            self.config.dbname
        );

        *self.pool.write().unwrap_or_else(|e| e.into_inner()) = Some(pool);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::connection(&self.name, e))?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let pool = self.pool.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.close();
            info!("Disconnected from PostgreSQL {}", self.name);
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
        let client = self.client().await?;
        let sql = self.dialect.count(table);
        let row = client.query_one(sql.as_str(), &[]).await?;
        let count: i64 = row.get(0);
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
        let client = self.client().await?;
        let limit = limit as i64;
        let offset = offset as i64;
        let sql = self.dialect.select_batch(table, schema);
        let rows = client.query(sql.as_str(), &[&limit, &offset]).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let client = self.client().await?;
        let regclass = self.dialect.quote_table(table);

        let rows = client
            .query(
                r#"
                SELECT a.attname::text,
                       format_type(a.atttypid, a.atttypmod),
                       NOT a.attnotnull,
                       (a.attidentity <> '' OR COALESCE(pg_get_expr(d.adbin, d.adrelid), '') LIKE 'nextval(%')
                FROM pg_attribute a
                LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
                WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped
                ORDER BY a.attnum
                "#,
                &[&regclass],
            )
            .await?;

        if rows.is_empty() {
            return Err(SyncError::SchemaResolution(format!(
                "table {} not found on {}",
                table, self.name
            )));
        }

        let columns = rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get(2),
                auto_increment: row.get(3),
            })
            .collect();
        let mut schema = TableSchema::new(columns);

        // indkey is an int2vector; unnest WITH ORDINALITY keeps key order.
        let index_rows = client
            .query(
                r#"
                SELECT i.indisprimary,
                       string_agg(a.attname::text, ',' ORDER BY k.ord)
                FROM pg_index i
                CROSS JOIN LATERAL unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                WHERE i.indrelid = to_regclass($1)
                GROUP BY i.indexrelid, i.indisprimary
                ORDER BY i.indexrelid
                "#,
                &[&regclass],
            )
            .await?;

        for row in &index_rows {
            let is_primary: bool = row.get(0);
            let cols: Option<String> = row.get(1);
            let Some(cols) = cols else { continue };
            if is_primary {
                schema.primary_key = cols;
            } else {
                schema.indexes.push(cols);
            }
        }

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
        let client = self.client().await?;
        client
            .batch_execute(&self.dialect.drop_table(temp))
            .await?;
        for statement in self.dialect.create_table(temp, schema) {
            client.batch_execute(&statement).await?;
        }
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

        let mut client = self.client().await?;
        let max_rows = (PG_MAX_PARAMS / columns.len()).max(1);
        let tx = client.transaction().await?;

        for chunk in records.chunks(max_rows) {
            let sql = self.dialect.insert(table, &columns, chunk.len());
            let stmt = tx.prepare(&sql).await?;
            let values: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|record| {
                    columns.iter().map(move |col| {
                        record.get(col).unwrap_or(&NULL_VALUE) as &(dyn ToSql + Sync)
                    })
                })
                .collect();
            tx.execute(&stmt, &values).await?;
        }

        tx.commit().await?;
        debug!("PostgreSQL: wrote {} rows to {}", records.len(), table);
        Ok(records.len() as u64)
    }

    async fn swap_tables(&self, original: &str, temp: &str) -> Result<()> {
        let mut client = self.client().await?;
        let backup = backup_table_name(original);

        let tx = client.transaction().await?;
        let exists: bool = tx
            .query_one(
                "SELECT to_regclass($1) IS NOT NULL",
                &[&self.dialect.quote_table(original)],
            )
            .await?
            .get(0);
        if !exists {
            info!("{} does not exist yet, renaming {} into place", original, temp);
            tx.batch_execute(&self.dialect.rename(temp, original)).await?;
        } else {
            for statement in self.dialect.swap(original, &backup, temp) {
                tx.batch_execute(&statement).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(&self.dialect.drop_table(table))
            .await?;
        Ok(())
    }

    async fn execute_procedure(&self, name: &str, args: &[Value]) -> Result<u64> {
        let client = self.client().await?;
        let sql = self.dialect.call(name, args.len());
        Ok(client.execute(sql.as_str(), &params(args)).await?)
    }

    async fn execute_select(&self, query: &str, args: &[Value]) -> Result<Vec<Record>> {
        let client = self.client().await?;
        let rows = client.query(query, &params(args)).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute_select_with_schema(&self, query: &str, _args: &[Value]) -> Result<TableSchema> {
        let client = self.client().await?;
        // Preparing describes the result set without executing the query.
        let stmt = client.prepare(query).await?;
        let columns = stmt
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_().name()))
            .collect();
        Ok(TableSchema::new(columns))
    }
}
