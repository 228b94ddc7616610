//! Postgres-protocol warehouse (Postgres or Redshift) over `tokio-postgres`.

use std::time::Duration;

use async_trait::async_trait;
use lakeload_types::dataset::Dataset;
use lakeload_types::error::EtlError;
use lakeload_types::schema::{TableName, TableSchema};
use pg_escape::quote_identifier;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use super::{
    check_compatibility, render_value, type_map, EnsuredTable, ExistingColumn, Warehouse,
};
use crate::config::types::DestinationConfig;

/// Bind-parameter ceiling of the wire protocol.
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per INSERT statement.
const CHUNK_SIZE: usize = 1_000;

fn format_pg_error(prefix: &str, error: &tokio_postgres::Error) -> String {
    if let Some(db_error) = error.as_db_error() {
        let detail = db_error.detail().unwrap_or("n/a");
        let hint = db_error.hint().unwrap_or("n/a");
        format!(
            "{prefix}: {} (sqlstate={} severity={} detail={} hint={})",
            db_error.message(),
            db_error.code().code(),
            db_error.severity(),
            detail,
            hint
        )
    } else {
        format!("{prefix}: {error}")
    }
}

fn qualified_name(table: &TableName) -> String {
    format!(
        "{}.{}",
        quote_identifier(&table.schema),
        quote_identifier(&table.name)
    )
}

fn create_table_sql(table: &TableName, schema: &TableSchema) -> String {
    let columns_ddl: Vec<String> = schema
        .columns
        .iter()
        .map(|column| {
            let nullable = if column.nullable { "" } else { " NOT NULL" };
            format!(
                "{} {}{}",
                quote_identifier(&column.name),
                type_map::ddl_type(column.column_type),
                nullable
            )
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_name(table),
        columns_ddl.join(", ")
    )
}

/// Build a multi-row INSERT casting text parameters to each column's type.
fn insert_sql(table: &TableName, column_names: &[&str], sql_types: &[&str], rows: usize) -> String {
    let columns = column_names
        .iter()
        .map(|c| quote_identifier(c).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    let width = column_names.len();
    let mut sql = format!("INSERT INTO {} ({columns}) VALUES ", qualified_name(table));
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (col, sql_type) in sql_types.iter().enumerate() {
            if col > 0 {
                sql.push_str(", ");
            }
            let param = row * width + col + 1;
            sql.push_str(&format!("${param}::text::{sql_type}"));
        }
        sql.push(')');
    }
    sql
}

fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).clamp(1, CHUNK_SIZE)
}

/// Warehouse reached over the Postgres wire protocol.
pub struct PostgresWarehouse {
    client: Mutex<Client>,
    label: String,
}

impl PostgresWarehouse {
    /// Connect using the destination settings.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::TransientIo`] if the connection cannot be
    /// established.
    pub async fn connect(config: &DestinationConfig) -> Result<Self, EtlError> {
        let mut pg = PgConfig::new();
        pg.host(&config.host);
        pg.port(config.port);
        pg.user(&config.user);
        if !config.password.is_empty() {
            pg.password(&config.password);
        }
        pg.dbname(&config.database);
        pg.connect_timeout(Duration::from_secs(10));

        let label = format!("{}:{}/{}", config.host, config.port, config.database);
        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| EtlError::transient_io(format!("connect to {label}"), e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Warehouse connection error");
            }
        });

        tracing::debug!(warehouse = %label, "Connected to warehouse");
        Ok(Self {
            client: Mutex::new(client),
            label,
        })
    }

    /// Fetch existing column names, types, and nullability from `information_schema`.
    async fn existing_columns(
        client: &Client,
        table: &TableName,
    ) -> Result<Vec<ExistingColumn>, EtlError> {
        let rows = client
            .query(
                "SELECT column_name, data_type, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&table.schema, &table.name],
            )
            .await
            .map_err(|e| EtlError::transient_io(format!("read columns of {table}"), e))?;

        Ok(rows
            .iter()
            .map(|r| {
                let name: String = r.get(0);
                let data_type: String = r.get(1);
                let nullable: String = r.get(2);
                ExistingColumn {
                    name,
                    data_type,
                    nullable: nullable == "YES",
                }
            })
            .collect())
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn ensure_table(
        &self,
        table: &TableName,
        schema: &TableSchema,
    ) -> Result<EnsuredTable, EtlError> {
        let client = self.client.lock().await;
        let existing = Self::existing_columns(&client, table).await?;
        if !existing.is_empty() {
            return check_compatibility(table, schema, &existing);
        }

        client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_identifier(&table.schema)
            ))
            .await
            .map_err(|e| {
                EtlError::transient_io(
                    format_pg_error(&format!("create schema {}", table.schema), &e),
                    e,
                )
            })?;

        let ddl = create_table_sql(table, schema);
        tracing::info!(table = %table, columns = schema.columns.len(), "Creating destination table");
        tracing::debug!(ddl = %ddl, "Table DDL");
        client.batch_execute(&ddl).await.map_err(|e| {
            EtlError::transient_io(format_pg_error(&format!("create table {table}"), &e), e)
        })?;

        Ok(EnsuredTable::created_from(schema))
    }

    async fn write(
        &self,
        table: &TableName,
        dataset: &Dataset,
        target: &EnsuredTable,
    ) -> Result<u64, EtlError> {
        if dataset.is_empty() {
            return Ok(0);
        }
        let targets = target.targets_for(table, dataset)?;
        let column_names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        let sql_types: Vec<&str> = targets.iter().map(|t| t.sql_type.as_str()).collect();
        let chunk_rows = rows_per_statement(targets.len());

        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(|e| {
            EtlError::Load(format_pg_error(&format!("begin transaction on {table}"), &e))
        })?;

        let mut written = 0u64;
        for chunk in dataset.rows().chunks(chunk_rows) {
            let params: Vec<Option<String>> = chunk
                .iter()
                .flat_map(|row| {
                    row.iter()
                        .zip(&targets)
                        .map(|(value, t)| render_value(value, t.column_type))
                })
                .collect();
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            let sql = insert_sql(table, &column_names, &sql_types, chunk.len());
            // Dropping `tx` on error rolls the whole write back.
            let inserted = tx.execute(&sql, &refs).await.map_err(|e| {
                EtlError::Load(format_pg_error(
                    &format!("insert into {table} failed after {written} row(s), rolled back"),
                    &e,
                ))
            })?;
            written += inserted;
        }

        tx.commit().await.map_err(|e| {
            EtlError::Load(format_pg_error(&format!("commit write to {table}"), &e))
        })?;
        Ok(written)
    }

    async fn ping(&self) -> Result<(), EtlError> {
        let client = self.client.lock().await;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| EtlError::transient_io(format!("ping {}", self.label), e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("postgres({})", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakeload_types::schema::{ColumnDescriptor, ColumnType};

    #[test]
    fn create_table_quotes_identifiers_and_nullability() {
        let schema = TableSchema {
            columns: vec![
                ColumnDescriptor::new("id", ColumnType::Integer, false),
                ColumnDescriptor::new("Smoker Flag", ColumnType::Boolean, true),
            ],
            rows_observed: 2,
        };
        let sql = create_table_sql(&TableName::new("analytics", "heart_disease"), &schema);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS analytics.heart_disease (id BIGINT NOT NULL, \"Smoker Flag\" BOOLEAN)"
        );
    }

    #[test]
    fn insert_casts_every_parameter() {
        let sql = insert_sql(
            &TableName::new("public", "t"),
            &["a", "b"],
            &["BIGINT", "TIMESTAMP"],
            2,
        );
        assert_eq!(
            sql,
            "INSERT INTO public.t (a, b) VALUES \
             ($1::text::BIGINT, $2::text::TIMESTAMP), \
             ($3::text::BIGINT, $4::text::TIMESTAMP)"
        );
    }

    #[test]
    fn insert_into_existing_char_column_never_casts_to_char() {
        let table = TableName::new("public", "patients");
        let schema = TableSchema {
            columns: vec![
                ColumnDescriptor::new("name", ColumnType::String, false),
                ColumnDescriptor::new("smoker", ColumnType::Boolean, false),
            ],
            rows_observed: 2,
        };
        let existing = vec![
            ExistingColumn {
                name: "name".into(),
                data_type: "character".into(),
                nullable: true,
            },
            ExistingColumn {
                name: "smoker".into(),
                data_type: "boolean".into(),
                nullable: true,
            },
        ];
        let ensured = check_compatibility(&table, &schema, &existing).unwrap();
        let names: Vec<&str> = ensured.columns.iter().map(|c| c.name.as_str()).collect();
        let types: Vec<&str> = ensured.columns.iter().map(|c| c.sql_type.as_str()).collect();

        let sql = insert_sql(&table, &names, &types, 1);
        assert_eq!(
            sql,
            "INSERT INTO public.patients (name, smoker) VALUES ($1::text::TEXT, $2::text::BOOLEAN)"
        );
        assert!(!sql.contains("::character"), "got: {sql}");
    }

    #[test]
    fn chunk_size_respects_bind_limit() {
        assert_eq!(rows_per_statement(2), CHUNK_SIZE);
        assert_eq!(rows_per_statement(100), 655);
        assert_eq!(rows_per_statement(100_000), 1);
        assert_eq!(rows_per_statement(0), CHUNK_SIZE);
    }
}
