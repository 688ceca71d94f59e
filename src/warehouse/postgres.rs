use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use tracing::{debug, warn};

use super::{BATCH_SIZE, Warehouse, latest_by_key, validate_table_name};
use crate::error::EtlError;
use crate::transform::NeoRecord;

const COLUMNS: &str = "id, name, is_potentially_hazardous_asteroid, estimated_diameter_min_km, \
     estimated_diameter_max_km, relative_velocity_km_sec, miss_distance_km, searching_date";

const UPSERT_CONFLICT: &str = r#"
    ON CONFLICT (id, searching_date) DO UPDATE SET
        name = EXCLUDED.name,
        is_potentially_hazardous_asteroid = EXCLUDED.is_potentially_hazardous_asteroid,
        estimated_diameter_min_km = EXCLUDED.estimated_diameter_min_km,
        estimated_diameter_max_km = EXCLUDED.estimated_diameter_max_km,
        relative_velocity_km_sec = EXCLUDED.relative_velocity_km_sec,
        miss_distance_km = EXCLUDED.miss_distance_km
"#;

/// PostgreSQL warehouse. Every operation opens its own connection and
/// closes it before returning, whether the operation succeeded or not.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    options: PgConnectOptions,
    table: String,
}

impl PostgresWarehouse {
    pub fn new(options: PgConnectOptions, table: &str) -> Result<Self, EtlError> {
        validate_table_name(table)?;
        Ok(Self {
            options,
            table: table.to_string(),
        })
    }

    async fn connect(&self) -> Result<PgConnection, EtlError> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(EtlError::Connection)
    }

    fn create_table_sql(&self) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGINT,
                name VARCHAR(256),
                is_potentially_hazardous_asteroid BOOLEAN,
                estimated_diameter_min_km DOUBLE PRECISION,
                estimated_diameter_max_km DOUBLE PRECISION,
                relative_velocity_km_sec DOUBLE PRECISION,
                miss_distance_km DOUBLE PRECISION,
                searching_date DATE,
                PRIMARY KEY (id, searching_date)
            )
            "#,
            self.table
        )
    }

    // fillfactor=50 leaves room on each index page for updates from re-runs
    fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_miss_distance_km_{0} ON {0} \
             USING btree (miss_distance_km) WITH (fillfactor = 50)",
            self.table
        )
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT name FROM {} \
             WHERE searching_date >= $1 AND searching_date < $2 \
               AND miss_distance_km >= $3 AND miss_distance_km < $4 \
             ORDER BY searching_date, name",
            self.table
        )
    }

    async fn create_schema(&self, conn: &mut PgConnection) -> Result<(), EtlError> {
        let mut tx = conn.begin().await.map_err(EtlError::Query)?;
        sqlx::query(&self.create_table_sql())
            .execute(&mut *tx)
            .await
            .map_err(EtlError::Query)?;
        sqlx::query(&self.create_index_sql())
            .execute(&mut *tx)
            .await
            .map_err(EtlError::Query)?;
        tx.commit().await.map_err(EtlError::Query)
    }

    /// All batches share one transaction; a failure rolls every batch back.
    async fn upsert(&self, conn: &mut PgConnection, rows: &[&NeoRecord]) -> Result<(), EtlError> {
        let mut tx = conn.begin().await.map_err(EtlError::Load)?;

        for (batch_no, batch) in rows.chunks(BATCH_SIZE).enumerate() {
            let mut query: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({COLUMNS}) ", self.table));
            query.push_values(batch.iter().copied(), |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.name.as_str())
                    .push_bind(row.is_potentially_hazardous)
                    .push_bind(row.estimated_diameter_min_km)
                    .push_bind(row.estimated_diameter_max_km)
                    .push_bind(row.relative_velocity_km_sec)
                    .push_bind(row.miss_distance_km)
                    .push_bind(row.searching_date);
            });
            query.push(UPSERT_CONFLICT);

            let result = query
                .build()
                .execute(&mut *tx)
                .await
                .map_err(EtlError::Load)?;
            debug!(batch = batch_no, affected = result.rows_affected(), "Upserted batch");
        }

        tx.commit().await.map_err(EtlError::Load)
    }

    async fn select(
        &self,
        conn: &mut PgConnection,
        start: NaiveDate,
        end: NaiveDate,
        dist_from: f64,
        dist_to: f64,
    ) -> Result<Vec<String>, EtlError> {
        sqlx::query_scalar::<_, String>(&self.select_sql())
            .bind(start)
            .bind(end)
            .bind(dist_from)
            .bind(dist_to)
            .fetch_all(&mut *conn)
            .await
            .map_err(EtlError::Query)
    }
}

async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Closing warehouse connection failed");
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn ensure_schema(&self) -> Result<(), EtlError> {
        let mut conn = self.connect().await?;
        let result = self.create_schema(&mut conn).await;
        release(conn).await;
        result
    }

    async fn load(&self, rows: &[NeoRecord]) -> Result<usize, EtlError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let latest = latest_by_key(rows);

        let mut conn = self.connect().await?;
        let result = self.upsert(&mut conn, &latest).await;
        release(conn).await;
        result.map(|()| latest.len())
    }

    async fn select_by_window_and_distance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        dist_from: f64,
        dist_to: f64,
    ) -> Result<Vec<String>, EtlError> {
        let mut conn = self.connect().await?;
        let result = self.select(&mut conn, start, end, dist_from, dist_to).await;
        release(conn).await;
        result
    }
}
