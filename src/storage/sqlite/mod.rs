//! SQLite Store implementation.

use async_trait::async_trait;
use futures::stream;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::watch;
use tracing::debug;

use crate::encoding::ValueEncoding;
use crate::storage::schema::{Changes, CREATE_CHANGES_TABLE};
use crate::storage::{BatchOp, IterOptions, Record, RecordStream, Result, Store, StoreError};

/// SQLite implementation of Store.
pub struct SqliteStore {
    pool: SqlitePool,
    value_encoding: ValueEncoding,
    closing: watch::Sender<bool>,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub fn new(pool: SqlitePool, value_encoding: ValueEncoding) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            pool,
            value_encoding,
            closing,
        }
    }

    /// Create the changes table if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_CHANGES_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if *self.closing.borrow() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Apply batch operations within an already-started transaction.
    async fn apply_ops(conn: &mut SqliteConnection, ops: Vec<BatchOp>) -> Result<()> {
        for op in ops {
            let query = match op {
                BatchOp::Put { key, value } => Query::insert()
                    .into_table(Changes::Table)
                    .columns([Changes::Key, Changes::Value])
                    .values_panic([key.into(), value.into()])
                    .on_conflict(
                        OnConflict::column(Changes::Key)
                            .update_column(Changes::Value)
                            .to_owned(),
                    )
                    .to_string(SqliteQueryBuilder),
                BatchOp::Del { key } => Query::delete()
                    .from_table(Changes::Table)
                    .and_where(Expr::col(Changes::Key).eq(key))
                    .to_string(SqliteQueryBuilder),
            };

            sqlx::query(&query).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_open()?;

        let query = Query::select()
            .column(Changes::Value)
            .from(Changes::Table)
            .and_where(Expr::col(Changes::Key).eq(key.to_vec()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(row.get::<Vec<u8>, _>(0)),
            None => Err(StoreError::not_found(key)),
        }
    }

    async fn del(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;

        let query = Query::delete()
            .from_table(Changes::Table)
            .and_where(Expr::col(Changes::Key).eq(key.to_vec()))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        self.check_open()?;
        if ops.is_empty() {
            return Ok(());
        }
        let count = ops.len();

        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::apply_ops(&mut conn, ops).await {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                debug!(ops = count, "SQLite batch committed");
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn iter(&self, options: IterOptions) -> Result<RecordStream> {
        self.check_open()?;

        // SelectStatement is not Send; render it before the first await.
        let query = {
            let mut select = Query::select();
            select
                .columns([Changes::Key, Changes::Value])
                .from(Changes::Table)
                .order_by(
                    Changes::Key,
                    if options.reverse { Order::Desc } else { Order::Asc },
                );
            if let Some(gt) = options.gt.clone() {
                select.and_where(Expr::col(Changes::Key).gt(gt));
            }
            if let Some(limit) = options.limit {
                select.limit(limit as u64);
            }
            select.to_string(SqliteQueryBuilder)
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let records: Vec<Result<Record>> = rows
            .into_iter()
            .map(|row| {
                Ok(Record {
                    key: options.keys.then(|| row.get::<Vec<u8>, _>(0)),
                    value: options.values.then(|| row.get::<Vec<u8>, _>(1)),
                })
            })
            .collect();

        Ok(Box::pin(stream::iter(records)))
    }

    fn value_encoding(&self) -> ValueEncoding {
        self.value_encoding
    }

    fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.closing.send_replace(true);
        self.pool.close().await;
        Ok(())
    }
}
