use super::StoreError;
use super::schema::*;
use crate::rating::Period;
use const_format::concatcp;
use tokio_postgres::Client;

const CURRENT_YEAR: &str = "currentRatingYear";
const CURRENT_MONTH: &str = "currentRatingMonth";
const BATCH_STATUS: &str = "batchRatingStatus";

/// State defines the small key/value area holding the engine's rating
/// clock and the batch flag the query side may observe.
#[async_trait::async_trait]
pub trait State: Send + Sync {
    async fn current_period(&self) -> Result<Option<Period>, StoreError>;
    async fn set_current_period(&self, period: Period) -> Result<(), StoreError>;
    async fn batch_running(&self) -> Result<bool, StoreError>;
    async fn set_batch_running(&self, running: bool) -> Result<(), StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl State for Client {
    async fn current_period(&self) -> Result<Option<Period>, StoreError> {
        let year = read(self, CURRENT_YEAR).await?;
        let month = read(self, CURRENT_MONTH).await?;
        match (year, month) {
            (Some(y), Some(m)) => Ok(Some(Period::new(y as u32, m as u32))),
            _ => Ok(None),
        }
    }

    async fn set_current_period(&self, period: Period) -> Result<(), StoreError> {
        write(self, CURRENT_YEAR, period.year() as i64).await?;
        write(self, CURRENT_MONTH, period.month() as i64).await?;
        Ok(())
    }

    async fn batch_running(&self) -> Result<bool, StoreError> {
        Ok(read(self, BATCH_STATUS).await?.unwrap_or(0) == 1)
    }

    async fn set_batch_running(&self, running: bool) -> Result<(), StoreError> {
        write(self, BATCH_STATUS, if running { 1 } else { 0 }).await
    }
}

async fn read(client: &Client, key: &str) -> Result<Option<i64>, StoreError> {
    const SQL: &str = concatcp!(
        "SELECT value ",
        "FROM   ", RATING_STATE, " ",
        "WHERE  key = $1"
    );
    Ok(client
        .query_opt(SQL, &[&key])
        .await?
        .map(|row| row.get::<_, i64>(0)))
}

async fn write(client: &Client, key: &str, value: i64) -> Result<(), StoreError> {
    const SQL: &str = concatcp!(
        "INSERT INTO ", RATING_STATE, " (key, value) ",
        "VALUES      ($1, $2) ",
        "ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"
    );
    client.execute(SQL, &[&key, &value]).await?;
    Ok(())
}
