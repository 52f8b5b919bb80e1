mod error;
mod events;
mod identity;
mod matches;
mod names;
mod prefs;
mod requests;
mod schema;
mod scores;
mod state;

pub use error::*;
pub use events::*;
pub use identity::*;
pub use matches::*;
pub use names::*;
pub use prefs::*;
pub use requests::*;
pub use schema::*;
pub use scores::*;
pub use state::*;

use tokio_postgres::Client;

/// run a body of store calls inside one transaction. commit on success,
/// roll back on any error. the single-threaded engine owns its
/// connection, so plain BEGIN/COMMIT on the shared client is sound.
pub async fn atomically<T>(
    client: &Client,
    body: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    client.batch_execute("BEGIN").await.map_err(StoreError::from)?;
    match body.await {
        Ok(value) => {
            client
                .batch_execute("COMMIT")
                .await
                .map_err(StoreError::from)?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = client.batch_execute("ROLLBACK").await {
                log::error!("rollback failed: {}", rollback);
            }
            Err(error)
        }
    }
}

/// retry a read path through transient failures with bounded backoff
pub async fn retrying<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = std::time::Duration::from_millis(250);
    for _ in 0..5 {
        match op().await {
            Err(StoreError::Transient(e)) => {
                log::warn!("transient store error, retrying in {:?}: {}", delay, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
    op().await
}
