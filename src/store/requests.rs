use super::StoreError;
use super::schema::*;
use crate::Timestamp;
use crate::rating::PendingRerates;
use crate::rating::Period;
use crate::rating::RerateRequest;
use crate::rating::RerateRow;
use const_format::concatcp;
use tokio_postgres::Client;

/// Requests defines the re-rate request queue and the collapsed pending
/// ledger. Claiming is a status flip so a crash mid-pass leaves the
/// claimed rows visible for recovery.
#[async_trait::async_trait]
pub trait Requests: Send + Sync {
    async fn append_rerate(
        &self,
        request: &RerateRequest,
        requested: Timestamp,
    ) -> Result<(), StoreError>;
    /// flip every fresh request to in-progress and return the whole
    /// claimed set, including any left over from a crashed pass
    async fn claim_rerates(&self) -> Result<Vec<RerateRow>, StoreError>;
    async fn delete_claimed(&self) -> Result<(), StoreError>;
    async fn merge_pending(
        &self,
        mod_short: &str,
        period: Period,
        requested: Timestamp,
    ) -> Result<(), StoreError>;
    async fn pending(&self) -> Result<PendingRerates, StoreError>;
    async fn drop_pending(&self, mod_short: &str) -> Result<(), StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl Requests for Client {
    async fn append_rerate(
        &self,
        request: &RerateRequest,
        requested: Timestamp,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", RERATE_REQUESTS, " ",
            "(kind, account_id, game_id, mod_short, period, requested) ",
            "VALUES ($1, $2, $3, $4, $5, $6)"
        );
        let (account, game, mod_short, period) = match request {
            RerateRequest::Account { account } => (Some(*account), None, None, None),
            RerateRequest::Match { game } => (None, Some(*game), None, None),
            RerateRequest::Game { mod_short, period } => {
                (None, None, Some(mod_short.clone()), Some(u32::from(*period) as i32))
            }
        };
        self.execute(
            SQL,
            &[&request.tag(), &account, &game, &mod_short, &period, &requested],
        )
        .await?;
        Ok(())
    }

    async fn claim_rerates(&self) -> Result<Vec<RerateRow>, StoreError> {
        const CLAIM: &str = concatcp!(
            "UPDATE ", RERATE_REQUESTS, " ",
            "SET    status = 1 ",
            "WHERE  status = 0"
        );
        const READ: &str = concatcp!(
            "SELECT   id, kind, account_id, game_id, mod_short, period, requested ",
            "FROM     ", RERATE_REQUESTS, " ",
            "WHERE    status = 1 ",
            "ORDER BY id"
        );
        self.execute(CLAIM, &[]).await?;
        self.query(READ, &[])
            .await?
            .iter()
            .map(|row| {
                let kind = row.get::<_, String>(1);
                let request = match kind.trim() {
                    "A" => RerateRequest::Account {
                        account: row
                            .get::<_, Option<i32>>(2)
                            .ok_or_else(|| StoreError::inconsistent("account rerate without id"))?,
                    },
                    "M" => RerateRequest::Match {
                        game: row
                            .get::<_, Option<i64>>(3)
                            .ok_or_else(|| StoreError::inconsistent("match rerate without id"))?,
                    },
                    "G" => RerateRequest::Game {
                        mod_short: row
                            .get::<_, Option<String>>(4)
                            .ok_or_else(|| StoreError::inconsistent("game rerate without mod"))?,
                        period: Period::from(
                            row.get::<_, Option<i32>>(5)
                                .ok_or_else(|| StoreError::inconsistent("game rerate without period"))?
                                as u32,
                        ),
                    },
                    other => {
                        return Err(StoreError::inconsistent(format!(
                            "unknown rerate kind {:?}",
                            other
                        )));
                    }
                };
                Ok(RerateRow {
                    id: row.get::<_, i64>(0),
                    request,
                    requested: row.get::<_, i64>(6),
                })
            })
            .collect()
    }

    async fn delete_claimed(&self) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "DELETE FROM ", RERATE_REQUESTS, " ",
            "WHERE  status = 1"
        );
        self.execute(SQL, &[]).await?;
        Ok(())
    }

    async fn merge_pending(
        &self,
        mod_short: &str,
        period: Period,
        requested: Timestamp,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", PENDING_RERATES, " (mod_short, period, requested) ",
            "VALUES      ($1, $2, $3) ",
            "ON CONFLICT (mod_short) ",
            "DO UPDATE SET ",
                "period = LEAST(", PENDING_RERATES, ".period, EXCLUDED.period), ",
                "requested = GREATEST(", PENDING_RERATES, ".requested, EXCLUDED.requested)"
        );
        self.execute(SQL, &[&mod_short, &(u32::from(period) as i32), &requested])
            .await?;
        Ok(())
    }

    async fn pending(&self) -> Result<PendingRerates, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT mod_short, period, requested ",
            "FROM   ", PENDING_RERATES
        );
        Ok(self
            .query(SQL, &[])
            .await?
            .iter()
            .map(|row| {
                (
                    row.get::<_, String>(0),
                    Period::from(row.get::<_, i32>(1) as u32),
                    row.get::<_, i64>(2),
                )
            })
            .collect())
    }

    async fn drop_pending(&self, mod_short: &str) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "DELETE FROM ", PENDING_RERATES, " ",
            "WHERE  mod_short = $1"
        );
        self.execute(SQL, &[&mod_short]).await?;
        Ok(())
    }
}
