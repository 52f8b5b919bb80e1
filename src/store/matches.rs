use super::StoreError;
use super::schema::*;
use crate::AccountId;
use crate::GameId;
use crate::Timestamp;
use crate::rating::MatchReport;
use crate::rating::Period;
use crate::rating::PlayerRow;
use const_format::concatcp;
use tokio_postgres::Client;

/// Matches defines the match-record and rating-queue interface. The
/// monitors fill the match tables; the engine consumes them read-mostly
/// and owns the queue lifecycle.
#[async_trait::async_trait]
pub trait Matches: Send + Sync {
    async fn record_match(&self, report: &MatchReport) -> Result<(), StoreError>;
    async fn enqueue(&self, game: GameId, reported: Timestamp) -> Result<(), StoreError>;
    async fn match_report(&self, game: GameId) -> Result<Option<MatchReport>, StoreError>;
    /// earliest queued entry in (reported, game_id) order
    async fn next_queued(&self) -> Result<Option<(GameId, Timestamp)>, StoreError>;
    async fn set_queue_status(&self, game: GameId, status: i16) -> Result<(), StoreError>;
    async fn drop_queue_entry(&self, game: GameId) -> Result<(), StoreError>;
    /// crash recovery: put claimed-but-unfinished entries back
    async fn reset_in_progress(&self) -> Result<u64, StoreError>;
    /// all match ids reported inside a month, replay order
    async fn matches_in_month(&self, period: Period) -> Result<Vec<GameId>, StoreError>;
    /// everything still sitting in the rating queue
    async fn queued_games(&self) -> Result<std::collections::BTreeSet<GameId>, StoreError>;
    /// matches in which both account sets appear, the simultaneous-play
    /// conflict evidence
    async fn shared_matches(
        &self,
        left: &[AccountId],
        right: &[AccountId],
        limit: i64,
    ) -> Result<Vec<GameId>, StoreError>;
    /// per mod name, the earliest report timestamp among the account's
    /// matches; feeds account-wide re-rate resolution
    async fn account_mod_debuts(
        &self,
        account: AccountId,
    ) -> Result<Vec<(String, Timestamp)>, StoreError>;
    async fn game_mod_and_report(
        &self,
        game: GameId,
    ) -> Result<Option<(String, Timestamp)>, StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl Matches for Client {
    async fn record_match(&self, report: &MatchReport) -> Result<(), StoreError> {
        const GAME: &str = concatcp!(
            "INSERT INTO ", GAMES, " ",
            "(game_id, host, started, ended, reported, mod_name, map_name, undecided, cheating) ",
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ",
            "ON CONFLICT (game_id) DO NOTHING"
        );
        const PLAYER: &str = concatcp!(
            "INSERT INTO ", GAME_PLAYERS, " ",
            "(game_id, account_id, team, ally_team, win, ip) ",
            "VALUES ($1, $2, $3, $4, $5, $6) ",
            "ON CONFLICT (game_id, account_id) DO NOTHING"
        );
        self.execute(
            GAME,
            &[
                &report.game_id,
                &report.host,
                &report.started,
                &report.ended,
                &report.reported,
                &report.mod_name,
                &report.map_name,
                &report.undecided,
                &report.cheating,
            ],
        )
        .await?;
        for p in &report.players {
            self.execute(
                PLAYER,
                &[
                    &report.game_id,
                    &p.account,
                    &p.team,
                    &p.ally_team,
                    &p.win,
                    &p.ip.map(|ip| ip as i64),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn enqueue(&self, game: GameId, reported: Timestamp) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", RATING_QUEUE, " (game_id, reported) ",
            "VALUES      ($1, $2) ",
            "ON CONFLICT (game_id) DO NOTHING"
        );
        self.execute(SQL, &[&game, &reported]).await?;
        Ok(())
    }

    async fn match_report(&self, game: GameId) -> Result<Option<MatchReport>, StoreError> {
        const GAME: &str = concatcp!(
            "SELECT host, started, ended, reported, mod_name, map_name, undecided, cheating ",
            "FROM   ", GAMES, " ",
            "WHERE  game_id = $1"
        );
        const PLAYERS: &str = concatcp!(
            "SELECT   p.account_id, COALESCE(ua.user_id, p.account_id), ",
                     "p.team, p.ally_team, p.win, p.ip ",
            "FROM     ", GAME_PLAYERS, " p ",
            "LEFT JOIN ", USER_ACCOUNTS, " ua ON ua.account_id = p.account_id ",
            "WHERE    p.game_id = $1 ",
            "ORDER BY p.account_id"
        );
        const BOTS: &str = concatcp!(
            "SELECT COUNT(*) ",
            "FROM   ", GAME_BOTS, " ",
            "WHERE  game_id = $1"
        );
        let Some(game_row) = self.query_opt(GAME, &[&game]).await? else {
            return Ok(None);
        };
        let players = self
            .query(PLAYERS, &[&game])
            .await?
            .iter()
            .map(|row| PlayerRow {
                account: row.get::<_, i32>(0),
                user: row.get::<_, i32>(1),
                team: row.get::<_, Option<i32>>(2).unwrap_or(-1),
                ally_team: row.get::<_, Option<i32>>(3).unwrap_or(-1),
                win: row.get::<_, bool>(4),
                ip: row.get::<_, Option<i64>>(5).map(|ip| ip as u32),
            })
            .collect();
        let bots = self.query_one(BOTS, &[&game]).await?.get::<_, i64>(0) as usize;
        Ok(Some(MatchReport {
            game_id: game,
            host: game_row.get::<_, i32>(0),
            started: game_row.get::<_, i64>(1),
            ended: game_row.get::<_, i64>(2),
            reported: game_row.get::<_, i64>(3),
            mod_name: game_row.get(4),
            map_name: game_row.get(5),
            undecided: game_row.get(6),
            cheating: game_row.get(7),
            bots,
            players,
        }))
    }

    async fn next_queued(&self) -> Result<Option<(GameId, Timestamp)>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   game_id, reported ",
            "FROM     ", RATING_QUEUE, " ",
            "WHERE    status = 0 ",
            "ORDER BY reported, game_id ",
            "LIMIT    1"
        );
        Ok(self
            .query_opt(SQL, &[])
            .await?
            .map(|row| (row.get::<_, i64>(0), row.get::<_, i64>(1))))
    }

    async fn set_queue_status(&self, game: GameId, status: i16) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "UPDATE ", RATING_QUEUE, " ",
            "SET    status = $2 ",
            "WHERE  game_id = $1"
        );
        self.execute(SQL, &[&game, &status]).await?;
        Ok(())
    }

    async fn drop_queue_entry(&self, game: GameId) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "DELETE FROM ", RATING_QUEUE, " ",
            "WHERE  game_id = $1"
        );
        self.execute(SQL, &[&game]).await?;
        Ok(())
    }

    async fn reset_in_progress(&self) -> Result<u64, StoreError> {
        const SQL: &str = concatcp!(
            "UPDATE ", RATING_QUEUE, " ",
            "SET    status = 0 ",
            "WHERE  status = 1"
        );
        Ok(self.execute(SQL, &[]).await?)
    }

    async fn matches_in_month(&self, period: Period) -> Result<Vec<GameId>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   game_id ",
            "FROM     ", GAMES, " ",
            "WHERE    reported >= $1 ",
            "AND      reported < $2 ",
            "ORDER BY reported, game_id"
        );
        let (from, to) = bounds(period);
        Ok(self
            .query(SQL, &[&from, &to])
            .await?
            .iter()
            .map(|row| row.get::<_, i64>(0))
            .collect())
    }

    async fn queued_games(&self) -> Result<std::collections::BTreeSet<GameId>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT game_id ",
            "FROM   ", RATING_QUEUE
        );
        Ok(self
            .query(SQL, &[])
            .await?
            .iter()
            .map(|row| row.get::<_, i64>(0))
            .collect())
    }

    async fn shared_matches(
        &self,
        left: &[AccountId],
        right: &[AccountId],
        limit: i64,
    ) -> Result<Vec<GameId>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   DISTINCT a.game_id ",
            "FROM     ", GAME_PLAYERS, " a ",
            "JOIN     ", GAME_PLAYERS, " b ON a.game_id = b.game_id ",
            "JOIN     ", GAMES, " g ON g.game_id = a.game_id ",
            "WHERE    a.account_id = ANY($1) ",
            "AND      b.account_id = ANY($2) ",
            "AND      a.ally_team IS NOT NULL ",
            "AND      b.ally_team IS NOT NULL ",
            "AND      a.ip IS NOT NULL ",
            "AND      b.ip IS NOT NULL ",
            "AND      NOT g.undecided ",
            "AND      NOT g.cheating ",
            "ORDER BY a.game_id ",
            "LIMIT    $3"
        );
        let l = left.to_vec();
        let r = right.to_vec();
        Ok(self
            .query(SQL, &[&l, &r, &limit])
            .await?
            .iter()
            .map(|row| row.get::<_, i64>(0))
            .collect())
    }

    async fn account_mod_debuts(
        &self,
        account: AccountId,
    ) -> Result<Vec<(String, Timestamp)>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   g.mod_name, MIN(g.reported) ",
            "FROM     ", GAMES, " g ",
            "JOIN     ", GAME_PLAYERS, " p ON p.game_id = g.game_id ",
            "WHERE    p.account_id = $1 ",
            "GROUP BY g.mod_name"
        );
        Ok(self
            .query(SQL, &[&account])
            .await?
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, i64>(1)))
            .collect())
    }

    async fn game_mod_and_report(
        &self,
        game: GameId,
    ) -> Result<Option<(String, Timestamp)>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT mod_name, reported ",
            "FROM   ", GAMES, " ",
            "WHERE  game_id = $1"
        );
        Ok(self
            .query_opt(SQL, &[&game])
            .await?
            .map(|row| (row.get::<_, String>(0), row.get::<_, i64>(1))))
    }
}

/// the unix-second span of a period, half open
fn bounds(period: Period) -> (Timestamp, Timestamp) {
    let start = chrono::NaiveDate::from_ymd_opt(period.year() as i32, period.month(), 1)
        .expect("valid period")
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc()
        .timestamp();
    let next = period.next();
    let end = chrono::NaiveDate::from_ymd_opt(next.year() as i32, next.month(), 1)
        .expect("valid period")
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc()
        .timestamp();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds_are_half_open() {
        let (from, to) = bounds(Period::new(2020, 3));
        assert!(from == 1583020800);
        assert!(to == 1585699200);
        let (next_from, _) = bounds(Period::new(2020, 4));
        assert!(to == next_from);
    }
}
