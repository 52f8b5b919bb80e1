use super::StoreError;
use super::schema::*;
use crate::GameId;
use crate::UserId;
use crate::rating::GameRatingRow;
use crate::rating::GameType;
use crate::rating::Period;
use crate::rating::PlayerState;
use crate::rating::WorkingSet;
use crate::trueskill::Rating;
use const_format::concatcp;
use std::collections::BTreeMap;
use tokio_postgres::Client;

/// Scores defines the per-period and per-match rating row interface.
/// Every mu/sigma that leaves the engine goes through here, always with
/// the derived skill column recomputed at write time.
#[async_trait::async_trait]
pub trait Scores: Send + Sync {
    /// one mod's whole month as a working set
    async fn month_ratings(&self, period: Period, mod_short: &str)
    -> Result<WorkingSet, StoreError>;
    async fn rating_row(
        &self,
        period: Period,
        user: UserId,
        mod_short: &str,
        dim: GameType,
    ) -> Result<Option<PlayerState>, StoreError>;
    async fn upsert_rating(
        &self,
        period: Period,
        user: UserId,
        mod_short: &str,
        dim: GameType,
        state: PlayerState,
    ) -> Result<(), StoreError>;
    async fn write_game_rating(
        &self,
        period: Period,
        mod_short: &str,
        row: &GameRatingRow,
    ) -> Result<(), StoreError>;
    /// duplicate guard: any per-match row already written for the game
    async fn has_game_ratings(&self, game: GameId) -> Result<bool, StoreError>;
    /// clear one mod's month ahead of a batch re-rate
    async fn delete_month(&self, period: Period, mod_short: &str) -> Result<(), StoreError>;
    /// roll every mod's rows into the next period on month change
    async fn copy_forward(&self, from: Period, to: Period) -> Result<u64, StoreError>;
    /// ratable games per user inside a month of one mod
    async fn games_played(
        &self,
        period: Period,
        mod_short: &str,
    ) -> Result<BTreeMap<UserId, u32>, StoreError>;
    /// every mod with rating rows in the period
    async fn mods_rated(&self, period: Period) -> Result<Vec<String>, StoreError>;
    async fn top_skills(
        &self,
        period: Period,
        mod_short: &str,
        dim: GameType,
        limit: i64,
    ) -> Result<Vec<(UserId, f64)>, StoreError>;
}

#[rustfmt::skip]
#[async_trait::async_trait]
impl Scores for Client {
    async fn month_ratings(&self, period: Period, mod_short: &str)
    -> Result<WorkingSet, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT user_id, game_type, mu, sigma, penalties ",
            "FROM   ", RATINGS, " ",
            "WHERE  period = $1 ",
            "AND    mod_short = $2"
        );
        let mut set = WorkingSet::new();
        for row in self.query(SQL, &[&(u32::from(period) as i32), &mod_short]).await? {
            let Some(dim) = GameType::from_id(row.get::<_, i16>(1)) else {
                return Err(StoreError::inconsistent("game type out of range"));
            };
            set.insert(
                row.get::<_, i32>(0),
                dim,
                PlayerState {
                    rating: Rating::new(row.get::<_, f64>(2), row.get::<_, f64>(3)),
                    penalties: row.get::<_, i32>(4) as u32,
                },
            );
        }
        Ok(set)
    }

    async fn rating_row(
        &self,
        period: Period,
        user: UserId,
        mod_short: &str,
        dim: GameType,
    ) -> Result<Option<PlayerState>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT mu, sigma, penalties ",
            "FROM   ", RATINGS, " ",
            "WHERE  period = $1 ",
            "AND    user_id = $2 ",
            "AND    mod_short = $3 ",
            "AND    game_type = $4"
        );
        Ok(self
            .query_opt(SQL, &[&(u32::from(period) as i32), &user, &mod_short, &dim.id()])
            .await?
            .map(|row| PlayerState {
                rating: Rating::new(row.get::<_, f64>(0), row.get::<_, f64>(1)),
                penalties: row.get::<_, i32>(2) as u32,
            }))
    }

    async fn upsert_rating(
        &self,
        period: Period,
        user: UserId,
        mod_short: &str,
        dim: GameType,
        state: PlayerState,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", RATINGS, " ",
            "(period, user_id, mod_short, game_type, mu, sigma, skill, penalties) ",
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ",
            "ON CONFLICT (period, user_id, mod_short, game_type) ",
            "DO UPDATE SET ",
                "mu = EXCLUDED.mu, ",
                "sigma = EXCLUDED.sigma, ",
                "skill = EXCLUDED.skill, ",
                "penalties = EXCLUDED.penalties"
        );
        self.execute(
            SQL,
            &[
                &(u32::from(period) as i32),
                &user,
                &mod_short,
                &dim.id(),
                &state.rating.mu,
                &state.rating.sigma,
                &state.rating.skill(),
                &(state.penalties as i32),
            ],
        )
        .await?;
        Ok(())
    }

    async fn write_game_rating(
        &self,
        period: Period,
        mod_short: &str,
        row: &GameRatingRow,
    ) -> Result<(), StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", GAME_RATINGS, " ",
            "(period, game_id, account_id, user_id, mod_short, game_type, ",
             "mu_before, sigma_before, mu_after, sigma_after) ",
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        self.execute(
            SQL,
            &[
                &(u32::from(period) as i32),
                &row.game_id,
                &row.account,
                &row.user,
                &mod_short,
                &row.game_type.id(),
                &row.before.mu,
                &row.before.sigma,
                &row.after.mu,
                &row.after.sigma,
            ],
        )
        .await?;
        Ok(())
    }

    async fn has_game_ratings(&self, game: GameId) -> Result<bool, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT 1 ",
            "FROM   ", GAME_RATINGS, " ",
            "WHERE  game_id = $1 ",
            "LIMIT  1"
        );
        Ok(self.query_opt(SQL, &[&game]).await?.is_some())
    }

    async fn delete_month(&self, period: Period, mod_short: &str) -> Result<(), StoreError> {
        const ROWS: &str = concatcp!(
            "DELETE FROM ", RATINGS, " ",
            "WHERE  period = $1 ",
            "AND    mod_short = $2"
        );
        const GAMES_ROWS: &str = concatcp!(
            "DELETE FROM ", GAME_RATINGS, " ",
            "WHERE  period = $1 ",
            "AND    mod_short = $2"
        );
        self.execute(ROWS, &[&(u32::from(period) as i32), &mod_short]).await?;
        self.execute(GAMES_ROWS, &[&(u32::from(period) as i32), &mod_short]).await?;
        Ok(())
    }

    async fn copy_forward(&self, from: Period, to: Period) -> Result<u64, StoreError> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", RATINGS, " ",
            "(period, user_id, mod_short, game_type, mu, sigma, skill, penalties) ",
            "SELECT $2, user_id, mod_short, game_type, mu, sigma, skill, penalties ",
            "FROM   ", RATINGS, " ",
            "WHERE  period = $1 ",
            "ON CONFLICT (period, user_id, mod_short, game_type) DO NOTHING"
        );
        Ok(self
            .execute(SQL, &[&(u32::from(from) as i32), &(u32::from(to) as i32)])
            .await?)
    }

    async fn games_played(
        &self,
        period: Period,
        mod_short: &str,
    ) -> Result<BTreeMap<UserId, u32>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   user_id, COUNT(DISTINCT game_id) ",
            "FROM     ", GAME_RATINGS, " ",
            "WHERE    period = $1 ",
            "AND      mod_short = $2 ",
            "AND      game_type = 0 ",
            "GROUP BY user_id"
        );
        Ok(self
            .query(SQL, &[&(u32::from(period) as i32), &mod_short])
            .await?
            .iter()
            .map(|row| (row.get::<_, i32>(0), row.get::<_, i64>(1) as u32))
            .collect())
    }

    async fn mods_rated(&self, period: Period) -> Result<Vec<String>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT DISTINCT mod_short ",
            "FROM   ", RATINGS, " ",
            "WHERE  period = $1"
        );
        Ok(self
            .query(SQL, &[&(u32::from(period) as i32)])
            .await?
            .iter()
            .map(|row| row.get::<_, String>(0))
            .collect())
    }

    async fn top_skills(
        &self,
        period: Period,
        mod_short: &str,
        dim: GameType,
        limit: i64,
    ) -> Result<Vec<(UserId, f64)>, StoreError> {
        const SQL: &str = concatcp!(
            "SELECT   user_id, skill ",
            "FROM     ", RATINGS, " ",
            "WHERE    period = $1 ",
            "AND      mod_short = $2 ",
            "AND      game_type = $3 ",
            "ORDER BY skill DESC ",
            "LIMIT    $4"
        );
        Ok(self
            .query(SQL, &[&(u32::from(period) as i32), &mod_short, &dim.id(), &limit])
            .await?
            .iter()
            .map(|row| (row.get::<_, i32>(0), row.get::<_, f64>(1)))
            .collect())
    }
}
