use super::GameType;
use super::GuardFailure;
use super::IN_PROGRESS;
use super::MatchReport;
use super::Period;
use super::Rater;
use super::WorkingSet;
use super::batch::penalty_pass;
use crate::GameId;
use crate::config::Config;
use crate::config::ModTable;
use crate::store::Matches;
use crate::store::Scores;
use crate::store::State;
use crate::store::StoreError;
use crate::store::atomically;
use crate::store::ensure_partition;
use crate::trueskill::TrueSkill;
use tokio_postgres::Client;

/// the incremental rating pipeline: one queued match per step, strictly
/// in (report timestamp, game id) order, each either fully rated or
/// terminally refused.
pub struct Pipeline<'a> {
    pub client: &'a Client,
    pub cfg: &'a Config,
    pub env: TrueSkill,
    pub mods: &'a ModTable,
}

impl Pipeline<'_> {
    /// rate the next queued match if any. returns whether work was done.
    pub async fn step(&self, current: &mut Period) -> Result<bool, StoreError> {
        let Some((game, reported)) = self.client.next_queued().await? else {
            return Ok(false);
        };
        self.client.set_queue_status(game, IN_PROGRESS).await?;
        let Some(report) = self.client.match_report(game).await? else {
            return self.refuse(game, GuardFailure::UnknownMatch).await;
        };
        if self.client.has_game_ratings(game).await? {
            return self.refuse(game, GuardFailure::Duplicate).await;
        }
        if report.undecided {
            return self.refuse(game, GuardFailure::Undecided).await;
        }
        if report.cheating {
            return self.refuse(game, GuardFailure::Cheating).await;
        }
        let Some(month) = Period::of(reported) else {
            return self.refuse(game, GuardFailure::BadTimestamp).await;
        };
        if month == current.next() {
            self.roll_over(*current, month).await?;
            *current = month;
        } else if month != *current {
            return self.refuse(game, GuardFailure::InconsistentTimestamp).await;
        }
        let Some(mod_short) = self.mods.resolve(&report.mod_name).map(str::to_string) else {
            return self.refuse(game, GuardFailure::UnratableType).await;
        };
        let mut set = self.preload(*current, &mod_short, &report).await?;
        let rater = Rater {
            env: &self.env,
            starts: &self.cfg.start_skills,
        };
        let rows = match rater.rate(&report, &mod_short, &mut set) {
            Ok(rows) => rows,
            Err(guard) => return self.refuse(game, guard).await,
        };
        let period = *current;
        atomically(self.client, async {
            for row in &rows {
                self.client
                    .write_game_rating(period, &mod_short, row)
                    .await?;
            }
            for (&(user, dim), state) in set.iter() {
                self.client
                    .upsert_rating(period, user, &mod_short, dim, *state)
                    .await?;
            }
            self.client.drop_queue_entry(game).await?;
            Ok(())
        })
        .await?;
        log::info!(
            "rated game {} [{}] in {} ({} players)",
            game,
            mod_short,
            period,
            report.players.len()
        );
        Ok(true)
    }

    /// park a refused match under its terminal status
    async fn refuse(&self, game: GameId, guard: GuardFailure) -> Result<bool, StoreError> {
        log::warn!("game {} refused: {:?}", game, guard);
        self.client.set_queue_status(game, guard.status()).await?;
        Ok(true)
    }

    /// the month turned over: close the old month with its penalty pass,
    /// open the new partitions, and carry every rating row forward
    async fn roll_over(&self, from: Period, to: Period) -> Result<(), StoreError> {
        log::info!("rating period rolls over from {} to {}", from, to);
        for mod_short in self.client.mods_rated(from).await? {
            penalty_pass(self.client, &self.cfg.inactivity_penalty, from, &mod_short).await?;
        }
        ensure_partition(self.client, to).await?;
        atomically(self.client, async {
            self.client.copy_forward(from, to).await?;
            self.client.set_current_period(to).await?;
            Ok(())
        })
        .await
    }

    /// load the five-dimension pre-ratings of everyone in the match
    async fn preload(
        &self,
        period: Period,
        mod_short: &str,
        report: &MatchReport,
    ) -> Result<WorkingSet, StoreError> {
        let mut set = WorkingSet::new();
        for player in &report.players {
            for dim in GameType::ALL {
                if let Some(state) = self
                    .client
                    .rating_row(period, player.user, mod_short, dim)
                    .await?
                {
                    set.insert(player.user, dim, state);
                }
            }
        }
        Ok(set)
    }
}
