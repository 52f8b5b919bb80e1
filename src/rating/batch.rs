use super::PenaltyPolicy;
use super::PendingRerates;
use super::Period;
use super::Rater;
use super::RerateRequest;
use crate::Timestamp;
use crate::config::Config;
use crate::config::ModTable;
use crate::store::Matches;
use crate::store::Requests;
use crate::store::Scores;
use crate::store::State;
use crate::store::StoreError;
use crate::store::atomically;
use crate::store::ensure_partition;
use crate::trueskill::TrueSkill;
use std::collections::BTreeMap;
use tokio_postgres::Client;

/// the background re-rate machinery: drains identity-triggered requests
/// into the per-mod pending ledger, then replays whole months once the
/// grace delay has passed without fresh requests.
pub struct Rerater<'a> {
    pub client: &'a Client,
    pub cfg: &'a Config,
    pub env: TrueSkill,
    pub mods: &'a ModTable,
}

impl Rerater<'_> {
    /// drain the request queue: claim, resolve each request to its
    /// (mod, start period) pairs, merge into the pending ledger, delete.
    /// claimed rows survive a crash and are re-collected on restart.
    pub async fn collect(&self) -> Result<usize, StoreError> {
        let claimed = self.client.claim_rerates().await?;
        if claimed.is_empty() {
            return Ok(0);
        }
        let count = claimed.len();
        for row in claimed {
            for (mod_short, start) in self.resolve(&row.request).await? {
                self.client
                    .merge_pending(&mod_short, start, row.requested)
                    .await?;
            }
        }
        self.client.delete_claimed().await?;
        Ok(count)
    }

    /// execute every pending batch whose debounce window has elapsed.
    /// returns whether anything ran.
    pub async fn run_due(&self, current: Period, now: Timestamp) -> Result<bool, StoreError> {
        let pending: PendingRerates = self.client.pending().await?;
        let due = pending.due(now, self.cfg.rerate_delay);
        if due.is_empty() {
            return Ok(false);
        }
        self.client.set_batch_running(true).await?;
        for (mod_short, start) in due {
            log::info!("batch re-rate of {} from {}", mod_short, start);
            self.rerate(&mod_short, start, current).await?;
            self.client.drop_pending(&mod_short).await?;
        }
        self.client.set_batch_running(false).await?;
        Ok(true)
    }

    /// what months a request invalidates
    async fn resolve(
        &self,
        request: &RerateRequest,
    ) -> Result<Vec<(String, Period)>, StoreError> {
        match request {
            RerateRequest::Game { mod_short, period } => {
                Ok(vec![(mod_short.clone(), *period)])
            }
            RerateRequest::Match { game } => {
                let Some((mod_name, reported)) = self.client.game_mod_and_report(*game).await?
                else {
                    return Ok(Vec::new());
                };
                Ok(self
                    .mods
                    .resolve(&mod_name)
                    .and_then(|short| Period::of(reported).map(|p| (short.to_string(), p)))
                    .into_iter()
                    .collect())
            }
            RerateRequest::Account { account } => {
                let mut earliest = BTreeMap::<String, Period>::new();
                for (mod_name, reported) in self.client.account_mod_debuts(*account).await? {
                    let Some(short) = self.mods.resolve(&mod_name) else {
                        continue;
                    };
                    let Some(period) = Period::of(reported) else {
                        continue;
                    };
                    earliest
                        .entry(short.to_string())
                        .and_modify(|p| *p = (*p).min(period))
                        .or_insert(period);
                }
                Ok(earliest.into_iter().collect())
            }
        }
    }

    /// replay one mod month by month. each month commits exactly once:
    /// its rows are deleted and rebuilt against the previous month's
    /// state inside a single transaction.
    async fn rerate(&self, mod_short: &str, from: Period, current: Period) -> Result<(), StoreError> {
        let queued = self.client.queued_games().await?;
        for month in from.through(current) {
            ensure_partition(self.client, month).await?;
            atomically(self.client, async {
                let mut set = self.client.month_ratings(month.prev(), mod_short).await?;
                self.client.delete_month(month, mod_short).await?;
                let rater = Rater {
                    env: &self.env,
                    starts: &self.cfg.start_skills,
                };
                for game in self.client.matches_in_month(month).await? {
                    if queued.contains(&game) {
                        continue;
                    }
                    let Some(report) = self.client.match_report(game).await? else {
                        continue;
                    };
                    if !report.ratable() || self.mods.resolve(&report.mod_name) != Some(mod_short) {
                        continue;
                    }
                    match rater.rate(&report, mod_short, &mut set) {
                        Ok(rows) => {
                            for row in &rows {
                                self.client.write_game_rating(month, mod_short, row).await?;
                            }
                        }
                        Err(guard) => {
                            log::debug!("game {} skipped in replay: {:?}", game, guard);
                        }
                    }
                }
                for (&(user, dim), state) in set.iter() {
                    self.client
                        .upsert_rating(month, user, mod_short, dim, *state)
                        .await?;
                }
                Ok(())
            })
            .await?;
            if month != current {
                penalty_pass(self.client, &self.cfg.inactivity_penalty, month, mod_short).await?;
            }
        }
        Ok(())
    }
}

/// the monthly inactivity pass for one (period, mod): load the month,
/// apply the policy against the month's ratable-game counts, write back
pub async fn penalty_pass(
    client: &Client,
    policy: &PenaltyPolicy,
    period: Period,
    mod_short: &str,
) -> Result<(), StoreError> {
    let mut set = client.month_ratings(period, mod_short).await?;
    let games = client.games_played(period, mod_short).await?;
    let before = set.clone();
    policy.run(&mut set, &games);
    atomically(client, async {
        for (&(user, dim), state) in set.iter() {
            if before.get(user, dim) != Some(state) {
                client
                    .upsert_rating(period, user, mod_short, dim, *state)
                    .await?;
            }
        }
        Ok(())
    })
    .await
}
