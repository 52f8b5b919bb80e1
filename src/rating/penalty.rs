use super::GameType;
use super::PlayerState;
use super::WorkingSet;
use crate::Mu;
use crate::Sigma;
use crate::UserId;
use std::collections::BTreeMap;

/// inactivity penalty policy. idle players drift toward the pool mean by
/// small monthly (mu, sigma) steps, bounded so no player is pushed below
/// the floor, above the ceiling, or past the penalty cap; active players
/// earn penalties back one per game over the threshold.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PenaltyPolicy {
    pub threshold: u32,
    pub min_mu: Mu,
    pub max_sigma: Sigma,
    pub max_penalties: u32,
    pub mu_penalty: Mu,
    pub sigma_penalty: Sigma,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            threshold: crate::PENALTY_THRESHOLD,
            min_mu: crate::PENALTY_MIN_MU,
            max_sigma: crate::PENALTY_MAX_SIGMA,
            max_penalties: crate::PENALTY_MAX_COUNT,
            mu_penalty: crate::PENALTY_MU_STEP,
            sigma_penalty: crate::PENALTY_SIGMA_STEP,
        }
    }
}

impl PenaltyPolicy {
    /// idle-penalty candidacy is decided on the Global dimension alone
    pub fn qualifies(&self, global: &PlayerState, games: u32) -> bool {
        games < self.threshold
            && global.rating.mu > self.min_mu
            && global.rating.sigma < self.max_sigma
            && global.penalties < self.max_penalties
    }

    /// the largest number of penalty steps one dimension can absorb
    /// without leaving the allowed envelope
    pub fn idle_steps(&self, state: &PlayerState, games: u32) -> u32 {
        let by_mu = ((state.rating.mu - self.min_mu) / self.mu_penalty + 1e-9).floor();
        let by_sigma = ((self.max_sigma - state.rating.sigma) / self.sigma_penalty + 1e-9).floor();
        let by_count = self.max_penalties.saturating_sub(state.penalties);
        let by_games = self.threshold.saturating_sub(games);
        by_mu
            .max(0.0)
            .min(by_sigma.max(0.0))
            .min(by_count as f64)
            .min(by_games as f64) as u32
    }

    fn apply_idle(&self, state: &mut PlayerState, games: u32) {
        let k = self.idle_steps(state, games);
        state.rating.mu -= k as f64 * self.mu_penalty;
        state.rating.sigma += k as f64 * self.sigma_penalty;
        state.penalties += k;
    }

    fn apply_active(&self, state: &mut PlayerState, games: u32) {
        let earned = games.saturating_sub(self.threshold);
        state.penalties = state.penalties.saturating_sub(earned);
    }

    /// run the monthly pass over one mod's working set. `games` counts
    /// each user's ratable games in the month.
    pub fn run(&self, set: &mut WorkingSet, games: &BTreeMap<UserId, u32>) {
        let users = set
            .iter()
            .map(|(&(user, _), _)| user)
            .collect::<std::collections::BTreeSet<_>>();
        for user in users {
            let played = games.get(&user).copied().unwrap_or(0);
            let Some(global) = set.get(user, GameType::Global).copied() else {
                continue;
            };
            if self.qualifies(&global, played) {
                for dim in GameType::ALL {
                    if let Some(state) = set.state_mut(user, dim) {
                        self.apply_idle(state, played);
                    }
                }
            } else if played > self.threshold {
                for dim in GameType::ALL {
                    if let Some(state) = set.state_mut(user, dim) {
                        self.apply_active(state, played);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trueskill::Rating;

    fn policy() -> PenaltyPolicy {
        PenaltyPolicy {
            threshold: 5,
            min_mu: 22.0,
            max_sigma: 5.0,
            max_penalties: 10,
            mu_penalty: 0.05,
            sigma_penalty: 0.05,
        }
    }

    fn state(mu: f64, sigma: f64, penalties: u32) -> PlayerState {
        PlayerState {
            rating: Rating::new(mu, sigma),
            penalties,
        }
    }

    #[test]
    fn idle_player_is_penalised_within_bounds() {
        let p = policy();
        let mut set = WorkingSet::new();
        set.insert(1, GameType::Global, state(30.0, 3.0, 0));
        set.insert(1, GameType::Duel, state(31.0, 2.5, 0));
        p.run(&mut set, &BTreeMap::new());
        let g = set.get(1, GameType::Global).expect("present");
        // zero games: k = threshold = 5
        assert!((g.rating.mu - (30.0 - 5.0 * 0.05)).abs() < 1e-9);
        assert!((g.rating.sigma - (3.0 + 5.0 * 0.05)).abs() < 1e-9);
        assert!(g.penalties == 5);
    }

    #[test]
    fn penalties_respect_every_bound() {
        let p = policy();
        // one step from the mu floor
        assert!(p.idle_steps(&state(22.05, 3.0, 0), 0) == 1);
        // one step from the sigma ceiling
        assert!(p.idle_steps(&state(30.0, 4.95, 0), 0) == 1);
        // one penalty of headroom
        assert!(p.idle_steps(&state(30.0, 3.0, 9), 0) == 1);
        // games played shrink the budget
        assert!(p.idle_steps(&state(30.0, 3.0, 0), 3) == 2);
    }

    #[test]
    fn at_floor_players_are_exempt() {
        let p = policy();
        let mut set = WorkingSet::new();
        set.insert(1, GameType::Global, state(22.0, 3.0, 0));
        p.run(&mut set, &BTreeMap::new());
        let g = set.get(1, GameType::Global).expect("present");
        assert!(g.rating.mu == 22.0);
        assert!(g.penalties == 0);
    }

    #[test]
    fn active_players_earn_penalties_back() {
        let p = policy();
        let mut set = WorkingSet::new();
        set.insert(1, GameType::Global, state(30.0, 3.0, 4));
        set.insert(1, GameType::Team, state(28.0, 3.0, 2));
        let games = BTreeMap::from([(1, 8)]);
        p.run(&mut set, &games);
        assert!(set.get(1, GameType::Global).expect("present").penalties == 1);
        // clamped at zero, mu and sigma untouched
        let team = set.get(1, GameType::Team).expect("present");
        assert!(team.penalties == 0);
        assert!(team.rating.mu == 28.0);
    }

    #[test]
    fn threshold_games_neither_penalise_nor_refund() {
        let p = policy();
        let mut set = WorkingSet::new();
        set.insert(1, GameType::Global, state(30.0, 3.0, 4));
        let games = BTreeMap::from([(1, 5)]);
        p.run(&mut set, &games);
        let g = set.get(1, GameType::Global).expect("present");
        assert!(g.penalties == 4);
        assert!(g.rating.mu == 30.0);
    }
}
