use super::GameType;
use super::GuardFailure;
use super::MatchReport;
use super::StartSkills;
use super::WorkingSet;
use crate::AccountId;
use crate::GameId;
use crate::UserId;
use crate::trueskill::Rating;
use crate::trueskill::TrueSkill;
use std::collections::BTreeMap;

/// one per-match rating row: the before/after pair for one player in one
/// dimension. written exactly once per rated match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRatingRow {
    pub game_id: GameId,
    pub account: AccountId,
    pub user: UserId,
    pub game_type: GameType,
    pub before: Rating,
    pub after: Rating,
}

/// the structure of a ratable outcome, extracted once and applied to the
/// type-specific and Global dimensions independently
enum Outcome {
    Duel {
        winner: AccountId,
        loser: AccountId,
        tie: bool,
    },
    Ffa {
        winner: AccountId,
        losers: Vec<AccountId>,
    },
    Team {
        first: Vec<AccountId>,
        second: Vec<AccountId>,
        tie: bool,
    },
    TeamFfa {
        winner: Vec<AccountId>,
        losers: Vec<Vec<AccountId>>,
    },
}

/// the per-match rater. pure: all state flows through the working set.
pub struct Rater<'a> {
    pub env: &'a TrueSkill,
    pub starts: &'a StartSkills,
}

impl Rater<'_> {
    /// rate a match against the working set. every player is seeded in
    /// all five dimensions on first contact; the type-specific dimension
    /// and Global are then recomputed and one row per player per
    /// dimension is returned.
    pub fn rate(
        &self,
        m: &MatchReport,
        mod_short: &str,
        set: &mut WorkingSet,
    ) -> Result<Vec<GameRatingRow>, GuardFailure> {
        let gt = m.game_type().ok_or(GuardFailure::UnratableType)?;
        let outcome = Self::outcome(m)?;
        let users = m
            .players
            .iter()
            .map(|p| (p.account, p.user))
            .collect::<BTreeMap<_, _>>();
        let mut before = BTreeMap::new();
        for p in &m.players {
            for dim in GameType::ALL {
                let seed = self.seed(dim, mod_short, m);
                before.insert((p.account, dim), set.rating_or_seed(p.user, dim, seed));
            }
        }
        let mut after = before.clone();
        for dim in [gt, GameType::Global] {
            let pre = m
                .players
                .iter()
                .map(|p| (p.account, before[&(p.account, dim)]))
                .collect::<BTreeMap<_, _>>();
            let mut post = self.apply(&outcome, &pre);
            if matches!(dim, GameType::Team | GameType::TeamFfa) {
                for (account, rating) in post.iter_mut() {
                    rating.sigma = rating.sigma.min(pre[account].sigma);
                }
            }
            for (account, rating) in post {
                set.set_rating(users[&account], dim, rating);
                after.insert((account, dim), rating);
            }
        }
        Ok(m.players
            .iter()
            .flat_map(|p| {
                GameType::ALL.into_iter().map(|dim| GameRatingRow {
                    game_id: m.game_id,
                    account: p.account,
                    user: p.user,
                    game_type: dim,
                    before: before[&(p.account, dim)],
                    after: after[&(p.account, dim)],
                })
            })
            .collect())
    }

    /// initial rating for a first contact in a dimension
    fn seed(&self, dim: GameType, mod_short: &str, m: &MatchReport) -> Rating {
        if dim.seeded_from_schedule() {
            Rating::new(
                self.starts.mu_at(mod_short, m.reported, self.env.mu),
                self.env.sigma,
            )
        } else {
            self.env.rating()
        }
    }

    fn outcome(m: &MatchReport) -> Result<Outcome, GuardFailure> {
        let teams = m.ally_teams();
        let winners = m.winning_teams();
        let members = |ally: i32| -> Vec<AccountId> {
            teams
                .iter()
                .find(|(a, _)| *a == ally)
                .map(|(_, ms)| ms.iter().map(|p| p.account).collect())
                .unwrap_or_default()
        };
        match m.game_type().ok_or(GuardFailure::UnratableType)? {
            GameType::Global => Err(GuardFailure::UnratableType),
            GameType::Duel => {
                let a = teams[0].1[0];
                let b = teams[1].1[0];
                if a.user == b.user {
                    return Err(GuardFailure::UnratableType);
                }
                match winners.as_slice() {
                    [w] => {
                        let (winner, loser) = if *w == a.ally_team {
                            (a.account, b.account)
                        } else {
                            (b.account, a.account)
                        };
                        Ok(Outcome::Duel {
                            winner,
                            loser,
                            tie: false,
                        })
                    }
                    [] => Ok(Outcome::Duel {
                        winner: a.account,
                        loser: b.account,
                        tie: true,
                    }),
                    _ => Err(GuardFailure::UnratableType),
                }
            }
            GameType::Ffa => match winners.as_slice() {
                [w] => Ok(Outcome::Ffa {
                    winner: members(*w)[0],
                    losers: teams
                        .iter()
                        .filter(|(a, _)| a != w)
                        .map(|(_, ms)| ms[0].account)
                        .collect(),
                }),
                _ => Err(GuardFailure::UnratableType),
            },
            GameType::Team => {
                let n1 = teams[0].1.len();
                let n2 = teams[1].1.len();
                if 3 * n1.abs_diff(n2) > n1.max(n2) {
                    return Err(GuardFailure::UnratableType);
                }
                match winners.as_slice() {
                    [w] => Ok(Outcome::Team {
                        first: members(*w),
                        second: teams
                            .iter()
                            .find(|(a, _)| a != w)
                            .map(|(a, _)| members(*a))
                            .expect("two ally teams"),
                        tie: false,
                    }),
                    [] => Ok(Outcome::Team {
                        first: members(teams[0].0),
                        second: members(teams[1].0),
                        tie: true,
                    }),
                    _ => Err(GuardFailure::UnratableType),
                }
            }
            GameType::TeamFfa => {
                let sizes = teams.iter().map(|(_, ms)| ms.len()).collect::<Vec<_>>();
                let min = sizes.iter().min().expect("nonempty");
                let max = sizes.iter().max().expect("nonempty");
                if max - min > 1 {
                    return Err(GuardFailure::UnratableType);
                }
                match winners.as_slice() {
                    [w] => Ok(Outcome::TeamFfa {
                        winner: members(*w),
                        losers: teams
                            .iter()
                            .filter(|(a, _)| a != w)
                            .map(|(a, _)| members(*a))
                            .collect(),
                    }),
                    _ => Err(GuardFailure::UnratableType),
                }
            }
        }
    }

    /// run the outcome against one dimension's pre-ratings
    fn apply(
        &self,
        outcome: &Outcome,
        pre: &BTreeMap<AccountId, Rating>,
    ) -> BTreeMap<AccountId, Rating> {
        let mut post = BTreeMap::new();
        match outcome {
            Outcome::Duel { winner, loser, tie } => {
                let (w, l) = self.env.rate_1v1(pre[winner], pre[loser], *tie);
                post.insert(*winner, w);
                post.insert(*loser, l);
            }
            Outcome::Ffa { winner, losers } => {
                let w0 = pre[winner];
                let mut teams = vec![vec![w0]];
                teams.extend(losers.iter().map(|l| vec![pre[l]]));
                let mut ranks = vec![1];
                ranks.extend(std::iter::repeat_n(2, losers.len()));
                let rated = self.env.rate(&teams, &ranks);
                let real = rated[0][0].mu - w0.mu;
                let fakes = losers
                    .iter()
                    .map(|l| self.env.rate_1v1(w0, pre[l], false))
                    .collect::<Vec<_>>();
                let ratio = Self::ratio(real, fakes.iter().map(|(fw, _)| fw.mu - w0.mu).sum());
                post.insert(*winner, rated[0][0]);
                for (l, (_, fake)) in losers.iter().zip(&fakes) {
                    let r0 = pre[l];
                    post.insert(
                        *l,
                        Rating::new(
                            r0.mu + ratio * (fake.mu - r0.mu),
                            r0.sigma + ratio * (fake.sigma - r0.sigma),
                        ),
                    );
                }
            }
            Outcome::Team { first, second, tie } => {
                let t1 = first.iter().map(|a| pre[a]).collect::<Vec<_>>();
                let t2 = second.iter().map(|a| pre[a]).collect::<Vec<_>>();
                let ranks = [0, if *tie { 0 } else { 1 }];
                let rated = self.env.rate(&[t1, t2], &ranks);
                for (a, r) in first.iter().zip(&rated[0]) {
                    post.insert(*a, *r);
                }
                for (a, r) in second.iter().zip(&rated[1]) {
                    post.insert(*a, *r);
                }
            }
            Outcome::TeamFfa { winner, losers } => {
                let w0 = winner.iter().map(|a| pre[a]).collect::<Vec<_>>();
                let mut teams = vec![w0.clone()];
                teams.extend(
                    losers
                        .iter()
                        .map(|t| t.iter().map(|a| pre[a]).collect::<Vec<_>>()),
                );
                let mut ranks = vec![1];
                ranks.extend(std::iter::repeat_n(2, losers.len()));
                let rated = self.env.rate(&teams, &ranks);
                let real = rated[0]
                    .iter()
                    .zip(&w0)
                    .map(|(after, b4)| after.mu - b4.mu)
                    .sum::<f64>();
                let fakes = losers
                    .iter()
                    .map(|t| {
                        let ratings = t.iter().map(|a| pre[a]).collect::<Vec<_>>();
                        self.env.rate(&[w0.clone(), ratings], &[0, 1])
                    })
                    .collect::<Vec<_>>();
                let ratio = Self::ratio(
                    real,
                    fakes
                        .iter()
                        .map(|f| {
                            f[0].iter()
                                .zip(&w0)
                                .map(|(after, b4)| after.mu - b4.mu)
                                .sum::<f64>()
                        })
                        .sum(),
                );
                for (a, r) in winner.iter().zip(&rated[0]) {
                    post.insert(*a, *r);
                }
                for (t, fake) in losers.iter().zip(&fakes) {
                    for (a, f) in t.iter().zip(&fake[1]) {
                        let r0 = pre[a];
                        // anomalous fake sigma growth clamps to zero
                        let dsigma = (f.sigma - r0.sigma).min(0.0);
                        post.insert(
                            *a,
                            Rating::new(r0.mu + ratio * (f.mu - r0.mu), r0.sigma + ratio * dsigma),
                        );
                    }
                }
            }
        }
        post
    }

    fn ratio(real: f64, fake_sum: f64) -> f64 {
        if fake_sum.abs() < f64::EPSILON {
            0.0
        } else {
            real / fake_sum
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::PlayerRow;

    const EPSILON: f64 = 1e-6;

    fn env() -> TrueSkill {
        TrueSkill::default()
    }

    fn player(account: AccountId, ally: i32, win: bool) -> PlayerRow {
        PlayerRow {
            account,
            user: account,
            team: ally,
            ally_team: ally,
            win,
            ip: None,
        }
    }

    fn report(players: Vec<PlayerRow>) -> MatchReport {
        MatchReport {
            game_id: 42,
            host: 10,
            started: 1_583_020_800,
            ended: 1_583_021_700,
            reported: 1_583_021_760,
            mod_name: "Balanced Annihilation V9.46".into(),
            map_name: "Comet Catcher".into(),
            undecided: false,
            cheating: false,
            bots: 0,
            players,
        }
    }

    fn rate(m: &MatchReport, set: &mut WorkingSet) -> Vec<GameRatingRow> {
        let env = env();
        let starts = StartSkills::default();
        let rater = Rater {
            env: &env,
            starts: &starts,
        };
        rater.rate(m, "ba", set).expect("ratable")
    }

    #[test]
    fn duel_win_moves_both_symmetrically() {
        let mut set = WorkingSet::new();
        let m = report(vec![player(10, 0, true), player(20, 1, false)]);
        let rows = rate(&m, &mut set);
        assert!(rows.len() == 2 * 5);
        let u = set.get(10, GameType::Duel).expect("rated").rating;
        let v = set.get(20, GameType::Duel).expect("rated").rating;
        assert!(u.mu > v.mu);
        assert!(u.sigma < 25.0 / 3.0);
        assert!((u.sigma - v.sigma).abs() < EPSILON);
        let g = set.get(10, GameType::Global).expect("rated").rating;
        assert!((g.mu - u.mu).abs() < EPSILON);
    }

    #[test]
    fn duel_tie_leaves_means_untouched() {
        let mut set = WorkingSet::new();
        let m = report(vec![player(10, 0, false), player(20, 1, false)]);
        rate(&m, &mut set);
        let u = set.get(10, GameType::Duel).expect("rated").rating;
        let v = set.get(20, GameType::Duel).expect("rated").rating;
        assert!((u.mu - 25.0).abs() < EPSILON);
        assert!((v.mu - 25.0).abs() < EPSILON);
        assert!(u.sigma < 25.0 / 3.0);
    }

    #[test]
    fn duel_guards_same_user_twice() {
        let env = env();
        let starts = StartSkills::default();
        let rater = Rater {
            env: &env,
            starts: &starts,
        };
        let mut twice = report(vec![player(10, 0, true), player(11, 1, false)]);
        twice.players[1].user = 10;
        let mut set = WorkingSet::new();
        assert!(rater.rate(&twice, "ba", &mut set) == Err(GuardFailure::UnratableType));
    }

    #[test]
    fn team_match_seeds_all_five_dimensions_and_clamps_sigma() {
        let mut set = WorkingSet::new();
        set.set_rating(1, GameType::Team, Rating::new(28.0, 3.0));
        set.set_rating(2, GameType::Team, Rating::new(27.0, 3.0));
        set.set_rating(3, GameType::Team, Rating::new(26.0, 3.0));
        let m = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 1, false),
            player(4, 1, false),
        ]);
        let rows = rate(&m, &mut set);
        assert!(rows.len() == 4 * 5);
        // the fresh player now exists in every dimension
        for dim in GameType::ALL {
            assert!(set.get(4, dim).is_some());
        }
        for row in rows.iter().filter(|r| r.game_type == GameType::Team) {
            assert!(row.after.sigma <= row.before.sigma + EPSILON);
        }
    }

    #[test]
    fn team_imbalance_is_guarded() {
        let env = env();
        let starts = StartSkills::default();
        let rater = Rater {
            env: &env,
            starts: &starts,
        };
        let m = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 0, true),
            player(4, 0, true),
            player(5, 1, false),
        ]);
        let mut set = WorkingSet::new();
        assert!(rater.rate(&m, "ba", &mut set) == Err(GuardFailure::UnratableType));
    }

    #[test]
    fn ffa_conserves_total_mean_for_fresh_players() {
        let mut set = WorkingSet::new();
        let m = report(vec![
            player(1, 0, true),
            player(2, 1, false),
            player(3, 2, false),
            player(4, 3, false),
        ]);
        rate(&m, &mut set);
        let total = [1, 2, 3, 4]
            .iter()
            .map(|&a| set.get(a, GameType::Ffa).expect("rated").rating.mu - 25.0)
            .sum::<f64>();
        assert!(total.abs() < EPSILON, "{}", total);
        let w = set.get(1, GameType::Ffa).expect("rated").rating;
        assert!(w.mu > 25.0);
        for a in [2, 3, 4] {
            assert!(set.get(a, GameType::Ffa).expect("rated").rating.mu < 25.0);
        }
    }

    #[test]
    fn ffa_requires_exactly_one_winner() {
        let env = env();
        let starts = StartSkills::default();
        let rater = Rater {
            env: &env,
            starts: &starts,
        };
        let m = report(vec![
            player(1, 0, true),
            player(2, 1, true),
            player(3, 2, false),
        ]);
        let mut set = WorkingSet::new();
        assert!(rater.rate(&m, "ba", &mut set) == Err(GuardFailure::UnratableType));
    }

    #[test]
    fn team_ffa_scales_loser_updates() {
        let mut set = WorkingSet::new();
        let m = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 1, false),
            player(4, 1, false),
            player(5, 2, false),
            player(6, 2, false),
        ]);
        rate(&m, &mut set);
        for a in [1, 2] {
            let r = set.get(a, GameType::TeamFfa).expect("rated").rating;
            assert!(r.mu > 25.0);
        }
        for a in [3, 4, 5, 6] {
            let r = set.get(a, GameType::TeamFfa).expect("rated").rating;
            assert!(r.mu < 25.0);
            assert!(r.sigma <= 25.0 / 3.0 + EPSILON);
        }
    }

    #[test]
    fn team_ffa_uneven_teams_are_guarded() {
        let env = env();
        let starts = StartSkills::default();
        let rater = Rater {
            env: &env,
            starts: &starts,
        };
        let m = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 0, true),
            player(4, 1, false),
            player(5, 2, false),
            player(6, 2, false),
        ]);
        let mut set = WorkingSet::new();
        assert!(rater.rate(&m, "ba", &mut set) == Err(GuardFailure::UnratableType));
    }

    #[test]
    fn start_skill_schedule_seeds_team_dimensions() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("ba".to_string(), vec![(0, 20.0)]);
        let starts = StartSkills::from(map);
        let env = env();
        let rater = Rater {
            env: &env,
            starts: &starts,
        };
        let m = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 1, false),
            player(4, 1, false),
        ]);
        let mut set = WorkingSet::new();
        let rows = rater.rate(&m, "ba", &mut set).expect("ratable");
        let seeded = rows
            .iter()
            .find(|r| r.account == 1 && r.game_type == GameType::TeamFfa)
            .expect("row");
        assert!(seeded.before.mu == 20.0);
        let global = rows
            .iter()
            .find(|r| r.account == 1 && r.game_type == GameType::Global)
            .expect("row");
        assert!(global.before.mu == 25.0);
    }
}
