use crate::AccountId;
use crate::Mu;
use crate::UserId;
use crate::identity::SmurfStatus;
use crate::rating::GameType;
use crate::rating::Period;
use crate::store::Identity;
use crate::store::Scores;
use crate::store::StoreError;
use crate::trueskill::Rating;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tokio_postgres::Client;

/// an unrated player's seed mean, by lobby rank
pub const RANK_SEED_MU: [Mu; 8] = [20.0, 22.0, 23.0, 24.0, 25.0, 26.0, 28.0, 30.0];

/// a Global sigma above this marks the identity as uncertain enough to
/// look at smurf neighbours
const LOOSE_GLOBAL_SIGMA: f64 = 25.0 / 9.0;
/// a TeamFFA sigma above this blends the mean toward Global
const LOOSE_TEAMFFA_SIGMA: f64 = 25.0 / 6.0;
/// the span over which the TeamFFA blend saturates
const BLEND_SPAN: f64 = 25.0 / 3.0;

/// the query-side answer: one rating per dimension
pub type SkillReport = BTreeMap<GameType, Rating>;

/// blend an uncertain TeamFFA mean toward the Global mean. sigma stays
/// untouched.
pub fn blend_team_ffa(team_ffa: Rating, global_mu: Mu) -> Rating {
    if team_ffa.sigma <= LOOSE_TEAMFFA_SIGMA {
        return team_ffa;
    }
    let factor = ((team_ffa.sigma - LOOSE_TEAMFFA_SIGMA) / BLEND_SPAN).clamp(0.0, 1.0);
    Rating::new(
        team_ffa.mu + (global_mu - team_ffa.mu) * factor,
        team_ffa.sigma,
    )
}

/// the seed rating for a never-rated player of a given lobby rank
pub fn rank_seed(rank: i16) -> Rating {
    let mu = RANK_SEED_MU[rank.clamp(0, 7) as usize];
    Rating::new(mu, crate::DEFAULT_SIGMA)
}

/// the five (mu, sigma) dimensions for an account, with the smurf and
/// ip expansions the lobby query contract requires
pub async fn skills(
    client: &Client,
    period: Period,
    account: AccountId,
    ip: Option<u32>,
    mod_short: &str,
) -> Result<SkillReport, StoreError> {
    let user = client.lookup_user_id(account).await?.unwrap_or(account);
    let chosen = best_identity(client, period, mod_short, user, ip).await?;
    let seed = {
        let facts = client.account_facts(&BTreeSet::from([account])).await?;
        rank_seed(facts[0].rank)
    };
    let mut report = SkillReport::new();
    for dim in GameType::ALL {
        let rating = client
            .rating_row(period, chosen, mod_short, dim)
            .await?
            .map(|state| state.rating)
            .unwrap_or(seed);
        report.insert(dim, rating);
    }
    let global_mu = report[&GameType::Global].mu;
    report
        .entry(GameType::TeamFfa)
        .and_modify(|r| *r = blend_team_ffa(*r, global_mu));
    Ok(report)
}

/// with a loose Global sigma, the best-rated confirmed smurf (and, when
/// an address is offered, the best co-located account not cleared by a
/// not-smurf or probable edge) answers for the user
async fn best_identity(
    client: &Client,
    period: Period,
    mod_short: &str,
    user: UserId,
    ip: Option<u32>,
) -> Result<UserId, StoreError> {
    let sigma = client
        .rating_row(period, user, mod_short, GameType::Global)
        .await?
        .map(|state| state.rating.sigma)
        .unwrap_or(crate::DEFAULT_SIGMA);
    if sigma <= LOOSE_GLOBAL_SIGMA {
        return Ok(user);
    }
    let accounts = client.accounts_of(user).await?;
    let edges = client.edges_of(&accounts).await?;
    let mut candidates = BTreeSet::from([user]);
    for edge in &edges {
        if edge.status == SmurfStatus::Confirmed {
            let outside = [edge.id1, edge.id2]
                .into_iter()
                .find(|id| !accounts.contains(id));
            if let Some(id) = outside
                && let Some(owner) = client.lookup_user_id(id).await?
            {
                candidates.insert(owner);
            }
        }
    }
    if let Some(ip) = ip {
        let cleared = edges
            .iter()
            .filter(|e| matches!(e.status, SmurfStatus::NotSmurf | SmurfStatus::Probable))
            .flat_map(|e| [e.id1, e.id2])
            .filter(|id| !accounts.contains(id))
            .collect::<BTreeSet<_>>();
        for id in client.accounts_on_ip(ip).await? {
            if accounts.contains(&id) || cleared.contains(&id) {
                continue;
            }
            if let Some(owner) = client.lookup_user_id(id).await? {
                candidates.insert(owner);
            }
        }
    }
    let mut best = (user, f64::NEG_INFINITY);
    for candidate in candidates {
        if let Some(state) = client
            .rating_row(period, candidate, mod_short, GameType::Global)
            .await?
        {
            if state.rating.skill() > best.1 {
                best = (candidate, state.rating.skill());
            }
        }
    }
    Ok(best.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tight_team_ffa_ratings_pass_through() {
        let r = Rating::new(28.0, 3.0);
        assert!(blend_team_ffa(r, 20.0) == r);
    }

    #[test]
    fn loose_team_ffa_means_drift_toward_global() {
        let r = Rating::new(30.0, 25.0 / 6.0 + 25.0 / 6.0);
        let blended = blend_team_ffa(r, 20.0);
        // halfway through the span: mean moves halfway
        assert!((blended.mu - 25.0).abs() < 1e-9, "{}", blended.mu);
        assert!(blended.sigma == r.sigma);
    }

    #[test]
    fn blend_factor_saturates() {
        let r = Rating::new(30.0, 100.0);
        let blended = blend_team_ffa(r, 18.0);
        assert!((blended.mu - 18.0).abs() < 1e-9);
    }

    #[test]
    fn rank_seeds_follow_the_table() {
        assert!(rank_seed(0).mu == 20.0);
        assert!(rank_seed(4).mu == 25.0);
        assert!(rank_seed(7).mu == 30.0);
        assert!(rank_seed(99).mu == 30.0);
        assert!((rank_seed(3).sigma - 25.0 / 3.0).abs() < 1e-12);
    }
}
