mod gaussian;
mod graph;
mod normal;
mod rating;

pub use gaussian::*;
pub use graph::*;
pub use normal::*;
pub use rating::*;

use crate::Mu;
use crate::Sigma;

/// TrueSkill environment. Five scalars fully determine the update
/// behaviour; everything downstream treats ratings as opaque (mu, sigma)
/// pairs and this struct as a pure function layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrueSkill {
    pub mu: Mu,
    pub sigma: Sigma,
    pub beta: f64,
    pub tau: f64,
    pub draw_probability: f64,
}

impl Default for TrueSkill {
    fn default() -> Self {
        Self {
            mu: crate::DEFAULT_MU,
            sigma: crate::DEFAULT_SIGMA,
            beta: crate::DEFAULT_BETA,
            tau: crate::DEFAULT_TAU,
            draw_probability: crate::DEFAULT_DRAW_PROBABILITY,
        }
    }
}

impl TrueSkill {
    /// a fresh rating at the configured defaults
    pub fn rating(&self) -> Rating {
        Rating::new(self.mu, self.sigma)
    }

    /// rate an outcome over any number of teams. ranks encode the
    /// standings (0 = first); equal ranks mean the teams tied. teams come
    /// back in their input order with updated ratings.
    pub fn rate(&self, teams: &[Vec<Rating>], ranks: &[usize]) -> Vec<Vec<Rating>> {
        assert!(teams.len() == ranks.len());
        assert!(teams.len() >= 2);
        assert!(teams.iter().all(|t| !t.is_empty()));
        Graph::new(self, teams, ranks).converge().posteriors()
    }

    /// rate a two-player outcome. the first argument is the winner unless
    /// the outcome was a tie.
    pub fn rate_1v1(&self, winner: Rating, loser: Rating, tie: bool) -> (Rating, Rating) {
        let teams = [vec![winner], vec![loser]];
        let ranks = [0, if tie { 0 } else { 1 }];
        let rated = self.rate(&teams, &ranks);
        (rated[0][0], rated[1][0])
    }

    /// the margin inside which a performance difference counts as a draw,
    /// for a comparison spanning `size` players
    pub(crate) fn draw_margin(&self, size: usize) -> f64 {
        ppf((self.draw_probability + 1.0) / 2.0) * (size as f64).sqrt() * self.beta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    /// reference values from the canonical TrueSkill implementation at
    /// mu = 25, sigma = 25/3, beta = 25/6, tau = 25/300, p_draw = 0.10

    #[test]
    fn head_to_head_win() {
        let env = TrueSkill::default();
        let (w, l) = env.rate_1v1(env.rating(), env.rating(), false);
        assert!(close(w.mu, 29.39583201999916, EPSILON), "{}", w.mu);
        assert!(close(w.sigma, 7.171475587326186, EPSILON), "{}", w.sigma);
        assert!(close(l.mu, 20.60416798000084, EPSILON), "{}", l.mu);
        assert!(close(l.sigma, 7.171475587326186, EPSILON), "{}", l.sigma);
    }

    #[test]
    fn head_to_head_draw() {
        let env = TrueSkill::default();
        let (a, b) = env.rate_1v1(env.rating(), env.rating(), true);
        assert!(close(a.mu, 25.0, EPSILON), "{}", a.mu);
        assert!(close(b.mu, 25.0, EPSILON), "{}", b.mu);
        assert!(close(a.sigma, 6.457515683575458, EPSILON), "{}", a.sigma);
        assert!(close(b.sigma, a.sigma, EPSILON));
    }

    #[test]
    fn two_by_two() {
        let env = TrueSkill::default();
        let t1 = vec![env.rating(), env.rating()];
        let t2 = vec![env.rating(), env.rating()];
        let rated = env.rate(&[t1, t2], &[0, 1]);
        for r in &rated[0] {
            assert!(close(r.mu, 28.108, 1e-3), "{}", r.mu);
            assert!(close(r.sigma, 7.774, 1e-3), "{}", r.sigma);
        }
        for r in &rated[1] {
            assert!(close(r.mu, 21.892, 1e-3), "{}", r.mu);
            assert!(close(r.sigma, 7.774, 1e-3), "{}", r.sigma);
        }
    }

    #[test]
    fn three_way_free_for_all() {
        let env = TrueSkill::default();
        let teams = vec![vec![env.rating()], vec![env.rating()], vec![env.rating()]];
        let rated = env.rate(&teams, &[0, 1, 2]);
        assert!(close(rated[0][0].mu, 31.675, 1e-3), "{}", rated[0][0].mu);
        assert!(close(rated[0][0].sigma, 6.656, 1e-3), "{}", rated[0][0].sigma);
        assert!(close(rated[1][0].mu, 25.000, 1e-3), "{}", rated[1][0].mu);
        assert!(close(rated[1][0].sigma, 6.208, 1e-3), "{}", rated[1][0].sigma);
        assert!(close(rated[2][0].mu, 18.325, 1e-3), "{}", rated[2][0].mu);
        assert!(close(rated[2][0].sigma, 6.656, 1e-3), "{}", rated[2][0].sigma);
    }

    #[test]
    fn winners_rise_losers_fall() {
        let env = TrueSkill::default();
        let (w, l) = env.rate_1v1(env.rating(), env.rating(), false);
        assert!(w.mu > env.mu);
        assert!(l.mu < env.mu);
        assert!(w.sigma < env.sigma);
        assert!(l.sigma < env.sigma);
    }

    #[test]
    fn input_order_is_preserved_under_rank_permutation() {
        let env = TrueSkill::default();
        let a = Rating::new(30.0, 4.0);
        let b = Rating::new(20.0, 6.0);
        // b finishes first despite being listed second
        let rated = env.rate(&[vec![a], vec![b]], &[1, 0]);
        assert!(rated[0][0].mu < a.mu);
        assert!(rated[1][0].mu > b.mu);
    }

    #[test]
    fn tied_teams_converge() {
        let env = TrueSkill::default();
        let a = Rating::new(30.0, 4.0);
        let b = Rating::new(20.0, 4.0);
        let rated = env.rate(&[vec![a], vec![b]], &[0, 0]);
        assert!(rated[0][0].mu < a.mu);
        assert!(rated[1][0].mu > b.mu);
    }

    #[test]
    fn underdog_upset_moves_more() {
        let env = TrueSkill::default();
        let favourite = Rating::new(30.0, 25.0 / 3.0);
        let underdog = Rating::new(20.0, 25.0 / 3.0);
        let (w1, _) = env.rate_1v1(favourite, underdog, false);
        let (w2, _) = env.rate_1v1(underdog, favourite, false);
        assert!(w2.mu - underdog.mu > w1.mu - favourite.mu);
    }
}
