use crate::Mu;
use crate::Sigma;
use crate::Skill;

/// an opaque (mu, sigma) skill estimate. the conservative `skill` readout
/// is what every leaderboard and query surface reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub mu: Mu,
    pub sigma: Sigma,
}

impl Rating {
    pub fn new(mu: Mu, sigma: Sigma) -> Self {
        Self { mu, sigma }
    }

    /// conservative skill estimate, three deviations below the mean
    pub fn skill(&self) -> Skill {
        self.mu - 3.0 * self.sigma
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MU, crate::DEFAULT_SIGMA)
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}±{:.3}", self.mu, self.sigma)
    }
}

impl crate::Arbitrary for Rating {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Self::new(rng.random_range(5.0..45.0), rng.random_range(1.0..9.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_is_three_sigma_conservative() {
        let r = Rating::new(25.0, 25.0 / 3.0);
        assert!(r.skill() == 0.0);
    }
}
