use crate::Mu;
use crate::Timestamp;
use std::collections::BTreeMap;

/// per-mod schedule of starting means for team play. each mod maps to a
/// piecewise-linear curve over report timestamps; outside the curve the
/// nearest endpoint holds. mods without a schedule fall back to the
/// environment default.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StartSkills(BTreeMap<String, Vec<(Timestamp, Mu)>>);

impl StartSkills {
    pub fn mu_at(&self, mod_short: &str, at: Timestamp, fallback: Mu) -> Mu {
        let Some(points) = self.0.get(mod_short).filter(|p| !p.is_empty()) else {
            return fallback;
        };
        let first = points.first().expect("nonempty schedule");
        let last = points.last().expect("nonempty schedule");
        if at <= first.0 {
            return first.1;
        }
        if at >= last.0 {
            return last.1;
        }
        let after = points.iter().position(|&(t, _)| t > at).expect("inside curve");
        let (t0, m0) = points[after - 1];
        let (t1, m1) = points[after];
        let span = (t1 - t0) as f64;
        let progress = (at - t0) as f64 / span;
        m0 + (m1 - m0) * progress
    }
}

impl From<BTreeMap<String, Vec<(Timestamp, Mu)>>> for StartSkills {
    fn from(schedules: BTreeMap<String, Vec<(Timestamp, Mu)>>) -> Self {
        let mut schedules = schedules;
        for points in schedules.values_mut() {
            points.sort_by_key(|&(t, _)| t);
        }
        Self(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> StartSkills {
        let mut map = BTreeMap::new();
        map.insert("ba".to_string(), vec![(1000, 20.0), (2000, 30.0)]);
        StartSkills::from(map)
    }

    #[test]
    fn endpoints_hold_outside_the_curve() {
        let s = schedule();
        assert!(s.mu_at("ba", 0, 25.0) == 20.0);
        assert!(s.mu_at("ba", 5000, 25.0) == 30.0);
    }

    #[test]
    fn interpolates_between_points() {
        let s = schedule();
        assert!((s.mu_at("ba", 1500, 25.0) - 25.0).abs() < 1e-12);
        assert!((s.mu_at("ba", 1250, 25.0) - 22.5).abs() < 1e-12);
    }

    #[test]
    fn unknown_mod_falls_back() {
        let s = schedule();
        assert!(s.mu_at("zk", 1500, 25.0) == 25.0);
    }
}
