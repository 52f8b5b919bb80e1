use super::Period;
use crate::AccountId;
use crate::GameId;
use crate::Timestamp;
use std::collections::BTreeMap;

/// a retro-active re-rate request, appended by the identity subsystem
/// (or an operator) and drained by the engine's background pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerateRequest {
    /// rerate every match the account ever played
    Account { account: AccountId },
    /// rerate the match's mod from the match's month forward
    Match { game: GameId },
    /// rerate one mod from a given period forward
    Game { mod_short: String, period: Period },
}

impl RerateRequest {
    /// single-letter storage tag
    pub fn tag(&self) -> &'static str {
        match self {
            RerateRequest::Account { .. } => "A",
            RerateRequest::Match { .. } => "M",
            RerateRequest::Game { .. } => "G",
        }
    }
}

/// a stored request row awaiting resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerateRow {
    pub id: i64,
    pub request: RerateRequest,
    pub requested: Timestamp,
}

/// the per-mod debounce ledger: earliest start period and latest request
/// timestamp. a mod's batch runs once the latest request has aged past
/// the grace delay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingRerates(BTreeMap<String, (Period, Timestamp)>);

impl PendingRerates {
    pub fn new() -> Self {
        Self::default()
    }

    /// fold a resolved (mod, start period) pair in, widening the span
    /// and refreshing the debounce clock
    pub fn merge(&mut self, mod_short: &str, start: Period, requested: Timestamp) {
        self.0
            .entry(mod_short.to_string())
            .and_modify(|(period, stamp)| {
                *period = (*period).min(start);
                *stamp = (*stamp).max(requested);
            })
            .or_insert((start, requested));
    }

    /// mods whose grace delay has fully elapsed
    pub fn due(&self, now: Timestamp, delay: i64) -> Vec<(String, Period)> {
        self.0
            .iter()
            .filter(|&(_, &(_, stamp))| now - stamp >= delay)
            .map(|(m, &(period, _))| (m.clone(), period))
            .collect()
    }

    pub fn remove(&mut self, mod_short: &str) {
        self.0.remove(mod_short);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &(Period, Timestamp))> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Period, Timestamp)> for PendingRerates {
    fn from_iter<I: IntoIterator<Item = (String, Period, Timestamp)>>(iter: I) -> Self {
        let mut pending = Self::new();
        for (m, p, t) in iter {
            pending.merge(&m, p, t);
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_earliest_period_and_latest_stamp() {
        let mut pending = PendingRerates::new();
        pending.merge("ba", Period::new(2020, 3), 1000);
        pending.merge("ba", Period::new(2019, 11), 900);
        pending.merge("ba", Period::new(2020, 5), 1500);
        let (_, &(period, stamp)) = pending.iter().next().expect("one mod");
        assert!(period == Period::new(2019, 11));
        assert!(stamp == 1500);
    }

    #[test]
    fn due_waits_out_the_grace_delay() {
        let mut pending = PendingRerates::new();
        pending.merge("ba", Period::new(2020, 3), 1000);
        pending.merge("zk", Period::new(2020, 1), 2000);
        let due = pending.due(1400, 300);
        assert!(due.len() == 1);
        assert!(due[0].0 == "ba");
        let due = pending.due(2300, 300);
        assert!(due.len() == 2);
    }

    #[test]
    fn mods_debounce_independently() {
        let mut pending = PendingRerates::new();
        pending.merge("ba", Period::new(2020, 3), 1000);
        pending.merge("ba", Period::new(2020, 3), 1399);
        assert!(pending.due(1400, 300).is_empty());
    }
}
