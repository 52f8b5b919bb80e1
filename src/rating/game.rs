use crate::AccountId;
use crate::GameId;
use crate::Timestamp;
use crate::UserId;

/// the five rating dimensions. every rated match touches Global plus the
/// dimension matching its structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GameType {
    Global,
    Duel,
    Ffa,
    Team,
    TeamFfa,
}

impl GameType {
    pub const ALL: [GameType; 5] = [
        GameType::Global,
        GameType::Duel,
        GameType::Ffa,
        GameType::Team,
        GameType::TeamFfa,
    ];

    /// stable storage id
    pub fn id(&self) -> i16 {
        match self {
            GameType::Global => 0,
            GameType::Duel => 1,
            GameType::Ffa => 2,
            GameType::Team => 3,
            GameType::TeamFfa => 4,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.id() == id)
    }

    /// dimension key as surfaced to the query side
    pub fn key(&self) -> &'static str {
        match self {
            GameType::Global => "global",
            GameType::Duel => "duel",
            GameType::Ffa => "ffa",
            GameType::Team => "team",
            GameType::TeamFfa => "teamFfa",
        }
    }

    /// initial ratings for team play follow the per-mod start-skill
    /// schedule instead of the environment defaults
    pub fn seeded_from_schedule(&self) -> bool {
        matches!(self, GameType::Team | GameType::TeamFfa)
    }
}

impl std::str::FromStr for GameType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(GameType::Global),
            "duel" => Ok(GameType::Duel),
            "ffa" => Ok(GameType::Ffa),
            "team" => Ok(GameType::Team),
            "teamffa" => Ok(GameType::TeamFfa),
            other => Err(format!("unknown game type {:?}", other)),
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GameType::Global => "Global",
            GameType::Duel => "Duel",
            GameType::Ffa => "FFA",
            GameType::Team => "Team",
            GameType::TeamFfa => "TeamFFA",
        };
        write!(f, "{}", name)
    }
}

/// why a queued match was terminally refused. the discriminant doubles as
/// the queue-entry status value, so refusals are visible after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFailure {
    Duplicate,
    UnknownMatch,
    Undecided,
    Cheating,
    BadTimestamp,
    InconsistentTimestamp,
    UnratableType,
}

impl GuardFailure {
    pub fn status(&self) -> i16 {
        match self {
            GuardFailure::Duplicate => 2,
            GuardFailure::UnknownMatch => 3,
            GuardFailure::Undecided => 4,
            GuardFailure::Cheating => 5,
            GuardFailure::BadTimestamp => 6,
            GuardFailure::InconsistentTimestamp => 7,
            GuardFailure::UnratableType => 8,
        }
    }
}

/// queue lifecycle for inbound match reports
pub const QUEUED: i16 = 0;
pub const IN_PROGRESS: i16 = 1;

/// one player row of a reported match
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRow {
    pub account: AccountId,
    pub user: UserId,
    pub team: i32,
    pub ally_team: i32,
    pub win: bool,
    pub ip: Option<u32>,
}

/// a completed-match report as delivered by the ingestion monitor.
/// immutable once recorded; the engine only ever reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub game_id: GameId,
    pub host: AccountId,
    pub started: Timestamp,
    pub ended: Timestamp,
    pub reported: Timestamp,
    pub mod_name: String,
    pub map_name: String,
    pub undecided: bool,
    pub cheating: bool,
    pub bots: usize,
    pub players: Vec<PlayerRow>,
}

impl MatchReport {
    /// players grouped by ally team, ascending by ally-team id
    pub fn ally_teams(&self) -> Vec<(i32, Vec<&PlayerRow>)> {
        let mut teams = std::collections::BTreeMap::<i32, Vec<&PlayerRow>>::new();
        for p in &self.players {
            teams.entry(p.ally_team).or_default().push(p);
        }
        teams.into_iter().collect()
    }

    /// ally teams where every member won
    pub fn winning_teams(&self) -> Vec<i32> {
        self.ally_teams()
            .into_iter()
            .filter(|(_, members)| members.iter().all(|p| p.win))
            .map(|(ally, _)| ally)
            .collect()
    }

    /// the dimension this match rates in, derived from its structure
    pub fn game_type(&self) -> Option<GameType> {
        let teams = self.ally_teams();
        let sizes = teams.iter().map(|(_, m)| m.len()).collect::<Vec<_>>();
        match (teams.len(), sizes.iter().max()) {
            (0..=1, _) => None,
            (2, Some(1)) => Some(GameType::Duel),
            (2, Some(_)) => Some(GameType::Team),
            (_, Some(1)) => Some(GameType::Ffa),
            (_, Some(_)) => Some(GameType::TeamFfa),
            (_, None) => None,
        }
    }

    /// structural ratability; mod resolution is checked separately
    pub fn ratable(&self) -> bool {
        self.ally_teams().len() >= 2 && self.bots == 0 && !self.undecided && !self.cheating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            game_id: 1,
            host: 1,
            started: 1_500_000_000,
            ended: 1_500_000_900,
            reported: 1_500_001_000,
            mod_name: "Balanced Annihilation V9.46".into(),
            map_name: "Comet Catcher".into(),
            undecided: false,
            cheating: false,
            bots: 0,
            players,
        }
    }

    #[test]
    fn structure_drives_game_type() {
        let duel = report(vec![player(1, 0, true), player(2, 1, false)]);
        assert!(duel.game_type() == Some(GameType::Duel));
        let ffa = report(vec![
            player(1, 0, true),
            player(2, 1, false),
            player(3, 2, false),
        ]);
        assert!(ffa.game_type() == Some(GameType::Ffa));
        let team = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 1, false),
            player(4, 1, false),
        ]);
        assert!(team.game_type() == Some(GameType::Team));
        let team_ffa = report(vec![
            player(1, 0, true),
            player(2, 0, true),
            player(3, 1, false),
            player(4, 1, false),
            player(5, 2, false),
            player(6, 2, false),
        ]);
        assert!(team_ffa.game_type() == Some(GameType::TeamFfa));
    }

    #[test]
    fn solo_is_unratable() {
        let solo = report(vec![player(1, 0, true)]);
        assert!(solo.game_type().is_none());
        assert!(!solo.ratable());
    }

    #[test]
    fn bots_undecided_and_cheating_block_rating() {
        let mut m = report(vec![player(1, 0, true), player(2, 1, false)]);
        assert!(m.ratable());
        m.bots = 1;
        assert!(!m.ratable());
        m.bots = 0;
        m.undecided = true;
        assert!(!m.ratable());
        m.undecided = false;
        m.cheating = true;
        assert!(!m.ratable());
    }

    #[test]
    fn winning_team_requires_all_members() {
        let m = report(vec![
            player(1, 0, true),
            player(2, 0, false),
            player(3, 1, false),
            player(4, 1, false),
        ]);
        assert!(m.winning_teams().is_empty());
    }

    #[test]
    fn guard_statuses_are_stable() {
        assert!(GuardFailure::Duplicate.status() == 2);
        assert!(GuardFailure::UnratableType.status() == 8);
    }
}
