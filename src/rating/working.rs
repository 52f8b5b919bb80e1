use super::GameType;
use crate::UserId;
use crate::trueskill::Rating;
use std::collections::BTreeMap;

/// a player's standing in one dimension of one period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub rating: Rating,
    pub penalties: u32,
}

impl PlayerState {
    pub fn new(rating: Rating) -> Self {
        Self {
            rating,
            penalties: 0,
        }
    }
}

/// the in-memory rating state a rating pass mutates: one entry per
/// (user, dimension). incremental rating loads it per match; batch
/// re-rating carries it across a whole month before flushing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    entries: BTreeMap<(UserId, GameType), PlayerState>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: UserId, dim: GameType) -> Option<&PlayerState> {
        self.entries.get(&(user, dim))
    }

    pub fn insert(&mut self, user: UserId, dim: GameType, state: PlayerState) {
        self.entries.insert((user, dim), state);
    }

    /// the current rating, seeding the entry first if the player has
    /// never been rated in this dimension
    pub fn rating_or_seed(&mut self, user: UserId, dim: GameType, seed: Rating) -> Rating {
        self.entries
            .entry((user, dim))
            .or_insert_with(|| PlayerState::new(seed))
            .rating
    }

    pub fn set_rating(&mut self, user: UserId, dim: GameType, rating: Rating) {
        self.entries
            .entry((user, dim))
            .or_insert_with(|| PlayerState::new(rating))
            .rating = rating;
    }

    pub fn state_mut(&mut self, user: UserId, dim: GameType) -> Option<&mut PlayerState> {
        self.entries.get_mut(&(user, dim))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(UserId, GameType), &PlayerState)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_happens_once() {
        let mut set = WorkingSet::new();
        let seeded = set.rating_or_seed(7, GameType::Duel, Rating::new(20.0, 8.0));
        assert!(seeded.mu == 20.0);
        set.set_rating(7, GameType::Duel, Rating::new(26.0, 7.0));
        let again = set.rating_or_seed(7, GameType::Duel, Rating::new(20.0, 8.0));
        assert!(again.mu == 26.0);
    }

    #[test]
    fn dimensions_are_independent() {
        let mut set = WorkingSet::new();
        set.set_rating(7, GameType::Duel, Rating::new(30.0, 5.0));
        assert!(set.get(7, GameType::Global).is_none());
    }
}
