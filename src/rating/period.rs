use crate::Timestamp;
use chrono::Datelike;

/// a rating period is one calendar month, encoded YYYYMM. periods order
/// themselves correctly under plain integer comparison, which is what the
/// partition names and the re-rate bookkeeping lean on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(u32);

impl Period {
    pub fn new(year: u32, month: u32) -> Self {
        assert!((1..=12).contains(&month));
        Self(year * 100 + month)
    }

    pub fn year(&self) -> u32 {
        self.0 / 100
    }

    pub fn month(&self) -> u32 {
        self.0 % 100
    }

    pub fn next(&self) -> Self {
        match self.month() {
            12 => Self::new(self.year() + 1, 1),
            m => Self::new(self.year(), m + 1),
        }
    }

    pub fn prev(&self) -> Self {
        match self.month() {
            1 => Self::new(self.year() - 1, 12),
            m => Self::new(self.year(), m - 1),
        }
    }

    /// every period from self through `last`, inclusive
    pub fn through(&self, last: Period) -> impl Iterator<Item = Period> {
        let mut cursor = *self;
        std::iter::from_fn(move || {
            if cursor > last {
                None
            } else {
                let emitted = cursor;
                cursor = cursor.next();
                Some(emitted)
            }
        })
    }

    /// the month a unix timestamp falls in, UTC
    pub fn of(timestamp: Timestamp) -> Option<Self> {
        let date = chrono::DateTime::from_timestamp(timestamp, 0)?;
        Some(Self::new(date.year() as u32, date.month()))
    }
}

impl From<Period> for u32 {
    fn from(p: Period) -> u32 {
        p.0
    }
}

impl From<u32> for Period {
    fn from(encoded: u32) -> Self {
        assert!((1..=12).contains(&(encoded % 100)));
        Self(encoded)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_orders_chronologically() {
        assert!(Period::new(2019, 12) < Period::new(2020, 1));
        assert!(Period::new(2020, 3) < Period::new(2020, 4));
    }

    #[test]
    fn december_rolls_into_january() {
        assert!(Period::new(2019, 12).next() == Period::new(2020, 1));
        assert!(Period::new(2020, 1).prev() == Period::new(2019, 12));
    }

    #[test]
    fn through_is_inclusive_both_ends() {
        let months = Period::new(2019, 11)
            .through(Period::new(2020, 2))
            .collect::<Vec<_>>();
        assert!(months.len() == 4);
        assert!(months[0] == Period::new(2019, 11));
        assert!(months[3] == Period::new(2020, 2));
    }

    #[test]
    fn timestamp_lands_in_its_month() {
        // 2020-04-01T00:00:05Z
        assert!(Period::of(1585699205) == Some(Period::new(2020, 4)));
    }

    #[test]
    fn empty_range_when_start_past_end() {
        let months = Period::new(2020, 5)
            .through(Period::new(2020, 4))
            .collect::<Vec<_>>();
        assert!(months.is_empty());
    }
}
