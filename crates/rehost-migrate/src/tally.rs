//! Run-scoped URL counters.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::UrlOutcome;

/// Processed, skipped and errored URL counts.
///
/// Every task builds its own tally and hands it back; callers merge with `+`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// URLs migrated to the new host.
    pub processed: usize,
    /// URL-shaped strings left alone because they are not legacy.
    pub skipped: usize,
    /// Legacy URLs whose migration failed.
    pub errored: usize,
}

impl Tally {
    pub fn processed() -> Self {
        Self {
            processed: 1,
            ..Self::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            skipped: 1,
            ..Self::default()
        }
    }

    pub fn errored() -> Self {
        Self {
            errored: 1,
            ..Self::default()
        }
    }

    /// The count a single outcome contributes.
    pub fn of(outcome: &UrlOutcome) -> Self {
        match outcome {
            UrlOutcome::Migrated { .. } => Self::processed(),
            UrlOutcome::Skipped => Self::skipped(),
            UrlOutcome::Failed { .. } => Self::errored(),
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.errored
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(self, rhs: Tally) -> Tally {
        Tally {
            processed: self.processed + rhs.processed,
            skipped: self.skipped + rhs.skipped,
            errored: self.errored + rhs.errored,
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Tally) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Tally {
    fn sum<I: Iterator<Item = Tally>>(iter: I) -> Tally {
        iter.fold(Tally::default(), Add::add)
    }
}
