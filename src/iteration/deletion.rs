//! Deletion-safety decision taken at the end of a run

use serde::{Deserialize, Serialize};

/// Default share of known products allowed to go unseen before cleanup is
/// skipped, in percent.
pub const DEFAULT_DELETION_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletionInputs {
    pub db_count_at_start: u64,
    pub survived: u64,
    pub scraped: u64,
    pub threshold_percent: f64,
    pub marker_exists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    /// Every previously known product was seen again.
    NothingMissing,
    /// Too many products vanished; cleanup skipped.
    ThresholdExceeded { missing_percent: f64 },
    /// Products not seen in this job are removed.
    Cleanup { write_marker: bool },
    /// Nothing was scraped, nothing is removed.
    NothingScraped,
    /// The run was shut down before it started.
    Skipped,
    /// The run ended early; unseen products may simply not have been reached.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletionDecision {
    pub outcome: DeletionOutcome,
    pub scraped_few_items: bool,
}

impl DeletionInputs {
    /// Products known at start but not seen again.
    pub fn missing(&self) -> u64 {
        self.db_count_at_start.saturating_sub(self.survived)
    }

    pub fn missing_percent(&self) -> Option<f64> {
        if self.db_count_at_start == 0 {
            return None;
        }
        Some(self.missing() as f64 * 100.0 / self.db_count_at_start as f64)
    }

    pub fn decide(&self) -> DeletionDecision {
        let mut scraped_few_items = self.scraped == 0;

        if self.missing() == 0 {
            return DeletionDecision {
                outcome: DeletionOutcome::NothingMissing,
                scraped_few_items,
            };
        }

        let outcome = match self.missing_percent() {
            Some(percent) if self.marker_exists && percent >= self.threshold_percent => {
                scraped_few_items = true;
                DeletionOutcome::ThresholdExceeded {
                    missing_percent: percent,
                }
            }
            _ if self.scraped > 0 => DeletionOutcome::Cleanup {
                write_marker: !self.marker_exists,
            },
            _ => DeletionOutcome::NothingScraped,
        };

        DeletionDecision {
            outcome,
            scraped_few_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn inputs(threshold: f64, marker: bool) -> DeletionInputs {
        DeletionInputs {
            db_count_at_start: 100,
            survived: 70,
            scraped: 80,
            threshold_percent: threshold,
            marker_exists: marker,
        }
    }

    #[test]
    fn threshold_exceeded_skips_cleanup() {
        let decision = inputs(25.0, true).decide();
        assert!(decision.scraped_few_items);
        assert!(matches!(decision.outcome, DeletionOutcome::ThresholdExceeded { .. }));
    }

    #[test]
    fn higher_threshold_allows_cleanup() {
        let decision = inputs(40.0, true).decide();
        assert!(!decision.scraped_few_items);
        assert_eq!(decision.outcome, DeletionOutcome::Cleanup { write_marker: false });
    }

    #[test]
    fn first_run_cleans_up_and_writes_marker() {
        let decision = inputs(25.0, false).decide();
        assert_eq!(decision.outcome, DeletionOutcome::Cleanup { write_marker: true });
    }

    #[rstest]
    #[case(100, 100, 80, DeletionOutcome::NothingMissing, false)]
    #[case(100, 0, 0, DeletionOutcome::ThresholdExceeded { missing_percent: 100.0 }, true)]
    #[case(0, 0, 0, DeletionOutcome::NothingMissing, true)]
    fn edge_cases(
        #[case] db: u64,
        #[case] survived: u64,
        #[case] scraped: u64,
        #[case] expected: DeletionOutcome,
        #[case] few: bool,
    ) {
        let decision = DeletionInputs {
            db_count_at_start: db,
            survived,
            scraped,
            threshold_percent: DEFAULT_DELETION_THRESHOLD,
            marker_exists: true,
        }
        .decide();
        assert_eq!(decision.outcome, expected);
        assert_eq!(decision.scraped_few_items, few);
    }

    #[test]
    fn nothing_scraped_without_marker_skips_cleanup() {
        let decision = DeletionInputs {
            db_count_at_start: 10,
            survived: 0,
            scraped: 0,
            threshold_percent: 25.0,
            marker_exists: false,
        }
        .decide();
        assert_eq!(decision.outcome, DeletionOutcome::NothingScraped);
        assert!(decision.scraped_few_items);
    }
}
