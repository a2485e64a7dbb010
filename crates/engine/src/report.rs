use quotedb_core::ObservationId;
use serde::Serialize;

/// Why one indicator's update was aborted for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorFailure {
    /// An upstream column is absent at a row it should already have.
    #[error("{indicator}: upstream {upstream} is missing at position {position} (observation {observation_id})")]
    MissingUpstream {
        indicator: String,
        upstream: String,
        position: usize,
        observation_id: ObservationId,
    },
    #[error("{indicator}: reference value at position {position} is not representable as a float")]
    NonNumericReference { indicator: String, position: usize },
    #[error("{indicator}: compute failed: {message}")]
    Compute { indicator: String, message: String },
    #[error("{indicator}: compute returned {actual} values for a window of {expected}")]
    OutputLength {
        indicator: String,
        expected: usize,
        actual: usize,
    },
    #[error("{indicator}: compute left position {position} undefined")]
    UndefinedOutput { indicator: String, position: usize },
    /// Values were computed but the store rejected the write.
    #[error("{indicator}: store write failed: {message}")]
    Store { indicator: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndicatorOutcome {
    /// Gaps in `[start, end)` were computed and staged.
    Filled { rows: usize, start: usize, end: usize },
    UpToDate,
    Failed { error: IndicatorFailure },
    /// Not attempted because an upstream failed or was skipped.
    Skipped { blocked_by: String },
}

impl IndicatorOutcome {
    /// Whether downstream indicators can rely on this column.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Filled { .. } | Self::UpToDate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorReport {
    pub indicator: String,
    #[serde(flatten)]
    pub outcome: IndicatorOutcome,
}

/// Outcome of one symbol sweep. Partial success is a normal, reportable result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub symbol: String,
    pub indicators: Vec<IndicatorReport>,
    /// Cells written to the store by this sweep.
    pub rows_written: u64,
    /// False when writes were left staged for the caller.
    pub committed: bool,
}

impl SweepReport {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            indicators: Vec::new(),
            rows_written: 0,
            committed: false,
        }
    }

    pub fn push(&mut self, indicator: &str, outcome: IndicatorOutcome) {
        self.indicators.push(IndicatorReport {
            indicator: indicator.to_string(),
            outcome,
        });
    }

    /// Replace an indicator's recorded outcome with a failure.
    pub fn fail(&mut self, indicator: &str, error: IndicatorFailure) {
        match self.indicators.iter_mut().find(|r| r.indicator == indicator) {
            Some(entry) => entry.outcome = IndicatorOutcome::Failed { error },
            None => self.push(indicator, IndicatorOutcome::Failed { error }),
        }
    }

    pub fn outcome(&self, indicator: &str) -> Option<&IndicatorOutcome> {
        self.indicators
            .iter()
            .find(|r| r.indicator == indicator)
            .map(|r| &r.outcome)
    }

    /// Rows filled across all indicators.
    pub fn rows_filled(&self) -> usize {
        self.indicators
            .iter()
            .map(|r| match r.outcome {
                IndicatorOutcome::Filled { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &IndicatorFailure)> {
        self.indicators.iter().filter_map(|r| match &r.outcome {
            IndicatorOutcome::Failed { error } => Some((r.indicator.as_str(), error)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.indicators.iter().filter_map(|r| match &r.outcome {
            IndicatorOutcome::Skipped { blocked_by } => {
                Some((r.indicator.as_str(), blocked_by.as_str()))
            }
            _ => None,
        })
    }

    /// True when every indicator was filled or already up to date.
    pub fn is_success(&self) -> bool {
        self.indicators.iter().all(|r| r.outcome.is_usable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = SweepReport::new("spy");
        report.push("ma", IndicatorOutcome::Filled { rows: 3, start: 5, end: 10 });
        report.push("ewma", IndicatorOutcome::UpToDate);
        assert!(report.is_success());

        report.push(
            "bad",
            IndicatorOutcome::Failed {
                error: IndicatorFailure::Compute {
                    indicator: "bad".into(),
                    message: "boom".into(),
                },
            },
        );
        report.push("child", IndicatorOutcome::Skipped { blocked_by: "bad".into() });

        assert!(!report.is_success());
        assert_eq!(report.rows_filled(), 3);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.skipped().collect::<Vec<_>>(), vec![("child", "bad")]);
    }

    #[test]
    fn test_report_serializes_flat() {
        let mut report = SweepReport::new("spy");
        report.push("ma", IndicatorOutcome::Filled { rows: 1, start: 8, end: 11 });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["indicators"][0]["indicator"], "ma");
        assert_eq!(json["indicators"][0]["status"], "filled");
        assert_eq!(json["indicators"][0]["rows"], 1);
    }

    #[test]
    fn test_fail_replaces_outcome() {
        let mut report = SweepReport::new("spy");
        report.push("ma", IndicatorOutcome::Filled { rows: 2, start: 0, end: 4 });
        let error = IndicatorFailure::Store {
            indicator: "ma".into(),
            message: "connection reset".into(),
        };
        report.fail("ma", error.clone());

        assert_eq!(report.indicators.len(), 1);
        assert_eq!(report.outcome("ma"), Some(&IndicatorOutcome::Failed { error }));
        assert_eq!(report.rows_filled(), 0);
    }
}
