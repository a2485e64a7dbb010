//! Window building: the smallest input slice that covers a set of gaps.

use quotedb_core::SeriesTable;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::ops::Range;

use crate::registry::{IndicatorDef, IndicatorRegistry};
use crate::report::IndicatorFailure;

/// Half-open range of row positions `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Offset of a row position inside the window (and inside the compute output).
    pub fn offset(&self, position: usize) -> usize {
        position - self.start
    }
}

/// `start = min(gaps) - warmup` (clamped at 0), `end = max(gaps) + 1`.
///
/// Every gap then has its full lookback inside the window, and nothing earlier
/// is read. Returns `None` for an empty gap set.
pub fn build_window(gaps: &[usize], warmup: usize) -> Option<Window> {
    let first = *gaps.iter().min()?;
    let last = *gaps.iter().max()?;
    Some(Window {
        start: first.saturating_sub(warmup),
        end: last + 1,
    })
}

/// Slice the compute inputs for `def` over `window`.
///
/// The first series is the reference value; each declared upstream follows in
/// order. An upstream that is absent below its own warm-up is permanently
/// undefined and passed through as NaN. Absent anywhere else means the
/// upstream has not been computed yet, and the update is aborted.
///
/// For an indicator with own history, its stored column comes last, with the
/// `gaps` positions masked to NaN so a rebuild does not resume from the values
/// it is replacing.
pub fn build_inputs(
    registry: &IndicatorRegistry,
    def: &IndicatorDef,
    table: &SeriesTable,
    window: Window,
    gaps: &[usize],
) -> Result<Vec<Vec<f64>>, IndicatorFailure> {
    let mut inputs = Vec::with_capacity(def.inputs().len() + 1);

    let mut reference = Vec::with_capacity(window.len());
    for (offset, value) in table.reference_values(window.range()).into_iter().enumerate() {
        let value = value.to_f64().ok_or_else(|| IndicatorFailure::NonNumericReference {
            indicator: def.name().to_string(),
            position: window.start + offset,
        })?;
        reference.push(value);
    }
    inputs.push(reference);

    for upstream in def.inputs() {
        let upstream_warmup = registry.get(upstream).map_or(0, |u| u.warmup());
        let mut series = Vec::with_capacity(window.len());
        for (offset, value) in table.column(upstream, window.range()).into_iter().enumerate() {
            let position = window.start + offset;
            match value {
                Some(v) => series.push(v),
                None if position < upstream_warmup => series.push(f64::NAN),
                None => {
                    return Err(IndicatorFailure::MissingUpstream {
                        indicator: def.name().to_string(),
                        upstream: upstream.clone(),
                        position,
                        observation_id: table.observation_id(position).unwrap_or_default(),
                    })
                }
            }
        }
        inputs.push(series);
    }

    if def.own_history() {
        let mut own: Vec<f64> = table
            .column(def.name(), window.range())
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        for &position in gaps {
            if let Some(v) = own.get_mut(window.offset(position)) {
                *v = f64::NAN;
            }
        }
        inputs.push(own);
    }

    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{def_ma, table_with};

    fn registry_with_child() -> IndicatorRegistry {
        IndicatorRegistry::new(vec![
            def_ma("ma_3", 3),
            IndicatorDef::new("diff", |_, inputs| Ok(inputs[1].clone()))
                .with_inputs(["ma_3"])
                .with_warmup(2),
        ])
        .unwrap()
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(build_window(&[10], 2), Some(Window { start: 8, end: 11 }));
        assert_eq!(build_window(&[4, 7, 9], 4), Some(Window { start: 0, end: 10 }));
        assert_eq!(build_window(&[1], 5), Some(Window { start: 0, end: 2 }));
        assert_eq!(build_window(&[], 3), None);

        let window = build_window(&[6], 3).unwrap();
        assert!(!window.is_empty());
        assert_eq!(window.len(), 4);
        assert_eq!(window.offset(6), 3);
    }

    #[test]
    fn test_inputs_are_sliced_to_window() {
        let registry = registry_with_child();
        let table = table_with(&[10, 11, 12, 13, 14], "ma_3", &[(2, 11.0), (3, 12.0), (4, 13.0)]);
        let def = registry.get("diff").unwrap();
        let inputs = build_inputs(&registry, def, &table, Window { start: 2, end: 5 }, &[4]).unwrap();
        assert_eq!(inputs, vec![vec![12.0, 13.0, 14.0], vec![11.0, 12.0, 13.0]]);
    }

    #[test]
    fn test_upstream_warmup_rows_pass_as_nan() {
        let registry = registry_with_child();
        let table = table_with(&[10, 11, 12], "ma_3", &[(2, 11.0)]);
        let def = registry.get("diff").unwrap();
        let inputs = build_inputs(&registry, def, &table, Window { start: 0, end: 3 }, &[2]).unwrap();
        assert!(inputs[1][0].is_nan());
        assert!(inputs[1][1].is_nan());
        assert_eq!(inputs[1][2], 11.0);
    }

    #[test]
    fn test_missing_upstream_is_an_error() {
        let registry = registry_with_child();
        let table = table_with(&[10, 11, 12, 13], "ma_3", &[(2, 11.0)]);
        let def = registry.get("diff").unwrap();
        let err = build_inputs(&registry, def, &table, Window { start: 1, end: 4 }, &[3]).unwrap_err();
        assert_eq!(
            err,
            IndicatorFailure::MissingUpstream {
                indicator: "diff".into(),
                upstream: "ma_3".into(),
                position: 3,
                observation_id: table.observation_id(3).unwrap(),
            }
        );
    }

    #[test]
    fn test_own_history_is_last_input_with_gaps_masked() {
        let registry = IndicatorRegistry::new(vec![IndicatorDef::new("carry", |_, inputs| {
            Ok(inputs[1].clone())
        })
        .with_own_history()])
        .unwrap();
        let table = table_with(&[10, 11, 12, 13], "carry", &[(0, 1.0), (1, 2.0), (2, 3.0)]);
        let def = registry.get("carry").unwrap();

        let inputs = build_inputs(&registry, def, &table, Window { start: 0, end: 4 }, &[2, 3]).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1][..2], [1.0, 2.0]);
        assert!(inputs[1][2].is_nan());
        assert!(inputs[1][3].is_nan());
    }
}
