//! Gap detection: which rows of an indicator column need computing.

use quotedb_core::SeriesTable;

use crate::registry::IndicatorDef;

/// Tail-only freshness check.
///
/// This is a heuristic, not a consistency check: it only looks at the most
/// recent row and assumes everything before it was filled in order. It is
/// correct as long as rows are only ever appended and swept oldest to newest;
/// a hole introduced further back in history is invisible to it. Use
/// [`scan_gaps`] (or `check_all`) to find such holes.
pub fn is_up_to_date(def: &IndicatorDef, table: &SeriesTable) -> bool {
    table.is_empty() || table.last_value(def.name()).is_some()
}

/// Every position at or after the warm-up whose value is absent.
pub fn scan_gaps(def: &IndicatorDef, table: &SeriesTable) -> Vec<usize> {
    (def.warmup()..table.len())
        .filter(|&p| table.value(p, def.name()).is_none())
        .collect()
}

/// Gap positions for `def`, ascending.
///
/// With `check_all == false` the tail check runs first and a fresh tail means
/// no gaps at all. Otherwise (or if the tail is stale) the full scan runs.
pub fn find_gaps(def: &IndicatorDef, table: &SeriesTable, check_all: bool) -> Vec<usize> {
    if !check_all && is_up_to_date(def, table) {
        return Vec::new();
    }
    scan_gaps(def, table)
}

/// Every position at or after the warm-up, present or not. Used for forced rebuilds.
pub fn rebuild_positions(def: &IndicatorDef, table: &SeriesTable) -> Vec<usize> {
    (def.warmup()..table.len()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{def_ma, table_with};

    #[test]
    fn test_full_scan_starts_at_warmup() {
        let def = def_ma("ma_3", 3);
        let table = table_with(&[10, 11, 12, 13, 14], "ma_3", &[]);
        assert_eq!(find_gaps(&def, &table, true), vec![2, 3, 4]);
    }

    #[test]
    fn test_fresh_tail_hides_history() {
        let def = def_ma("ma_3", 3);
        // Position 3 is a hole, but the last row is filled
        let table = table_with(&[10, 11, 12, 13, 14], "ma_3", &[(2, 11.0), (4, 13.0)]);
        assert!(is_up_to_date(&def, &table));
        assert!(find_gaps(&def, &table, false).is_empty());
        assert_eq!(find_gaps(&def, &table, true), vec![3]);
    }

    #[test]
    fn test_stale_tail_triggers_full_scan() {
        let def = def_ma("ma_3", 3);
        let table = table_with(&[10, 11, 12, 13, 14], "ma_3", &[(2, 11.0)]);
        assert_eq!(find_gaps(&def, &table, false), vec![3, 4]);
    }

    #[test]
    fn test_series_shorter_than_warmup() {
        let def = def_ma("ma_3", 3);
        let table = table_with(&[10, 11], "ma_3", &[]);
        assert!(find_gaps(&def, &table, true).is_empty());
        assert!(find_gaps(&def, &table, false).is_empty());
        assert!(rebuild_positions(&def, &table).is_empty());
    }

    #[test]
    fn test_rebuild_covers_filled_rows() {
        let def = def_ma("ma_3", 3);
        let table = table_with(&[10, 11, 12, 13], "ma_3", &[(2, 11.0), (3, 12.0)]);
        assert_eq!(rebuild_positions(&def, &table), vec![2, 3]);
    }
}
