//! The stock indicator catalog.
//!
//! Warm-ups are counted from the start of the series, so a derived indicator
//! inherits the warm-up of its deepest input: `macd` needs the 26 period EWMA
//! (25 undefined rows), and `macd_signal` adds 8 more for its 9 period EWMA.

use quotedb_indicators::{self as ind, IndicatorError};

use crate::registry::{ComputeError, IndicatorDef};

/// Periods for the simple families (averages, dispersion, momentum).
pub const MA_PERIODS: [usize; 6] = [5, 10, 20, 50, 100, 200];

/// Periods for EWMA. 12 and 26 feed MACD.
pub const EWMA_PERIODS: [usize; 8] = [5, 10, 12, 20, 26, 50, 100, 200];

const MACD_WARMUP: usize = 25;
const MACD_SIGNAL_PERIOD: usize = 9;

type WindowedFn = fn(usize, &[f64]) -> Result<Vec<f64>, IndicatorError>;
type PairFn = fn(&[f64], &[f64]) -> Result<Vec<f64>, IndicatorError>;

pub fn standard_catalog() -> Vec<IndicatorDef> {
    let mut defs = Vec::new();

    for p in MA_PERIODS {
        defs.push(windowed(format!("ma_{p}_day"), p, ind::moving_average));
    }
    for p in EWMA_PERIODS {
        defs.push(
            IndicatorDef::new(format!("ewma_{p}_day"), |len, inputs| {
                Ok(ind::resume_exp_weighted_moving_average(
                    period(len)?,
                    series(inputs, 0)?,
                    series(inputs, 1)?,
                )?)
            })
            .with_length(p)
            .with_warmup(p - 1)
            .with_own_history(),
        );
    }

    for p in MA_PERIODS {
        defs.push(against(format!("diff_ma_{p}_day"), format!("ma_{p}_day"), p - 1, ind::mag_diff));
    }
    for p in EWMA_PERIODS {
        defs.push(against(
            format!("diff_ewma_{p}_day"),
            format!("ewma_{p}_day"),
            p - 1,
            ind::mag_diff,
        ));
    }
    for p in MA_PERIODS {
        defs.push(against(
            format!("pct_diff_ma_{p}_day"),
            format!("ma_{p}_day"),
            p - 1,
            ind::percent_diff,
        ));
    }
    for p in EWMA_PERIODS {
        defs.push(against(
            format!("pct_diff_ewma_{p}_day"),
            format!("ewma_{p}_day"),
            p - 1,
            ind::percent_diff,
        ));
    }

    defs.push(
        IndicatorDef::new("pct_change", |_, inputs| {
            Ok(ind::percent_change(series(inputs, 0)?)?)
        })
        .with_warmup(1),
    );

    for p in MA_PERIODS {
        defs.push(windowed(format!("moving_stdev_{p}_day"), p, ind::moving_stdev));
    }
    for p in MA_PERIODS {
        defs.push(windowed(format!("moving_var_{p}_day"), p, ind::moving_var));
    }
    for p in MA_PERIODS {
        defs.push(windowed(format!("momentum_{p}_day"), p, ind::momentum));
    }
    for p in MA_PERIODS {
        defs.push(windowed(format!("roc_{p}_day"), p, ind::rate_of_change));
    }

    defs.push(
        IndicatorDef::new("macd", |_, inputs| {
            Ok(ind::macd_line(series(inputs, 1)?, series(inputs, 2)?)?)
        })
        .with_inputs(["ewma_12_day", "ewma_26_day"])
        .with_warmup(MACD_WARMUP),
    );
    defs.push(
        IndicatorDef::new("macd_signal", |length, inputs| {
            Ok(ind::macd_signal(
                period(length)?,
                series(inputs, 1)?,
                series(inputs, 2)?,
            )?)
        })
        .with_length(MACD_SIGNAL_PERIOD)
        .with_inputs(["macd"])
        .with_warmup(MACD_WARMUP + MACD_SIGNAL_PERIOD - 1)
        .with_own_history(),
    );
    defs.push(
        IndicatorDef::new("macd_histogram", |_, inputs| {
            Ok(ind::macd_histogram(series(inputs, 1)?, series(inputs, 2)?)?)
        })
        .with_inputs(["macd", "macd_signal"])
        .with_warmup(MACD_WARMUP + MACD_SIGNAL_PERIOD - 1),
    );

    defs
}

/// `f(length, price)` with warm-up `length - 1`.
fn windowed(name: String, length: usize, f: WindowedFn) -> IndicatorDef {
    IndicatorDef::new(name, move |len, inputs| {
        Ok(f(period(len)?, series(inputs, 0)?)?)
    })
    .with_length(length)
    .with_warmup(length - 1)
}

/// `f(price, upstream)` element-wise.
fn against(name: String, upstream: String, warmup: usize, f: PairFn) -> IndicatorDef {
    IndicatorDef::new(name, move |_, inputs| {
        Ok(f(series(inputs, 0)?, series(inputs, 1)?)?)
    })
    .with_inputs([upstream])
    .with_warmup(warmup)
}

fn series(inputs: &[Vec<f64>], index: usize) -> Result<&[f64], ComputeError> {
    inputs
        .get(index)
        .map(Vec::as_slice)
        .ok_or_else(|| ComputeError::Arguments(format!("missing input series {index}")))
}

fn period(length: Option<usize>) -> Result<usize, ComputeError> {
    length.ok_or_else(|| ComputeError::Arguments("missing window length".into()))
}

#[cfg(test)]
mod tests {
    use crate::registry::IndicatorRegistry;

    #[test]
    fn test_standard_catalog_is_valid() {
        let registry = IndicatorRegistry::standard().unwrap();
        // 6 ma + 8 ewma + 6 + 8 + 6 + 8 diffs + pct_change + 4 * 6 + 3 macd
        assert_eq!(registry.len(), 70);

        let order: Vec<&str> = registry.sweep_order().map(|d| d.name()).collect();
        let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
        assert!(pos("ewma_26_day") < pos("macd"));
        assert!(pos("macd") < pos("macd_signal"));
        assert!(pos("macd_signal") < pos("macd_histogram"));
        assert!(pos("ma_200_day") < pos("pct_diff_ma_200_day"));
    }

    #[test]
    fn test_macd_contract() {
        let registry = IndicatorRegistry::standard().unwrap();
        let signal = registry.get("macd_signal").unwrap();
        assert_eq!(signal.length(), Some(9));
        assert_eq!(signal.warmup(), 33);
        assert_eq!(signal.inputs(), ["macd".to_string()]);
        assert!(signal.own_history());
        assert!(registry.get("ewma_12_day").unwrap().own_history());
        assert!(!registry.get("macd").unwrap().own_history());
        assert_eq!(registry.get("pct_change").unwrap().warmup(), 1);
    }
}
