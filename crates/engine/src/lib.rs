//! Incremental indicator recomputation.
//!
//! An [`IndicatorRegistry`] declares each indicator's contract (compute
//! function, window length, warm-up, upstream columns). For one symbol, the
//! engine finds rows whose value is missing, slices the smallest input window
//! that covers them, computes, and stages point updates, sweeping indicators
//! in dependency order.

pub mod catalog;
pub mod gaps;
pub mod registry;
pub mod report;
pub mod sweep;
pub mod updater;
pub mod window;

#[cfg(test)]
mod test_support;

pub use registry::{ComputeError, ComputeFn, IndicatorDef, IndicatorRegistry, RegistryError};
pub use report::{IndicatorFailure, IndicatorOutcome, IndicatorReport, SweepReport};
pub use sweep::{update_indicator, CommitMode, IndicatorUpdate, Sweep, SweepOptions};
pub use updater::{EngineError, IndicatorUpdater, SymbolUpdate};
pub use window::Window;
