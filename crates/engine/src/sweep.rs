//! Recompute orchestration over an in-memory series table.

use quotedb_core::{CellUpdate, SeriesTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::gaps::{find_gaps, rebuild_positions};
use crate::registry::{IndicatorDef, IndicatorRegistry};
use crate::report::{IndicatorFailure, IndicatorOutcome, SweepReport};
use crate::window::{build_inputs, build_window, Window};

/// When staged writes reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One transaction after the whole sweep.
    #[default]
    PerSweep,
    /// One transaction after each indicator.
    PerIndicator,
    /// Nothing is written; staged updates go back to the caller.
    Deferred,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    /// Scan the full history instead of trusting the tail check.
    pub check_all: bool,
    pub commit: CommitMode,
    /// Recompute and overwrite every row past the warm-up.
    pub rebuild: bool,
}

impl SweepOptions {
    pub fn new(check_all: bool, commit: bool) -> Self {
        Self {
            check_all,
            commit: if commit {
                CommitMode::PerSweep
            } else {
                CommitMode::Deferred
            },
            rebuild: false,
        }
    }
}

/// Staged result of one indicator update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorUpdate {
    pub window: Option<Window>,
    pub updates: Vec<CellUpdate>,
}

/// Update one indicator: detect gaps, build the window, compute, and stage.
///
/// All-or-nothing: on any failure the table is left untouched for this
/// indicator. On success the computed values are also written into `table`
/// so that downstream indicators in the same sweep see them.
pub fn update_indicator(
    registry: &IndicatorRegistry,
    def: &IndicatorDef,
    table: &mut SeriesTable,
    options: &SweepOptions,
) -> Result<IndicatorUpdate, IndicatorFailure> {
    let gaps = if options.rebuild {
        rebuild_positions(def, table)
    } else {
        find_gaps(def, table, options.check_all)
    };
    let Some(window) = build_window(&gaps, def.warmup()) else {
        return Ok(IndicatorUpdate::default());
    };

    let inputs = build_inputs(registry, def, table, window, &gaps)?;
    let output = def
        .compute(&inputs)
        .map_err(|e| IndicatorFailure::Compute {
            indicator: def.name().to_string(),
            message: e.to_string(),
        })?;
    if output.len() != window.len() {
        return Err(IndicatorFailure::OutputLength {
            indicator: def.name().to_string(),
            expected: window.len(),
            actual: output.len(),
        });
    }

    let mut staged = Vec::with_capacity(gaps.len());
    for &position in &gaps {
        let value = output[window.offset(position)];
        if !value.is_finite() {
            return Err(IndicatorFailure::UndefinedOutput {
                indicator: def.name().to_string(),
                position,
            });
        }
        staged.push((position, value));
    }

    let mut updates = Vec::with_capacity(staged.len());
    for (position, value) in staged {
        table.set_value(position, def.name(), value);
        if let Some(observation_id) = table.observation_id(position) {
            updates.push(CellUpdate {
                observation_id,
                column: def.name().to_string(),
                value,
            });
        }
    }

    Ok(IndicatorUpdate {
        window: Some(window),
        updates,
    })
}

/// An ordered pass over a set of indicators for one symbol.
pub struct Sweep<'r> {
    registry: &'r IndicatorRegistry,
    plan: Vec<&'r IndicatorDef>,
    options: SweepOptions,
}

impl<'r> Sweep<'r> {
    /// Sweep the whole catalog.
    pub fn new(registry: &'r IndicatorRegistry, options: SweepOptions) -> Self {
        Self {
            registry,
            plan: registry.sweep_order().collect(),
            options,
        }
    }

    /// Sweep a plan produced by [`IndicatorRegistry::plan`].
    pub fn with_plan(
        registry: &'r IndicatorRegistry,
        plan: Vec<&'r IndicatorDef>,
        options: SweepOptions,
    ) -> Self {
        Self {
            registry,
            plan,
            options,
        }
    }

    pub fn indicators(&self) -> &[&'r IndicatorDef] {
        &self.plan
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    /// Process one indicator and record its outcome.
    ///
    /// An indicator whose upstream failed or was skipped earlier in `report`
    /// is skipped as well.
    pub fn step(
        &self,
        def: &IndicatorDef,
        table: &mut SeriesTable,
        report: &mut SweepReport,
    ) -> Vec<CellUpdate> {
        let blocked_by = def.inputs().iter().find(|upstream| {
            report
                .outcome(upstream)
                .is_some_and(|outcome| !outcome.is_usable())
        });
        if let Some(upstream) = blocked_by {
            warn!(
                symbol = %table.symbol(),
                indicator = %def.name(),
                upstream = %upstream,
                "Skipping indicator, upstream unavailable"
            );
            report.push(
                def.name(),
                IndicatorOutcome::Skipped {
                    blocked_by: upstream.clone(),
                },
            );
            return Vec::new();
        }

        match update_indicator(self.registry, def, table, &self.options) {
            Ok(IndicatorUpdate { window: None, .. }) => {
                report.push(def.name(), IndicatorOutcome::UpToDate);
                Vec::new()
            }
            Ok(IndicatorUpdate {
                window: Some(window),
                updates,
            }) => {
                debug!(
                    symbol = %table.symbol(),
                    indicator = %def.name(),
                    rows = updates.len(),
                    start = window.start,
                    end = window.end,
                    "Indicator updated"
                );
                report.push(
                    def.name(),
                    IndicatorOutcome::Filled {
                        rows: updates.len(),
                        start: window.start,
                        end: window.end,
                    },
                );
                updates
            }
            Err(error) => {
                warn!(symbol = %table.symbol(), indicator = %def.name(), %error, "Indicator update failed");
                report.push(def.name(), IndicatorOutcome::Failed { error });
                Vec::new()
            }
        }
    }

    /// Run every indicator in order against `table`, returning the report and
    /// all staged updates.
    pub fn run(&self, table: &mut SeriesTable) -> (SweepReport, Vec<CellUpdate>) {
        let mut report = SweepReport::new(table.symbol());
        let mut staged = Vec::new();
        for def in &self.plan {
            staged.extend(self.step(def, table, &mut report));
        }
        (report, staged)
    }
}
