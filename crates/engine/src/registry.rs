use quotedb_core::REFERENCE_COLUMN;
use quotedb_indicators::IndicatorError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::catalog;

/// Errors raised by a compute function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error("Invalid arguments: {0}")]
    Arguments(String),
}

/// Pure compute function: `(window length, input series) -> output aligned to the inputs`.
///
/// Input series are, in order, the reference value followed by every declared
/// upstream column, all sliced to the same window. An indicator declared with
/// [`IndicatorDef::with_own_history`] also receives its own column last.
pub type ComputeFn =
    Arc<dyn Fn(Option<usize>, &[Vec<f64>]) -> Result<Vec<f64>, ComputeError> + Send + Sync>;

/// One catalog entry.
#[derive(Clone)]
pub struct IndicatorDef {
    name: String,
    length: Option<usize>,
    warmup: usize,
    inputs: Vec<String>,
    own_history: bool,
    compute: ComputeFn,
}

impl IndicatorDef {
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(Option<usize>, &[Vec<f64>]) -> Result<Vec<f64>, ComputeError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            length: None,
            warmup: 0,
            inputs: Vec::new(),
            own_history: false,
            compute: Arc::new(compute),
        }
    }

    /// Fixed lookback passed as the first compute argument.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Number of leading rows of the series that are permanently undefined.
    pub fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup;
        self
    }

    /// Upstream indicator columns consumed after the reference value.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Pass the indicator's stored values over the window as a final input,
    /// NaN at absent rows and at the rows being computed. Recursive formulas
    /// (EWMA) resume from the stored value before the first gap instead of
    /// reseeding inside the window.
    pub fn with_own_history(mut self) -> Self {
        self.own_history = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> Option<usize> {
        self.length
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn own_history(&self) -> bool {
        self.own_history
    }

    pub fn compute(&self, inputs: &[Vec<f64>]) -> Result<Vec<f64>, ComputeError> {
        (self.compute)(self.length, inputs)
    }
}

impl fmt::Debug for IndicatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorDef")
            .field("name", &self.name)
            .field("length", &self.length)
            .field("warmup", &self.warmup)
            .field("inputs", &self.inputs)
            .field("own_history", &self.own_history)
            .finish_non_exhaustive()
    }
}

/// Static configuration defects found while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate indicator: {0}")]
    Duplicate(String),
    #[error("Indicator name '{0}' is reserved for the reference column")]
    ReservedName(String),
    #[error("Indicator {indicator} depends on unknown column {upstream}")]
    UnknownUpstream { indicator: String, upstream: String },
    #[error("Dependency cycle among: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("Indicator {indicator} has warm-up {warmup}, below {upstream} warm-up {upstream_warmup}")]
    WarmupBelowUpstream {
        indicator: String,
        warmup: usize,
        upstream: String,
        upstream_warmup: usize,
    },
    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),
}

/// Immutable catalog of indicator definitions with a precomputed sweep order.
///
/// The sweep order is a topological order of the dependency graph: every
/// indicator comes after all of its upstreams, and ties are broken by
/// declaration order.
#[derive(Debug, Clone)]
pub struct IndicatorRegistry {
    defs: Vec<IndicatorDef>,
    index: HashMap<String, usize>,
    order: Vec<usize>,
}

impl IndicatorRegistry {
    pub fn new(defs: Vec<IndicatorDef>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if def.name == REFERENCE_COLUMN {
                return Err(RegistryError::ReservedName(def.name.clone()));
            }
            if index.insert(def.name.clone(), i).is_some() {
                return Err(RegistryError::Duplicate(def.name.clone()));
            }
        }

        for def in &defs {
            for upstream in &def.inputs {
                if !index.contains_key(upstream) {
                    return Err(RegistryError::UnknownUpstream {
                        indicator: def.name.clone(),
                        upstream: upstream.clone(),
                    });
                }
            }
        }

        let order = topological_order(&defs, &index)?;

        for def in &defs {
            for upstream in &def.inputs {
                let up = &defs[index[upstream]];
                if def.warmup < up.warmup {
                    return Err(RegistryError::WarmupBelowUpstream {
                        indicator: def.name.clone(),
                        warmup: def.warmup,
                        upstream: up.name.clone(),
                        upstream_warmup: up.warmup,
                    });
                }
            }
        }

        Ok(Self { defs, index, order })
    }

    /// The stock catalog of moving averages, differences, dispersion and MACD.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new(catalog::standard_catalog())
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorDef> {
        self.index.get(name).map(|&i| &self.defs[i])
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// All definitions in sweep order.
    pub fn sweep_order(&self) -> impl Iterator<Item = &IndicatorDef> {
        self.order.iter().map(|&i| &self.defs[i])
    }

    /// The requested indicators plus their transitive upstreams, in sweep order.
    /// An empty request selects the whole catalog.
    pub fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&IndicatorDef>, RegistryError> {
        if names.is_empty() {
            return Ok(self.sweep_order().collect());
        }

        let mut needed = HashSet::new();
        let mut stack = Vec::new();
        for name in names {
            let name = name.as_ref();
            let i = *self
                .index
                .get(name)
                .ok_or_else(|| RegistryError::UnknownIndicator(name.to_string()))?;
            stack.push(i);
        }
        while let Some(i) = stack.pop() {
            if needed.insert(i) {
                stack.extend(self.defs[i].inputs.iter().map(|u| self.index[u]));
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|i| needed.contains(*i))
            .map(|&i| &self.defs[i])
            .collect())
    }
}

/// Kahn's algorithm; the ready set is ordered by declaration index.
fn topological_order(
    defs: &[IndicatorDef],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>, RegistryError> {
    let mut pending: Vec<usize> = defs.iter().map(|d| d.inputs.len()).collect();
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); defs.len()];
    for (i, def) in defs.iter().enumerate() {
        for upstream in &def.inputs {
            downstream[index[upstream]].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..defs.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(defs.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &downstream[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < defs.len() {
        let stuck = (0..defs.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| defs[i].name.clone())
            .collect();
        return Err(RegistryError::Cycle(stuck));
    }
    Ok(order)
}
