//! Parameter space definition.
//!
//! A [`ParameterSpace`] describes the searchable dimensions of a
//! strategy's tunable parameters. Dimensions keep their insertion order
//! so grid enumeration is deterministic.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::OptimizeError;

/// The legal values of one tunable dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParameterRange {
    /// Integer interval `[min, max]` walked by `step`.
    Int { min: i64, max: i64, step: i64 },
    /// Float interval `[min, max]` walked by `step`.
    Float { min: f64, max: f64, step: f64 },
    /// Ordered set of discrete choices.
    Categorical { values: Vec<String> },
    /// `false` / `true`.
    Bool,
}

impl ParameterRange {
    /// All discrete values in the range, ascending (declaration order
    /// for categorical dimensions).
    pub fn values(&self) -> Vec<ParamValue> {
        match self {
            Self::Int { min, max, step } => {
                let mut values = Vec::new();
                let mut current = *min;
                while current <= *max {
                    values.push(ParamValue::Int(current));
                    current += step;
                }
                values
            }
            Self::Float { min, max, step } => {
                let mut values = Vec::new();
                let mut current = *min;
                // Tolerance absorbs accumulated float error at the upper bound.
                while current <= *max + 1e-10 {
                    values.push(ParamValue::Float(current));
                    current += step;
                }
                values
            }
            Self::Categorical { values } => {
                values.iter().map(|v| ParamValue::Str(v.clone())).collect()
            }
            Self::Bool => vec![ParamValue::Bool(false), ParamValue::Bool(true)],
        }
    }

    /// Number of discrete values in the range.
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Int { min, max, step } => ((max - min) / step + 1).max(0) as usize,
            Self::Float { .. } => self.values().len(),
            Self::Categorical { values } => values.len(),
            Self::Bool => 2,
        }
    }

    /// Uniformly sample one value, independent of `step`.
    pub fn sample(&self, rng: &mut impl Rng) -> ParamValue {
        match self {
            Self::Int { min, max, .. } => ParamValue::Int(rng.gen_range(*min..=*max)),
            Self::Float { min, max, .. } => {
                if min >= max {
                    ParamValue::Float(*min)
                } else {
                    ParamValue::Float(rng.gen_range(*min..*max))
                }
            }
            Self::Categorical { values } => {
                let idx = rng.gen_range(0..values.len());
                ParamValue::Str(values[idx].clone())
            }
            Self::Bool => ParamValue::Bool(rng.gen_bool(0.5)),
        }
    }
}

/// A specific parameter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view for correlation: ints and floats widen, booleans
    /// map to 0/1, strings have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Str(_) => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Set of named parameter values for one candidate.
pub type ParamSet = std::collections::HashMap<String, ParamValue>;

/// Named, insertion-ordered collection of tunable dimensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    dimensions: Vec<(String, ParameterRange)>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterRange)> {
        self.dimensions.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Add an integer dimension `[min, max]` with the given step.
    pub fn add_int(
        &mut self,
        name: &str,
        min: i64,
        max: i64,
        step: i64,
    ) -> Result<&mut Self, OptimizeError> {
        if min > max {
            return Err(OptimizeError::InvalidRange(format!(
                "{}: min {} exceeds max {}",
                name, min, max
            )));
        }
        if step <= 0 {
            return Err(OptimizeError::InvalidRange(format!(
                "{}: step must be positive, got {}",
                name, step
            )));
        }
        self.insert(name, ParameterRange::Int { min, max, step })
    }

    /// Add a float dimension `[min, max]` with the given step.
    pub fn add_float(
        &mut self,
        name: &str,
        min: f64,
        max: f64,
        step: f64,
    ) -> Result<&mut Self, OptimizeError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(OptimizeError::InvalidRange(format!(
                "{}: invalid bounds [{}, {}]",
                name, min, max
            )));
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(OptimizeError::InvalidRange(format!(
                "{}: step must be positive, got {}",
                name, step
            )));
        }
        self.insert(name, ParameterRange::Float { min, max, step })
    }

    /// Add a categorical dimension with an explicit ordered value set.
    pub fn add_categorical(
        &mut self,
        name: &str,
        values: Vec<String>,
    ) -> Result<&mut Self, OptimizeError> {
        if values.is_empty() {
            return Err(OptimizeError::InvalidRange(format!(
                "{}: categorical dimension needs at least one value",
                name
            )));
        }
        self.insert(name, ParameterRange::Categorical { values })
    }

    /// Add a boolean dimension.
    pub fn add_boolean(&mut self, name: &str) -> Result<&mut Self, OptimizeError> {
        self.insert(name, ParameterRange::Bool)
    }

    fn insert(&mut self, name: &str, range: ParameterRange) -> Result<&mut Self, OptimizeError> {
        if self.dimensions.iter().any(|(n, _)| n == name) {
            return Err(OptimizeError::DuplicateParameter(name.to_string()));
        }
        self.dimensions.push((name.to_string(), range));
        Ok(self)
    }

    /// Size of the full Cartesian grid. Saturates on overflow.
    pub fn grid_size(&self) -> usize {
        self.dimensions
            .iter()
            .map(|(_, r)| r.cardinality())
            .fold(1, usize::saturating_mul)
    }

    /// Every combination of the full Cartesian grid.
    ///
    /// Dimensions iterate in insertion order, the last dimension varying
    /// fastest; values ascend within each dimension.
    pub fn grid_combinations(&self) -> Vec<ParamSet> {
        if self.dimensions.is_empty() {
            return Vec::new();
        }
        let value_lists: Vec<Vec<ParamValue>> =
            self.dimensions.iter().map(|(_, r)| r.values()).collect();
        if value_lists.iter().any(|v| v.is_empty()) {
            return Vec::new();
        }

        let size = self.grid_size();
        let mut combinations = Vec::with_capacity(size);
        let mut odometer = vec![0usize; value_lists.len()];
        loop {
            let combo: ParamSet = self
                .dimensions
                .iter()
                .enumerate()
                .map(|(dim, (name, _))| (name.clone(), value_lists[dim][odometer[dim]].clone()))
                .collect();
            combinations.push(combo);

            // Advance, last dimension fastest.
            let mut dim = value_lists.len();
            loop {
                if dim == 0 {
                    return combinations;
                }
                dim -= 1;
                odometer[dim] += 1;
                if odometer[dim] < value_lists[dim].len() {
                    break;
                }
                odometer[dim] = 0;
            }
        }
    }

    /// The `index`-th grid combination in [`grid_combinations`] order,
    /// decoded without materializing the grid.
    ///
    /// [`grid_combinations`]: Self::grid_combinations
    pub fn nth_grid_combination(&self, index: usize) -> Option<ParamSet> {
        if self.dimensions.is_empty() || index >= self.grid_size() {
            return None;
        }
        let mut combo = ParamSet::with_capacity(self.dimensions.len());
        let mut remainder = index;
        for (name, range) in self.dimensions.iter().rev() {
            let values = range.values();
            let idx = remainder % values.len();
            remainder /= values.len();
            combo.insert(name.clone(), values[idx].clone());
        }
        Some(combo)
    }

    /// `n` independent uniform samples, one value per dimension each.
    pub fn random_combinations(&self, n: usize, rng: &mut impl Rng) -> Vec<ParamSet> {
        (0..n)
            .map(|_| {
                self.dimensions
                    .iter()
                    .map(|(name, range)| (name.clone(), range.sample(rng)))
                    .collect()
            })
            .collect()
    }
}
