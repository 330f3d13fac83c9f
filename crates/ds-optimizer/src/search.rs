//! Search space definitions and search-point generation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use ds_types::{
    ParameterMap, ParameterValue, SearchError, INPUT_ARG1_KEY, INPUT_ARG2_KEY,
};

/// One integer axis of the search space, `[low, high]` inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as it appears in the trial config (e.g. "input_arg1").
    pub name: String,
    pub low: i64,
    pub high: i64,
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            low,
            high,
        });
        self
    }

    /// Reject empty spaces and inverted ranges.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.parameters.is_empty() {
            return Err(SearchError::EmptySpace);
        }
        match self.parameters.iter().find(|p| p.low > p.high) {
            Some(param) => Err(SearchError::InvalidRange {
                parameter: param.name.clone(),
                low: param.low,
                high: param.high,
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search-point generators.
pub trait SearchStrategy: Send {
    /// Generate up to `count` further search points. An empty batch means the
    /// strategy is exhausted.
    fn suggest(&mut self, count: usize) -> Vec<ParameterMap>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// Exhaustive grid over discrete parameter combinations, first axis outermost.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    combos: Vec<ParameterMap>,
}

impl GridSearch {
    pub fn new(space: &SearchSpace) -> Self {
        Self {
            cursor: 0,
            combos: Self::build_grid(space),
        }
    }

    /// All remaining points, without advancing the cursor.
    pub fn points(&self) -> &[ParameterMap] {
        &self.combos[self.cursor..]
    }

    fn build_grid(space: &SearchSpace) -> Vec<ParameterMap> {
        let axes: Vec<(&str, Vec<ParameterValue>)> = space
            .parameters
            .iter()
            .map(|param| {
                let values = (param.low..=param.high).map(ParameterValue::Int).collect();
                (param.name.as_str(), values)
            })
            .collect();

        // Cartesian product
        let mut result: Vec<ParameterMap> = vec![ParameterMap::new()];
        for (name, values) in &axes {
            let mut next = Vec::with_capacity(result.len() * values.len());
            for existing in &result {
                for value in values {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterMap> {
        let end = (self.cursor + count).min(self.combos.len());
        let batch = self.combos[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent, seeded random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn sample_one(&mut self) -> ParameterMap {
        let mut params = ParameterMap::new();

        for param in &self.space.parameters {
            let value = self.rng.random_range(param.low..=param.high);
            params.insert(param.name.clone(), ParameterValue::Int(value));
        }

        params
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterMap> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Basic variant generator ----

/// Hands out a fixed list of points first, then up to `num_samples` seeded
/// random draws from the space.
#[derive(Debug, Clone)]
pub struct BasicVariantGenerator {
    points: VecDeque<ParameterMap>,
    random: Option<RandomSearch>,
    remaining_samples: usize,
}

impl BasicVariantGenerator {
    pub fn new(points_to_evaluate: Vec<ParameterMap>) -> Self {
        Self {
            points: points_to_evaluate.into(),
            random: None,
            remaining_samples: 0,
        }
    }

    /// Follow the fixed points with `num_samples` random draws from `space`.
    pub fn with_random_samples(
        mut self,
        space: SearchSpace,
        num_samples: usize,
        seed: u64,
    ) -> Result<Self, SearchError> {
        if num_samples > 0 {
            space.validate()?;
            self.random = Some(RandomSearch::new(space, seed));
        }
        self.remaining_samples = num_samples;
        Ok(self)
    }

    /// Points still to be handed out.
    pub fn remaining(&self) -> usize {
        let random = if self.random.is_some() {
            self.remaining_samples
        } else {
            0
        };
        self.points.len() + random
    }
}

impl SearchStrategy for BasicVariantGenerator {
    fn suggest(&mut self, count: usize) -> Vec<ParameterMap> {
        let fixed = count.min(self.points.len());
        let mut batch: Vec<ParameterMap> = self.points.drain(..fixed).collect();

        if let Some(random) = self.random.as_mut() {
            let extra = (count - batch.len()).min(self.remaining_samples);
            batch.extend(random.suggest(extra));
            self.remaining_samples -= extra;
        }

        batch
    }

    fn name(&self) -> &str {
        "basic_variant"
    }
}

/// Search space of the demonstration sweep: both inputs range over {0, 1}.
pub fn demo_search_space() -> SearchSpace {
    SearchSpace::new()
        .add_int(INPUT_ARG1_KEY, 0, 1)
        .add_int(INPUT_ARG2_KEY, 0, 1)
}

/// Points of the demonstration sweep, in `input_arg1`-major order:
/// (0,0), (0,1), (1,0), (1,1).
pub fn create_points_to_evaluate() -> Vec<ParameterMap> {
    GridSearch::new(&demo_search_space()).points().to_vec()
}
