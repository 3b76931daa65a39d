use super::engine::run_projection;
use super::types::{Params, Projection};

/// Single-entry cache of the most recent projection.
///
/// Parameters match only when every field is bit-identical, so `-0.0` and
/// `0.0` count as different inputs.
#[derive(Debug, Default)]
pub struct ProjectionMemo {
    last: Option<(ParamKey, Projection)>,
    computations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParamKey {
    inflation_rate: u64,
    growth_rate: u64,
    horizon_years: u32,
    base_expense: u64,
    starting_capital: Option<u64>,
    asset_price: Option<u64>,
}

impl From<&Params> for ParamKey {
    fn from(params: &Params) -> Self {
        Self {
            inflation_rate: params.inflation_rate.to_bits(),
            growth_rate: params.growth_rate.to_bits(),
            horizon_years: params.horizon_years,
            base_expense: params.base_expense.to_bits(),
            starting_capital: params.starting_capital.map(f64::to_bits),
            asset_price: params.asset_price.map(f64::to_bits),
        }
    }
}

impl ProjectionMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, params: &Params) -> Projection {
        let key = ParamKey::from(params);
        if let Some((cached_key, projection)) = &self.last {
            if *cached_key == key {
                return projection.clone();
            }
        }

        let projection = run_projection(params);
        self.computations += 1;
        self.last = Some((key, projection.clone()));
        projection
    }

    /// Number of projections actually computed (cache misses).
    pub fn computations(&self) -> u64 {
        self.computations
    }
}
