mod engine;
mod memo;
mod overrides;
mod types;

pub use engine::{lifespan_inflation_factor, run_projection};
pub use memo::ProjectionMemo;
pub use overrides::LastGood;
pub use types::{
    MAX_GROWTH_RATE, MAX_HORIZON_YEARS, MAX_INFLATION_RATE, MIN_GROWTH_RATE, MIN_INFLATION_RATE,
    Params, Projection, Summary, YearPoint,
};
