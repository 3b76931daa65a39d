use serde::Serialize;

pub const MIN_INFLATION_RATE: f64 = 0.0;
pub const MAX_INFLATION_RATE: f64 = 0.20;
pub const MIN_GROWTH_RATE: f64 = -0.10;
pub const MAX_GROWTH_RATE: f64 = 0.50;
pub const MAX_HORIZON_YEARS: u32 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    pub inflation_rate: f64,
    pub growth_rate: f64,
    pub horizon_years: u32,
    pub base_expense: f64,
    pub starting_capital: Option<f64>,
    pub asset_price: Option<f64>,
}

impl Params {
    /// Clamps every field into the range the calculator UI exposes.
    ///
    /// Growth never reaches -100% here, so the ratio base stays finite.
    pub fn clamped(self) -> Self {
        Self {
            inflation_rate: self
                .inflation_rate
                .clamp(MIN_INFLATION_RATE, MAX_INFLATION_RATE),
            growth_rate: self.growth_rate.clamp(MIN_GROWTH_RATE, MAX_GROWTH_RATE),
            horizon_years: self.horizon_years.min(MAX_HORIZON_YEARS),
            base_expense: self.base_expense.max(0.0),
            starting_capital: self.starting_capital.map(|v| v.max(0.0)),
            asset_price: self.asset_price.filter(|p| p.is_finite() && *p > 0.0),
        }
    }

    pub fn ratio_base(&self) -> f64 {
        (1.0 + self.inflation_rate) / (1.0 + self.growth_rate)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearPoint {
    pub year: u32,
    pub ratio: f64,
    pub nominal_expense: f64,
    pub asset_adjusted_expense: f64,
    pub cumulative_expense: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_in_asset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_expense_in_asset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_balance: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub lifespan_inflation_factor: f64,
    pub final_ratio: f64,
    pub final_nominal_expense: f64,
    pub final_asset_adjusted_expense: f64,
    pub final_expense_in_asset: Option<f64>,
    pub total_expense: f64,
    pub average_expense: f64,
    pub total_expense_in_asset: Option<f64>,
    pub average_expense_in_asset: Option<f64>,
    pub final_portfolio: Option<f64>,
    /// `None` when the portfolio survives the horizon or no capital was given.
    pub depletion_year: Option<u32>,
    pub break_even_capital: f64,
    pub initial_withdrawal_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub series: Vec<YearPoint>,
    pub summary: Summary,
}
