use super::types::{MAX_HORIZON_YEARS, Params, Projection, Summary, YearPoint};

#[derive(Debug, Default)]
struct RunningTotals {
    expense: f64,
    expense_in_asset: f64,
}

#[derive(Debug)]
struct PortfolioState {
    balance: f64,
    depletion_year: Option<u32>,
}

impl PortfolioState {
    fn new(starting_capital: f64) -> Self {
        Self {
            balance: starting_capital,
            depletion_year: (starting_capital <= 0.0).then_some(0),
        }
    }

    fn advance(&mut self, year: u32, growth_rate: f64, expense: f64) {
        self.balance = self.balance * (1.0 + growth_rate) - expense;
        if self.depletion_year.is_none() && self.balance <= 0.0 {
            self.depletion_year = Some(year);
        }
    }
}

/// Tracks the largest present value (discounted at the growth rate) of the
/// expenses paid so far. A portfolio survives year `k` exactly when its
/// starting capital exceeds the present value of years `1..=k`.
#[derive(Debug, Default)]
struct BreakEvenTracker {
    discounted_outflow: f64,
    peak: f64,
}

impl BreakEvenTracker {
    fn record(&mut self, expense: f64, growth_multiple: f64) {
        self.discounted_outflow += expense / growth_multiple;
        self.peak = self.peak.max(self.discounted_outflow);
    }
}

/// Projects expenses, asset-denominated costs and the optional portfolio
/// over `0..=horizon_years`.
///
/// A growth rate of exactly -100% makes the ratio base infinite and the
/// outputs non-finite. [`Params::clamped`] keeps growth above that.
/// Horizons beyond [`MAX_HORIZON_YEARS`] are cut to that bound.
pub fn run_projection(params: &Params) -> Projection {
    let ratio_base = params.ratio_base();
    let inflation_factor = 1.0 + params.inflation_rate;
    let growth_factor = 1.0 + params.growth_rate;
    let horizon = params.horizon_years.min(MAX_HORIZON_YEARS);

    let mut series = Vec::with_capacity(horizon as usize + 1);
    let mut totals = RunningTotals::default();
    let mut portfolio = params.starting_capital.map(PortfolioState::new);
    let mut break_even = BreakEvenTracker::default();

    for year in 0..=horizon {
        let exponent = year as i32;
        let ratio = ratio_base.powi(exponent);
        let nominal_expense = params.base_expense * inflation_factor.powi(exponent);
        let growth_multiple = growth_factor.powi(exponent);
        let asset_price = params.asset_price.map(|price| price * growth_multiple);
        let expense_in_asset = asset_price.map(|price| nominal_expense / price);

        // Year 0 is the starting point; no expense flows out yet.
        if year > 0 {
            totals.expense += nominal_expense;
            if let Some(units) = expense_in_asset {
                totals.expense_in_asset += units;
            }
            if let Some(state) = portfolio.as_mut() {
                state.advance(year, params.growth_rate, nominal_expense);
            }
            break_even.record(nominal_expense, growth_multiple);
        }

        series.push(YearPoint {
            year,
            ratio,
            nominal_expense,
            asset_adjusted_expense: params.base_expense * ratio,
            cumulative_expense: totals.expense,
            asset_price,
            expense_in_asset,
            cumulative_expense_in_asset: expense_in_asset.map(|_| totals.expense_in_asset),
            portfolio_balance: portfolio.as_ref().map(|state| state.balance),
        });
    }

    let final_ratio = ratio_base.powi(horizon as i32);
    let final_nominal_expense = params.base_expense * inflation_factor.powi(horizon as i32);
    let final_expense_in_asset = params
        .asset_price
        .map(|price| final_nominal_expense / (price * growth_factor.powi(horizon as i32)));
    let total_expense_in_asset = params.asset_price.map(|_| totals.expense_in_asset);

    let summary = Summary {
        lifespan_inflation_factor: lifespan_inflation_factor(
            params.inflation_rate,
            params.growth_rate,
            horizon,
        ),
        final_ratio,
        final_nominal_expense,
        final_asset_adjusted_expense: params.base_expense * final_ratio,
        final_expense_in_asset,
        total_expense: totals.expense,
        average_expense: average_over_horizon(totals.expense, horizon),
        total_expense_in_asset,
        average_expense_in_asset: total_expense_in_asset
            .map(|total| average_over_horizon(total, horizon)),
        final_portfolio: portfolio.as_ref().map(|state| state.balance),
        depletion_year: portfolio.as_ref().and_then(|state| state.depletion_year),
        break_even_capital: break_even.peak,
        initial_withdrawal_rate: params
            .starting_capital
            .filter(|capital| *capital > 0.0)
            .map(|capital| params.base_expense / capital),
    };

    Projection { series, summary }
}

/// Closed-form Lifespan Inflation Factor: `((1+i)/(1+a))^T - 1`.
pub fn lifespan_inflation_factor(inflation_rate: f64, growth_rate: f64, horizon_years: u32) -> f64 {
    ((1.0 + inflation_rate) / (1.0 + growth_rate)).powi(horizon_years as i32) - 1.0
}

fn average_over_horizon(total: f64, horizon: u32) -> f64 {
    if horizon > 0 {
        total / horizon as f64
    } else {
        0.0
    }
}
