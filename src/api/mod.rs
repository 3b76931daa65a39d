use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::core::{LastGood, Params, ProjectionMemo, Summary, YearPoint, run_projection};
use crate::price::{
    DEFAULT_PRICE_URL, PRICE_ASSET_ID, PriceError, PriceReference, PriceSettings,
    load_reference_price, resolve_price,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

#[derive(Parser, Debug)]
#[command(
    name = "lif",
    about = "Lifespan Inflation Factor calculator (expenses vs. asset growth over a horizon)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the calculator page and JSON API
    Serve(ServeArgs),
    /// Print a single projection as JSON
    Project(ProjectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, help = "Skip the live price lookup and use the fallback price")]
    pub offline: bool,
    #[arg(long, default_value = DEFAULT_PRICE_URL, help = "Price quote endpoint")]
    pub price_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value_t = 3.0, help = "Annual inflation rate in percent, e.g. 3")]
    pub inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        allow_negative_numbers = true,
        help = "Annual asset growth rate in percent, may be negative"
    )]
    pub growth_rate: f64,
    #[arg(long, default_value_t = 30, help = "Number of years to project")]
    pub horizon_years: u32,
    #[arg(long, default_value_t = 60000.0, help = "Annual expense today, in USD")]
    pub base_expense: f64,
    #[arg(long, help = "Starting portfolio in USD; enables the depletion trace")]
    pub starting_capital: Option<f64>,
    #[arg(long, help = "Starting BTC price in USD; overrides the reference price")]
    pub asset_price: Option<f64>,
    #[arg(long, help = "Fetch the live BTC price and report expenses in BTC")]
    pub live_price: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    inflation_rate: Option<f64>,
    growth_rate: Option<f64>,
    horizon_years: Option<u32>,
    base_expense: Option<f64>,
    starting_capital: Option<f64>,
    asset_price: Option<f64>,
    use_asset_price: Option<bool>,
}

#[derive(Debug)]
struct ApiRequest {
    params: Params,
    asset_price_override: Option<f64>,
    use_asset_price: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    params: Params,
    #[serde(skip_serializing_if = "Option::is_none")]
    price_reference: Option<PriceReference>,
    series: Vec<YearPoint>,
    summary: Summary,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    price: Arc<PriceReference>,
    memo: Arc<Mutex<ProjectionMemo>>,
    /// Last accepted asset price override; cleared when a request sends none.
    asset_override: Arc<Mutex<Option<LastGood>>>,
}

impl AppState {
    fn new(price: PriceReference) -> Self {
        Self {
            price: Arc::new(price),
            memo: Arc::new(Mutex::new(ProjectionMemo::new())),
            asset_override: Arc::new(Mutex::new(None)),
        }
    }
}

/// Validates CLI-style arguments (rates in percent) and converts them into
/// clamped engine parameters. The asset price is resolved separately.
fn build_params(args: &ProjectArgs) -> Result<Params, String> {
    for (name, value) in [
        ("--inflation-rate", args.inflation_rate),
        ("--growth-rate", args.growth_rate),
        ("--base-expense", args.base_expense),
    ] {
        if !value.is_finite() {
            return Err(format!("{name} must be a finite number"));
        }
    }

    if let Some(capital) = args.starting_capital {
        if !capital.is_finite() {
            return Err("--starting-capital must be a finite number".to_string());
        }
    }

    let params = Params {
        inflation_rate: args.inflation_rate / 100.0,
        growth_rate: args.growth_rate / 100.0,
        horizon_years: args.horizon_years,
        base_expense: args.base_expense,
        starting_capital: args.starting_capital,
        asset_price: None,
    };
    Ok(params.clamped())
}

/// Picks the effective asset price. A usable override replaces
/// `last_override`; an unusable one keeps the last accepted override, or the
/// reference price (and its advisory) when none was accepted yet.
fn resolve_asset_price(
    reference: &PriceReference,
    override_price: Option<f64>,
    last_override: &mut Option<LastGood>,
    warnings: &mut Vec<String>,
) -> f64 {
    let Some(candidate) = override_price else {
        *last_override = None;
        push_reference_warning(reference, warnings);
        return reference.usd;
    };

    let mut price = last_override.unwrap_or_else(|| LastGood::new(reference.usd));
    if price.offer(candidate) {
        *last_override = Some(price);
        return price.value();
    }

    warnings.push(format!(
        "Ignored asset price override {candidate}; keeping {:.2} USD.",
        price.value()
    ));
    if last_override.is_none() {
        push_reference_warning(reference, warnings);
    }
    price.value()
}

fn push_reference_warning(reference: &PriceReference, warnings: &mut Vec<String>) {
    if let Some(warning) = &reference.warning {
        warnings.push(warning.clone());
    }
}

fn build_project_response(
    request: ApiRequest,
    reference: &PriceReference,
    memo: Option<&Mutex<ProjectionMemo>>,
    last_override: &mut Option<LastGood>,
) -> ProjectResponse {
    let mut warnings = Vec::new();
    let mut params = request.params;
    let price_reference = if request.use_asset_price || request.asset_price_override.is_some() {
        params.asset_price = Some(resolve_asset_price(
            reference,
            request.asset_price_override,
            last_override,
            &mut warnings,
        ));
        Some(reference.clone())
    } else {
        None
    };

    let projection = match memo {
        Some(memo) => memo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_or_compute(&params),
        None => run_projection(&params),
    };
    debug!(
        "Projected {} years: LIF {:.4}, depletion {:?}",
        params.horizon_years,
        projection.summary.lifespan_inflation_factor,
        projection.summary.depletion_year
    );

    ProjectResponse {
        params,
        price_reference,
        series: projection.series,
        summary: projection.summary,
        warnings,
    }
}

/// Runs one projection from the command line and renders it as JSON.
pub async fn run_cli_projection(args: ProjectArgs) -> Result<String, String> {
    let params = build_params(&args)?;
    let use_asset_price = args.live_price || args.asset_price.is_some();
    let reference = if use_asset_price {
        let settings = PriceSettings {
            offline: !args.live_price,
            ..PriceSettings::default()
        };
        load_reference_price(&settings).await
    } else {
        resolve_price(Err(PriceError::Disabled))
    };

    let request = ApiRequest {
        params,
        asset_price_override: args.asset_price,
        use_asset_price,
    };
    let response = build_project_response(request, &reference, None, &mut None);
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to render JSON: {e}"))
}

pub async fn run_http_server(args: ServeArgs) -> std::io::Result<()> {
    let settings = PriceSettings {
        url: args.price_url,
        asset_id: PRICE_ASSET_ID.to_string(),
        offline: args.offline,
    };
    let reference = load_reference_price(&settings).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let app = router(AppState::new(reference));

    let listener = TcpListener::bind(addr).await?;
    info!("Lifespan inflation API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{}/", args.port);

    axum::serve(listener, app).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/api/price", get(price_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn price_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, state.price.as_ref())
}

async fn project_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<ProjectPayload>,
) -> Response {
    project_handler_impl(&state, payload)
}

async fn project_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProjectPayload>,
) -> Response {
    project_handler_impl(&state, payload)
}

fn project_handler_impl(state: &AppState, payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let mut last_override = state
        .asset_override
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let response = build_project_response(
        request,
        &state.price,
        Some(&state.memo),
        &mut last_override,
    );
    json_response(StatusCode::OK, response)
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ProjectPayload) -> Result<ApiRequest, String> {
    let mut args = default_args_for_api();

    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.growth_rate {
        args.growth_rate = v;
    }
    if let Some(v) = payload.horizon_years {
        args.horizon_years = v;
    }
    if let Some(v) = payload.base_expense {
        args.base_expense = v;
    }
    if payload.starting_capital.is_some() {
        args.starting_capital = payload.starting_capital;
    }

    let params = build_params(&args)?;
    Ok(ApiRequest {
        params,
        asset_price_override: payload.asset_price,
        use_asset_price: payload.use_asset_price.unwrap_or(false),
    })
}

fn default_args_for_api() -> ProjectArgs {
    ProjectArgs {
        inflation_rate: 3.0,
        growth_rate: 7.0,
        horizon_years: 30,
        base_expense: 60_000.0,
        starting_capital: None,
        asset_price: None,
        live_price: false,
    }
}
