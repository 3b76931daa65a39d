//! Reference asset price lookup.
//!
//! A single best-effort request at startup. Any failure falls back to
//! [`FALLBACK_BTC_PRICE_USD`] and carries an advisory warning instead of an
//! error, so the calculator always has a price to work with.

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub const DEFAULT_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd&include_last_updated_at=true";
pub const PRICE_ASSET_ID: &str = "bitcoin";
pub const FALLBACK_BTC_PRICE_USD: f64 = 100_000.0;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("price endpoint returned HTTP {0}")]
    Status(u16),
    #[error("malformed price payload: {0}")]
    Malformed(String),
    #[error("price must be a positive number, got {0}")]
    NonPositive(f64),
    #[error("live price lookup is disabled")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub usd: f64,
    pub last_updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    usd: Option<f64>,
    last_updated_at: Option<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceReference {
    pub usd: f64,
    pub last_updated_at: Option<i64>,
    pub source: PriceSource,
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PriceSettings {
    pub url: String,
    pub asset_id: String,
    pub offline: bool,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_PRICE_URL.to_string(),
            asset_id: PRICE_ASSET_ID.to_string(),
            offline: false,
        }
    }
}

/// Parses `{ "<asset>": { "usd": number, "last_updated_at": number } }`.
pub fn parse_quote(body: &str, asset_id: &str) -> Result<Quote, PriceError> {
    let payload: HashMap<String, Value> =
        serde_json::from_str(body).map_err(|e| PriceError::Malformed(e.to_string()))?;
    let entry = payload
        .get(asset_id)
        .ok_or_else(|| PriceError::Malformed(format!("missing `{asset_id}` entry")))?;
    let entry = QuoteEntry::deserialize(entry)
        .map_err(|e| PriceError::Malformed(format!("`{asset_id}` entry: {e}")))?;
    let usd = entry
        .usd
        .ok_or_else(|| PriceError::Malformed(format!("missing `{asset_id}.usd`")))?;

    if !usd.is_finite() || usd <= 0.0 {
        return Err(PriceError::NonPositive(usd));
    }

    Ok(Quote {
        usd,
        last_updated_at: entry.last_updated_at.map(|ts| ts as i64),
    })
}

pub async fn fetch_quote(client: &Client, url: &str, asset_id: &str) -> Result<Quote, PriceError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PriceError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    parse_quote(&body, asset_id)
}

pub fn resolve_price(result: Result<Quote, PriceError>) -> PriceReference {
    match result {
        Ok(quote) => PriceReference {
            usd: quote.usd,
            last_updated_at: quote.last_updated_at,
            source: PriceSource::Live,
            warning: None,
        },
        Err(err) => PriceReference {
            usd: FALLBACK_BTC_PRICE_USD,
            last_updated_at: None,
            source: PriceSource::Fallback,
            warning: Some(format!(
                "Live BTC price unavailable ({err}); using fallback of {FALLBACK_BTC_PRICE_USD:.0} USD."
            )),
        },
    }
}

/// Makes one attempt at the quote endpoint. No retry and no timeout.
pub async fn load_reference_price(settings: &PriceSettings) -> PriceReference {
    let result = if settings.offline {
        Err(PriceError::Disabled)
    } else {
        match Client::builder()
            .user_agent(concat!("lif/", env!("CARGO_PKG_VERSION")))
            .build()
        {
            Ok(client) => fetch_quote(&client, &settings.url, &settings.asset_id).await,
            Err(e) => Err(PriceError::from(e)),
        }
    };

    let reference = resolve_price(result);
    match &reference.warning {
        Some(warning) if settings.offline => debug!("{warning}"),
        Some(warning) => warn!("{warning}"),
        None => info!("Reference BTC price: {:.2} USD", reference.usd),
    }
    reference
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use tokio::net::TcpListener;

    /// Serves `body` with `status` at `/quote` on a loopback port.
    async fn serve_quote(status: StatusCode, body: &'static str) -> String {
        let app = Router::new().route("/quote", get(move || async move { (status, body) }));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/quote")
    }

    fn loopback_client() -> Client {
        Client::builder()
            .no_proxy()
            .build()
            .expect("client builds")
    }

    #[test]
    fn parse_quote_reads_price_and_timestamp() {
        let body = r#"{"bitcoin":{"usd":64123.5,"last_updated_at":1718000000}}"#;
        let quote = parse_quote(body, PRICE_ASSET_ID).expect("valid quote");
        assert_eq!(quote.usd, 64_123.5);
        assert_eq!(quote.last_updated_at, Some(1_718_000_000));
    }

    #[test]
    fn parse_quote_tolerates_missing_timestamp_and_other_assets() {
        let body = r#"{"ethereum":[1,2,3],"bitcoin":{"usd":70000}}"#;
        let quote = parse_quote(body, PRICE_ASSET_ID).expect("valid quote");
        assert_eq!(quote.usd, 70_000.0);
        assert_eq!(quote.last_updated_at, None);
    }

    #[test]
    fn parse_quote_rejects_missing_asset() {
        let err = parse_quote(r#"{"ethereum":{"usd":3000}}"#, PRICE_ASSET_ID)
            .expect_err("asset is missing");
        assert!(matches!(err, PriceError::Malformed(_)));
        assert!(err.to_string().contains("bitcoin"));
    }

    #[test]
    fn parse_quote_rejects_missing_usd_field() {
        let err = parse_quote(r#"{"bitcoin":{"eur":60000}}"#, PRICE_ASSET_ID)
            .expect_err("usd is missing");
        assert!(matches!(err, PriceError::Malformed(_)));
    }

    #[test]
    fn parse_quote_rejects_non_json_body() {
        let err = parse_quote("<html>rate limited</html>", PRICE_ASSET_ID)
            .expect_err("not json");
        assert!(matches!(err, PriceError::Malformed(_)));
    }

    #[test]
    fn parse_quote_rejects_non_positive_price() {
        for body in [r#"{"bitcoin":{"usd":0}}"#, r#"{"bitcoin":{"usd":-5}}"#] {
            let err = parse_quote(body, PRICE_ASSET_ID).expect_err("price must be positive");
            assert!(matches!(err, PriceError::NonPositive(_)));
        }
    }

    #[test]
    fn resolve_price_failure_uses_fallback_with_warning() {
        let reference = resolve_price(Err(PriceError::Status(429)));
        assert_eq!(reference.usd, FALLBACK_BTC_PRICE_USD);
        assert_eq!(reference.source, PriceSource::Fallback);
        let warning = reference.warning.expect("fallback must carry a warning");
        assert!(warning.contains("HTTP 429"));
        assert!(warning.contains("100000"));
    }

    #[test]
    fn resolve_price_success_has_no_warning() {
        let reference = resolve_price(Ok(Quote {
            usd: 65_000.0,
            last_updated_at: Some(1),
        }));
        assert_eq!(reference.usd, 65_000.0);
        assert_eq!(reference.source, PriceSource::Live);
        assert!(reference.warning.is_none());
    }

    #[tokio::test]
    async fn fetch_quote_reads_live_payload() {
        let url = serve_quote(
            StatusCode::OK,
            r#"{"bitcoin":{"usd":67500.25,"last_updated_at":1718000000}}"#,
        )
        .await;
        let quote = fetch_quote(&loopback_client(), &url, PRICE_ASSET_ID)
            .await
            .expect("quote over the wire");
        assert_eq!(quote.usd, 67_500.25);
        assert_eq!(quote.last_updated_at, Some(1_718_000_000));
    }

    #[tokio::test]
    async fn fetch_quote_reports_server_error_status() {
        let url = serve_quote(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let err = fetch_quote(&loopback_client(), &url, PRICE_ASSET_ID)
            .await
            .expect_err("500 must fail");
        assert!(matches!(err, PriceError::Status(500)), "got {err:?}");
    }

    #[tokio::test]
    async fn fetch_quote_rejects_zero_price_over_the_wire() {
        let url = serve_quote(StatusCode::OK, r#"{"bitcoin":{"usd":0}}"#).await;
        let err = fetch_quote(&loopback_client(), &url, PRICE_ASSET_ID)
            .await
            .expect_err("zero price must fail");
        assert!(matches!(err, PriceError::NonPositive(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn fetch_quote_rejects_malformed_body_over_the_wire() {
        let url = serve_quote(StatusCode::OK, "not json").await;
        let err = fetch_quote(&loopback_client(), &url, PRICE_ASSET_ID)
            .await
            .expect_err("malformed body must fail");
        assert!(matches!(err, PriceError::Malformed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn failing_endpoint_falls_back_with_warning() {
        let url = serve_quote(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let settings = PriceSettings {
            url,
            ..PriceSettings::default()
        };
        let reference = load_reference_price(&settings).await;
        assert_eq!(reference.usd, FALLBACK_BTC_PRICE_USD);
        assert_eq!(reference.source, PriceSource::Fallback);
        assert!(reference.warning.is_some());
    }

    #[tokio::test]
    async fn offline_settings_skip_network_and_fall_back() {
        let settings = PriceSettings {
            offline: true,
            ..PriceSettings::default()
        };
        let reference = load_reference_price(&settings).await;
        assert_eq!(reference.usd, FALLBACK_BTC_PRICE_USD);
        assert_eq!(reference.source, PriceSource::Fallback);
        assert!(reference.warning.is_some());
    }
}
