use crate::broker::{BrokerEvent, BrokerTransport};
use crate::config::GatewayConfig;
use crate::data::normalize_symbol;
use crate::error::TransportError;
use crate::models::{Bar, Order, Position};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Brokerage gateway session over HTTP.
///
/// Requests run on spawned tasks and deliver their results as
/// [`BrokerEvent`]s through one ordered channel, so the reconciler sees a
/// serial callback stream. One in-flight history request per symbol keeps
/// per-symbol ordering trivial.
pub struct GatewayClient {
    http: Client,
    base_url: String,
    headers: HeaderMap,
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
    events_rx: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "GW-API-KEY-ID",
            HeaderValue::from_str(&config.api_key).context("invalid gateway API key")?,
        );
        headers.insert(
            "GW-API-SECRET-KEY",
            HeaderValue::from_str(&config.api_secret).context("invalid gateway API secret")?,
        );

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to construct HTTP client for the gateway")?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            headers,
            events_tx,
            events_rx,
        })
    }

    /// Direct fetch used by snapshot export; the live loop goes through
    /// [`BrokerTransport::request_history`] instead.
    pub async fn fetch_daily_bars(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<Bar>, TransportError> {
        fetch_daily_bars(
            &self.http,
            &self.base_url,
            &self.headers,
            symbol,
            lookback_days,
        )
        .await
    }
}

impl BrokerTransport for GatewayClient {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let url = format!("{}/account", self.base_url);
        let response = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|err| map_request_error(err, "connect"))?;
        response
            .error_for_status()
            .map_err(|err| TransportError::ConnRefused(err.to_string()))?;
        Ok(())
    }

    fn request_positions(&mut self) {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let headers = self.headers.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match fetch_positions(&http, &base_url, &headers).await {
                Ok(positions) => BrokerEvent::Positions(positions),
                Err(err) => {
                    // Position snapshot failures are session-level, not
                    // per-symbol.
                    warn!("Position snapshot failed: {}", err);
                    BrokerEvent::Disconnected
                }
            };
            let _ = events.send(event);
        });
    }

    fn request_history(&mut self, symbol: &str, lookback_days: u32) {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let headers = self.headers.clone();
        let events = self.events_tx.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            let event =
                match fetch_daily_bars(&http, &base_url, &headers, &symbol, lookback_days).await {
                    Ok(bars) => BrokerEvent::HistoryBars { symbol, bars },
                    Err(error) => BrokerEvent::HistoryFailed { symbol, error },
                };
            let _ = events.send(event);
        });
    }

    fn place_order(&mut self, order: &Order) {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let headers = self.headers.clone();
        let events = self.events_tx.clone();
        let order = order.clone();
        tokio::spawn(async move {
            match submit_order(&http, &base_url, &headers, &order).await {
                Ok(filled) => {
                    let _ = events.send(BrokerEvent::OrderAccepted {
                        symbol: order.symbol.clone(),
                        side: order.side,
                    });
                    if filled {
                        let _ = events.send(BrokerEvent::Filled {
                            symbol: order.symbol,
                            side: order.side,
                        });
                    }
                }
                Err(error) => {
                    let _ = events.send(BrokerEvent::OrderRejected {
                        symbol: order.symbol,
                        side: order.side,
                        reason: error.to_string(),
                    });
                }
            }
        });
    }

    async fn recv_event(&mut self) -> Option<BrokerEvent> {
        self.events_rx.recv().await
    }
}

async fn fetch_positions(
    http: &Client,
    base_url: &str,
    headers: &HeaderMap,
) -> Result<Vec<Position>, TransportError> {
    let url = format!("{}/positions", base_url);
    let response = http
        .get(url)
        .headers(headers.clone())
        .send()
        .await
        .map_err(|err| map_request_error(err, "positions"))?;
    let response = check_status(response, "positions")?;
    let entries: Vec<GatewayPosition> = response
        .json()
        .await
        .map_err(|err| TransportError::Network(format!("malformed positions payload: {err}")))?;

    let mut positions = Vec::new();
    for entry in entries {
        let Some(symbol) = entry.symbol.as_deref().and_then(normalize_symbol) else {
            continue;
        };
        let shares = entry.qty.unwrap_or(0.0).round() as i64;
        if shares == 0 {
            continue;
        }
        positions.push(Position {
            symbol,
            shares,
            owned: shares > 0,
        });
    }
    Ok(positions)
}

async fn fetch_daily_bars(
    http: &Client,
    base_url: &str,
    headers: &HeaderMap,
    symbol: &str,
    lookback_days: u32,
) -> Result<Vec<Bar>, TransportError> {
    let url = format!("{}/bars/{}", base_url, symbol);
    let lookback = lookback_days.to_string();
    let response = http
        .get(url)
        .headers(headers.clone())
        .query(&[("lookback_days", lookback.as_str()), ("timeframe", "1D")])
        .send()
        .await
        .map_err(|err| map_request_error(err, symbol))?;
    let response = check_status(response, symbol)?;
    let entries: Vec<GatewayBar> = response.json().await.map_err(|err| {
        TransportError::Network(format!("malformed bars payload for {symbol}: {err}"))
    })?;

    let mut bars = Vec::with_capacity(entries.len());
    for entry in entries {
        let date = entry.date.as_deref().and_then(parse_timestamp);
        match (date, entry.close) {
            (Some(date), Some(close)) if close.is_finite() => bars.push(Bar {
                symbol: symbol.to_string(),
                date,
                close,
            }),
            _ => warn!("Dropping malformed bar for {} from gateway response", symbol),
        }
    }
    Ok(bars)
}

async fn submit_order(
    http: &Client,
    base_url: &str,
    headers: &HeaderMap,
    order: &Order,
) -> Result<bool, TransportError> {
    let url = format!("{}/orders", base_url);
    let body = serde_json::json!({
        "client_order_id": order.client_order_id,
        "symbol": order.symbol,
        "side": order.side.as_str(),
        "type": "market",
        "notional": order.notional,
    });
    let response = http
        .post(url)
        .headers(headers.clone())
        .json(&body)
        .send()
        .await
        .map_err(|err| map_request_error(err, &order.symbol))?;

    if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
        let reason = response
            .text()
            .await
            .unwrap_or_else(|_| "order not accepted".to_string());
        return Err(TransportError::Rejected {
            symbol: order.symbol.clone(),
            reason,
        });
    }
    let response = check_status(response, &order.symbol)?;
    let ack: GatewayOrderAck = response
        .json()
        .await
        .map_err(|err| TransportError::Network(format!("malformed order ack: {err}")))?;
    Ok(ack
        .status
        .as_deref()
        .map(|status| status.eq_ignore_ascii_case("filled"))
        .unwrap_or(false))
}

fn check_status(
    response: reqwest::Response,
    subject: &str,
) -> Result<reqwest::Response, TransportError> {
    match response.status() {
        StatusCode::NOT_FOUND => Err(TransportError::NotFound(subject.to_string())),
        status if status.is_success() => Ok(response),
        status => Err(TransportError::Network(format!(
            "gateway returned {} for {}",
            status, subject
        ))),
    }
}

fn map_request_error(err: reqwest::Error, subject: &str) -> TransportError {
    if err.is_connect() {
        TransportError::ConnRefused(format!("{subject}: {err}"))
    } else if err.is_timeout() {
        TransportError::Timeout(subject.to_string())
    } else {
        TransportError::Network(format!("{subject}: {err}"))
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[derive(Debug, Deserialize)]
struct GatewayPosition {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    qty: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GatewayBar {
    #[serde(default)]
    date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GatewayOrderAck {
    #[serde(default)]
    status: Option<String>,
}

/// Gateways are loose about numeric types; accept numbers and numeric
/// strings alike.
fn deserialize_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct F64OptVisitor;

    impl<'de> Visitor<'de> for F64OptVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
            Ok(Some(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(Some(value as f64))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(Some(value as f64))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value.trim().parse::<f64>().ok())
        }
    }

    deserializer.deserialize_any(F64OptVisitor)
}
