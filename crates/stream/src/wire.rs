//! Bybit v5 public websocket message types. Prices and quantities
//! arrive as strings; parsing into `Decimal` happens here so the rest
//! of the crate only sees typed events.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use macro_trade_core::market::{Kline, Side, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub op: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl<'a> Request<'a> {
    pub fn subscribe(args: Vec<String>) -> Self {
        Self { op: "subscribe", args }
    }

    pub fn ping() -> Self {
        Self { op: "ping", args: Vec::new() }
    }
}

/// One decoded inbound message.
#[derive(Debug)]
pub enum StreamEvent {
    BookSnapshot(BookUpdate),
    BookDelta(BookUpdate),
    Trades(Vec<Trade>),
    Kline(Kline),
    Pong,
    SubscribeAck { success: bool, ret_msg: Option<String> },
    Ignored,
}

#[derive(Debug)]
pub struct BookUpdate {
    pub symbol: String,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ret_msg: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BookPayload {
    s: String,
    #[serde(default)]
    b: Vec<[String; 2]>,
    #[serde(default)]
    a: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct TradePayload {
    #[serde(rename = "T")]
    ts: i64,
    s: String,
    #[serde(rename = "S")]
    side: String,
    v: String,
    p: String,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    start: i64,
    interval: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
    #[serde(default)]
    confirm: bool,
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn parse_levels(raw: &[[String; 2]]) -> Result<Vec<(Decimal, Decimal)>> {
    raw.iter()
        .map(|[price, qty]| {
            Ok((
                Decimal::from_str(price).with_context(|| format!("bad price {price:?}"))?,
                Decimal::from_str(qty).with_context(|| format!("bad quantity {qty:?}"))?,
            ))
        })
        .collect()
}

/// Decode one raw text frame. Unknown topics decode to `Ignored` rather
/// than erroring so new exchange message types cannot kill the stream.
pub fn decode(text: &str) -> Result<StreamEvent> {
    let envelope: Envelope = serde_json::from_str(text).context("malformed frame")?;

    if let Some(op) = envelope.op.as_deref() {
        return Ok(match op {
            "pong" | "ping" => StreamEvent::Pong,
            "subscribe" => StreamEvent::SubscribeAck {
                success: envelope.success.unwrap_or(false),
                ret_msg: envelope.ret_msg,
            },
            _ => StreamEvent::Ignored,
        });
    }

    let (Some(topic), Some(data)) = (envelope.topic.as_deref(), envelope.data) else {
        return Ok(StreamEvent::Ignored);
    };
    let ts = millis_to_utc(envelope.ts.unwrap_or(0));

    if topic.starts_with("orderbook.") {
        let payload: BookPayload = serde_json::from_value(data).context("orderbook payload")?;
        let update = BookUpdate {
            symbol: payload.s,
            bids: parse_levels(&payload.b)?,
            asks: parse_levels(&payload.a)?,
            timestamp: ts,
        };
        return Ok(match envelope.kind.as_deref() {
            Some("snapshot") => StreamEvent::BookSnapshot(update),
            _ => StreamEvent::BookDelta(update),
        });
    }

    if topic.starts_with("publicTrade.") {
        let payload: Vec<TradePayload> = serde_json::from_value(data).context("trade payload")?;
        let trades = payload
            .into_iter()
            .map(|t| {
                Ok(Trade {
                    symbol: t.s,
                    timestamp: millis_to_utc(t.ts),
                    price: Decimal::from_str(&t.p).context("trade price")?,
                    quantity: Decimal::from_str(&t.v).context("trade quantity")?,
                    side: if t.side == "Sell" { Side::Sell } else { Side::Buy },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(StreamEvent::Trades(trades));
    }

    if topic.starts_with("kline.") {
        let symbol = topic.rsplit('.').next().unwrap_or_default().to_string();
        let payload: Vec<KlinePayload> = serde_json::from_value(data).context("kline payload")?;
        // Only closed candles are published downstream.
        if let Some(k) = payload.into_iter().find(|k| k.confirm) {
            return Ok(StreamEvent::Kline(Kline {
                symbol,
                timestamp: millis_to_utc(k.start),
                open: Decimal::from_str(&k.open).context("kline open")?,
                high: Decimal::from_str(&k.high).context("kline high")?,
                low: Decimal::from_str(&k.low).context("kline low")?,
                close: Decimal::from_str(&k.close).context("kline close")?,
                volume: Decimal::from_str(&k.volume).context("kline volume")?,
                timeframe: k.interval,
            }));
        }
        return Ok(StreamEvent::Ignored);
    }

    Ok(StreamEvent::Ignored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_book_snapshot() {
        let frame = r#"{
            "topic": "orderbook.50.BTCUSDT",
            "type": "snapshot",
            "ts": 1700000000000,
            "data": {"s": "BTCUSDT", "b": [["50000.5", "1.2"]], "a": [["50001", "0.8"]]}
        }"#;
        match decode(frame).unwrap() {
            StreamEvent::BookSnapshot(update) => {
                assert_eq!(update.symbol, "BTCUSDT");
                assert_eq!(update.bids, vec![(dec!(50000.5), dec!(1.2))]);
                assert_eq!(update.asks, vec![(dec!(50001), dec!(0.8))]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_trades_with_sides() {
        let frame = r#"{
            "topic": "publicTrade.BTCUSDT",
            "type": "snapshot",
            "ts": 1700000000000,
            "data": [
                {"T": 1700000000001, "s": "BTCUSDT", "S": "Buy", "v": "0.5", "p": "50000"},
                {"T": 1700000000002, "s": "BTCUSDT", "S": "Sell", "v": "0.2", "p": "49999"}
            ]
        }"#;
        match decode(frame).unwrap() {
            StreamEvent::Trades(trades) => {
                assert_eq!(trades.len(), 2);
                assert_eq!(trades[0].side, Side::Buy);
                assert_eq!(trades[1].side, Side::Sell);
                assert_eq!(trades[1].price, dec!(49999));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unconfirmed_kline_is_ignored() {
        let frame = r#"{
            "topic": "kline.5.BTCUSDT",
            "ts": 1700000000000,
            "data": [{"start": 1700000000000, "interval": "5", "open": "1", "high": "2",
                      "low": "0.5", "close": "1.5", "volume": "10", "confirm": false}]
        }"#;
        assert!(matches!(decode(frame).unwrap(), StreamEvent::Ignored));
    }

    #[test]
    fn pong_and_unknown_topics() {
        assert!(matches!(
            decode(r#"{"op": "pong", "success": true}"#).unwrap(),
            StreamEvent::Pong
        ));
        assert!(matches!(
            decode(r#"{"topic": "tickers.BTCUSDT", "data": {}}"#).unwrap(),
            StreamEvent::Ignored
        ));
    }

    #[test]
    fn subscribe_request_serializes() {
        let req = Request::subscribe(vec!["orderbook.50.BTCUSDT".to_string()]);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"op":"subscribe","args":["orderbook.50.BTCUSDT"]}"#);
        assert_eq!(serde_json::to_string(&Request::ping()).unwrap(), r#"{"op":"ping"}"#);
    }
}
