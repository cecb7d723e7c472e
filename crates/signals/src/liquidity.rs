use chrono::{Timelike, Utc};
use macro_trade_core::config::LiquidityConfig;
use macro_trade_core::liquidity::{LevelKind, LiquidityLevel, LiquidityZone, Session, ZoneSide};
use macro_trade_core::market::{Kline, OrderBook, OrderBookLevel};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

const SESSIONS: [Session; 3] = [Session::Asia, Session::London, Session::NewYork];

const PRIOR_DAY_STRENGTH: f64 = 0.9;
const SESSION_STRENGTH: f64 = 0.7;
const VISIBLE_RANGE_STRENGTH: f64 = 0.6;

/// Price band width used to merge adjacent order-book levels into one
/// zone, as a fraction of price.
const ZONE_BAND_WIDTH: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Tracks the price levels where resting liquidity is expected:
/// session highs/lows, prior-day high/low and the visible-range
/// extremes from kline history, plus imbalance zones recomputed from
/// each order-book snapshot.
#[derive(Debug)]
pub struct LiquidityEngine {
    config: LiquidityConfig,
    klines: VecDeque<Kline>,
    prior_day_high: Option<Decimal>,
    prior_day_low: Option<Decimal>,
    session_highs: [Option<Decimal>; 3],
    session_lows: [Option<Decimal>; 3],
    visible_range_high: Option<Decimal>,
    visible_range_low: Option<Decimal>,
    zones: Vec<LiquidityZone>,
}

/// Nearest levels bracketing a price.
#[derive(Debug, Clone, Serialize)]
pub struct NearestLevels {
    pub above: Option<LiquidityLevel>,
    pub below: Option<LiquidityLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidityStatus {
    pub total_levels: usize,
    pub prior_day_high: Option<Decimal>,
    pub prior_day_low: Option<Decimal>,
    pub visible_range_high: Option<Decimal>,
    pub visible_range_low: Option<Decimal>,
    pub zone_count: usize,
    pub top_zones: Vec<LiquidityZone>,
}

impl LiquidityEngine {
    #[must_use]
    pub fn new(config: LiquidityConfig) -> Self {
        Self {
            klines: VecDeque::with_capacity(config.max_kline_history),
            config,
            prior_day_high: None,
            prior_day_low: None,
            session_highs: [None; 3],
            session_lows: [None; 3],
            visible_range_high: None,
            visible_range_low: None,
            zones: Vec::new(),
        }
    }

    /// Absorb one closed candle and refresh every kline-derived level.
    pub fn add_kline(&mut self, kline: Kline) {
        if self.klines.len() >= self.config.max_kline_history {
            self.klines.pop_front();
        }
        self.update_session_levels(&kline);
        self.klines.push_back(kline);
        self.update_prior_day_levels();
        self.update_visible_range();
    }

    fn update_session_levels(&mut self, kline: &Kline) {
        let Some(session) = session_for_hour(kline.timestamp.hour()) else {
            return;
        };
        let idx = session_index(session);
        let high = &mut self.session_highs[idx];
        if high.map_or(true, |h| kline.high > h) {
            *high = Some(kline.high);
        }
        let low = &mut self.session_lows[idx];
        if low.map_or(true, |l| kline.low < l) {
            *low = Some(kline.low);
        }
    }

    /// Prior-day extremes from hourly history: the 24 candles preceding
    /// the most recent 24.
    fn update_prior_day_levels(&mut self) {
        if self.klines.len() < 48 {
            return;
        }
        let start = self.klines.len() - 48;
        let end = self.klines.len() - 24;
        let yesterday = self.klines.range(start..end);
        self.prior_day_high = yesterday.clone().map(|k| k.high).max();
        self.prior_day_low = yesterday.map(|k| k.low).min();
    }

    fn update_visible_range(&mut self) {
        let window = self.config.visible_range_window;
        if self.klines.len() < window {
            return;
        }
        let recent = self.klines.range(self.klines.len() - window..);
        self.visible_range_high = recent.clone().map(|k| k.high).max();
        self.visible_range_low = recent.map(|k| k.low).min();
    }

    /// Recompute imbalance zones from a fresh order-book snapshot,
    /// replacing the previous set.
    pub fn update_orderbook_zones(&mut self, book: &OrderBook) {
        if book.bids.is_empty() || book.asks.is_empty() {
            return;
        }
        self.zones.clear();
        self.zones.extend(self.find_imbalance_zones(&book.bids, ZoneSide::Bid));
        self.zones.extend(self.find_imbalance_zones(&book.asks, ZoneSide::Ask));
        debug!(zones = self.zones.len(), "order book zones refreshed");
    }

    fn find_imbalance_zones(&self, levels: &[OrderBookLevel], side: ZoneSide) -> Vec<LiquidityZone> {
        let depth = self.config.orderbook_depth_levels.min(levels.len());
        let levels = &levels[..depth];
        if levels.len() < 3 {
            return Vec::new();
        }

        let total: Decimal = levels.iter().map(|l| l.quantity).sum();
        let avg = total / Decimal::from(levels.len());
        if avg <= Decimal::ZERO {
            return Vec::new();
        }

        // Merge adjacent levels within a 0.1% price band, then keep the
        // bands holding disproportionate size.
        let mut zones = Vec::new();
        let mut start = 0;
        while start < levels.len() {
            let anchor = levels[start].price;
            let tolerance = anchor.abs() * ZONE_BAND_WIDTH;
            let mut end = start + 1;
            while end < levels.len() && (levels[end].price - anchor).abs() <= tolerance {
                end += 1;
            }

            let band = &levels[start..end];
            let band_size: Decimal = band.iter().map(|l| l.quantity).sum();
            let ratio = (band_size / avg).to_f64().unwrap_or(0.0);
            if ratio >= self.config.imbalance_threshold {
                let prices: Vec<Decimal> = band.iter().map(|l| l.price).collect();
                zones.push(LiquidityZone {
                    price_low: prices.iter().copied().min().unwrap_or(anchor),
                    price_high: prices.iter().copied().max().unwrap_or(anchor),
                    total_size: band_size,
                    side,
                    imbalance_ratio: ratio,
                    timestamp: Utc::now(),
                });
            }
            start = end;
        }

        zones.sort_by(|a, b| {
            b.imbalance_ratio
                .partial_cmp(&a.imbalance_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        zones.truncate(self.config.max_zones_per_side);
        zones
    }

    /// Materialize all currently-known levels.
    #[must_use]
    pub fn all_levels(&self) -> Vec<LiquidityLevel> {
        let now = Utc::now();
        let mut levels = Vec::new();
        let mut push = |price: Option<Decimal>, kind: LevelKind, strength: f64| {
            if let Some(price) = price {
                levels.push(LiquidityLevel {
                    price,
                    kind,
                    strength,
                    timestamp: now,
                    touched: false,
                    broken: false,
                });
            }
        };

        push(self.prior_day_high, LevelKind::PriorDayHigh, PRIOR_DAY_STRENGTH);
        push(self.prior_day_low, LevelKind::PriorDayLow, PRIOR_DAY_STRENGTH);
        for session in SESSIONS {
            let idx = session_index(session);
            push(
                self.session_highs[idx],
                LevelKind::SessionHigh(session),
                SESSION_STRENGTH,
            );
            push(
                self.session_lows[idx],
                LevelKind::SessionLow(session),
                SESSION_STRENGTH,
            );
        }
        push(
            self.visible_range_high,
            LevelKind::VisibleRangeHigh,
            VISIBLE_RANGE_STRENGTH,
        );
        push(
            self.visible_range_low,
            LevelKind::VisibleRangeLow,
            VISIBLE_RANGE_STRENGTH,
        );

        levels
    }

    /// Nearest level strictly above and strictly below the price.
    #[must_use]
    pub fn nearest(&self, price: Decimal) -> NearestLevels {
        let levels = self.all_levels();
        let above = levels
            .iter()
            .filter(|l| l.price > price)
            .min_by_key(|l| l.price - price)
            .cloned();
        let below = levels
            .iter()
            .filter(|l| l.price < price)
            .min_by_key(|l| price - l.price)
            .cloned();
        NearestLevels { above, below }
    }

    #[must_use]
    pub fn zones(&self) -> &[LiquidityZone] {
        &self.zones
    }

    #[must_use]
    pub fn status(&self) -> LiquidityStatus {
        let levels = self.all_levels();
        let mut top_zones = self.zones.clone();
        top_zones.sort_by(|a, b| {
            b.imbalance_ratio
                .partial_cmp(&a.imbalance_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top_zones.truncate(3);
        LiquidityStatus {
            total_levels: levels.len(),
            prior_day_high: self.prior_day_high,
            prior_day_low: self.prior_day_low,
            visible_range_high: self.visible_range_high,
            visible_range_low: self.visible_range_low,
            zone_count: self.zones.len(),
            top_zones,
        }
    }
}

const fn session_index(session: Session) -> usize {
    match session {
        Session::Asia => 0,
        Session::London => 1,
        Session::NewYork => 2,
    }
}

/// UTC-hour session windows. London and New York overlap 13-16;
/// resolution order gives London precedence there.
fn session_for_hour(hour: u32) -> Option<Session> {
    match hour {
        0..=7 => Some(Session::Asia),
        8..=15 => Some(Session::London),
        16..=20 => Some(Session::NewYork),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use macro_trade_core::market::OrderBookLevel;
    use rust_decimal_macros::dec;

    fn kline_at(hour: u32, high: Decimal, low: Decimal) -> Kline {
        Kline {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap(),
            open: low,
            high,
            low,
            close: high,
            volume: dec!(100),
            timeframe: "60".to_string(),
        }
    }

    #[test]
    fn session_windows() {
        assert_eq!(session_for_hour(0), Some(Session::Asia));
        assert_eq!(session_for_hour(7), Some(Session::Asia));
        assert_eq!(session_for_hour(8), Some(Session::London));
        assert_eq!(session_for_hour(14), Some(Session::London));
        assert_eq!(session_for_hour(16), Some(Session::NewYork));
        assert_eq!(session_for_hour(20), Some(Session::NewYork));
        assert_eq!(session_for_hour(22), None);
    }

    #[test]
    fn session_levels_track_extremes() {
        let mut engine = LiquidityEngine::new(LiquidityConfig::default());
        engine.add_kline(kline_at(2, dec!(105), dec!(95)));
        engine.add_kline(kline_at(3, dec!(110), dec!(98)));

        let levels = engine.all_levels();
        let asia_high = levels
            .iter()
            .find(|l| l.kind == LevelKind::SessionHigh(Session::Asia))
            .unwrap();
        let asia_low = levels
            .iter()
            .find(|l| l.kind == LevelKind::SessionLow(Session::Asia))
            .unwrap();
        assert_eq!(asia_high.price, dec!(110));
        assert_eq!(asia_low.price, dec!(95));
        assert_eq!(asia_high.strength, 0.7);
    }

    #[test]
    fn prior_day_needs_48_hourly_candles() {
        let mut engine = LiquidityEngine::new(LiquidityConfig::default());
        for i in 0..47 {
            engine.add_kline(kline_at(i % 24, dec!(100) + Decimal::from(i), dec!(90)));
        }
        assert!(engine.status().prior_day_high.is_none());

        engine.add_kline(kline_at(23, dec!(100), dec!(90)));
        let status = engine.status();
        assert!(status.prior_day_high.is_some());
        assert!(status.prior_day_low.is_some());
    }

    #[test]
    fn visible_range_covers_last_window() {
        let mut engine = LiquidityEngine::new(LiquidityConfig::default());
        for i in 0..30 {
            let high = dec!(100) + Decimal::from(i);
            engine.add_kline(kline_at(i % 24, high, high - dec!(10)));
        }
        let status = engine.status();
        // Last 20 candles span highs 110..=129 and lows 100..=119.
        assert_eq!(status.visible_range_high, Some(dec!(129)));
        assert_eq!(status.visible_range_low, Some(dec!(100)));
    }

    #[test]
    fn imbalance_zone_detected_on_oversized_level() {
        let mut engine = LiquidityEngine::new(LiquidityConfig::default());
        let mut bids: Vec<OrderBookLevel> = (0..10)
            .map(|i| OrderBookLevel {
                price: dec!(100) - Decimal::from(i),
                quantity: dec!(1),
            })
            .collect();
        bids[4].quantity = dec!(20);
        let book = OrderBook {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            bids,
            asks: vec![OrderBookLevel { price: dec!(101), quantity: dec!(1) }; 5],
        };

        engine.update_orderbook_zones(&book);
        let bid_zones: Vec<_> = engine
            .zones()
            .iter()
            .filter(|z| z.side == ZoneSide::Bid)
            .collect();
        assert!(!bid_zones.is_empty());
        assert_eq!(bid_zones[0].price_low, dec!(96));
        assert!(bid_zones[0].imbalance_ratio > 1.5);
    }

    #[test]
    fn nearest_brackets_price() {
        let mut engine = LiquidityEngine::new(LiquidityConfig::default());
        engine.add_kline(kline_at(2, dec!(110), dec!(90)));

        let nearest = engine.nearest(dec!(100));
        assert_eq!(nearest.above.unwrap().price, dec!(110));
        assert_eq!(nearest.below.unwrap().price, dec!(90));

        let nearest = engine.nearest(dec!(120));
        assert!(nearest.above.is_none());
        assert_eq!(nearest.below.unwrap().price, dec!(110));
    }

    #[test]
    fn no_levels_before_any_kline() {
        let engine = LiquidityEngine::new(LiquidityConfig::default());
        assert!(engine.all_levels().is_empty());
        assert_eq!(engine.status().total_levels, 0);
    }
}
