use chrono::{DateTime, Utc};
use macro_trade_core::market::{OrderBook, OrderBookLevel};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Incrementally maintained order book. Snapshots replace both sides;
/// deltas upsert levels and remove them at zero quantity. Deltas that
/// arrive before the first snapshot are ignored.
#[derive(Debug, Default)]
pub struct OrderBookState {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update: Option<DateTime<Utc>>,
    has_snapshot: bool,
}

impl OrderBookState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_snapshot(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        timestamp: DateTime<Utc>,
    ) {
        self.bids.clear();
        self.asks.clear();
        for &(price, qty) in bids {
            if qty > Decimal::ZERO {
                self.bids.insert(price, qty);
            }
        }
        for &(price, qty) in asks {
            if qty > Decimal::ZERO {
                self.asks.insert(price, qty);
            }
        }
        self.last_update = Some(timestamp);
        self.has_snapshot = true;
    }

    /// Returns false when the delta was discarded because no snapshot
    /// has been seen since the last (re)connect.
    pub fn apply_delta(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        timestamp: DateTime<Utc>,
    ) -> bool {
        if !self.has_snapshot {
            return false;
        }
        for &(price, qty) in bids {
            if qty > Decimal::ZERO {
                self.bids.insert(price, qty);
            } else {
                self.bids.remove(&price);
            }
        }
        for &(price, qty) in asks {
            if qty > Decimal::ZERO {
                self.asks.insert(price, qty);
            } else {
                self.asks.remove(&price);
            }
        }
        self.last_update = Some(timestamp);
        true
    }

    /// Forget everything; the next delta is ignored until a fresh
    /// snapshot arrives. Called on reconnect.
    pub fn invalidate(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.has_snapshot = false;
    }

    #[must_use]
    pub const fn has_snapshot(&self) -> bool {
        self.has_snapshot
    }

    /// Top-N view with bids descending and asks ascending.
    #[must_use]
    pub fn materialize(&self, symbol: &str, depth: usize) -> OrderBook {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&price, &quantity)| OrderBookLevel { price, quantity })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(&price, &quantity)| OrderBookLevel { price, quantity })
            .collect();
        OrderBook {
            symbol: symbol.to_string(),
            timestamp: self.last_update.unwrap_or_else(Utc::now),
            bids,
            asks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn levels(pairs: &[(i64, i64)]) -> Vec<(Decimal, Decimal)> {
        pairs
            .iter()
            .map(|&(p, q)| (Decimal::from(p), Decimal::from(q)))
            .collect()
    }

    #[test]
    fn snapshot_then_materialize_is_sorted() {
        let mut state = OrderBookState::new();
        state.apply_snapshot(
            &levels(&[(99, 1), (101, 2), (100, 3)]),
            &levels(&[(103, 1), (102, 2)]),
            Utc::now(),
        );

        let book = state.materialize("BTCUSDT", 50);
        let bid_prices: Vec<_> = book.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<_> = book.asks.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![dec!(101), dec!(100), dec!(99)]);
        assert_eq!(ask_prices, vec![dec!(102), dec!(103)]);
    }

    #[test]
    fn delta_before_snapshot_is_ignored() {
        let mut state = OrderBookState::new();
        assert!(!state.apply_delta(&levels(&[(100, 1)]), &[], Utc::now()));
        assert!(state.materialize("BTCUSDT", 50).bids.is_empty());
    }

    #[test]
    fn zero_quantity_delta_removes_level() {
        let mut state = OrderBookState::new();
        state.apply_snapshot(&levels(&[(100, 5), (99, 2)]), &[], Utc::now());
        assert!(state.apply_delta(&levels(&[(100, 0)]), &[], Utc::now()));

        let book = state.materialize("BTCUSDT", 50);
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.best_bid().unwrap().price, dec!(99));
    }

    #[test]
    fn materialize_respects_depth() {
        let mut state = OrderBookState::new();
        let bids: Vec<_> = (1..=100).map(|p| (Decimal::from(p), dec!(1))).collect();
        state.apply_snapshot(&bids, &[], Utc::now());

        let book = state.materialize("BTCUSDT", 10);
        assert_eq!(book.bids.len(), 10);
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
    }

    #[test]
    fn invalidate_requires_fresh_snapshot() {
        let mut state = OrderBookState::new();
        state.apply_snapshot(&levels(&[(100, 1)]), &[], Utc::now());
        state.invalidate();
        assert!(!state.apply_delta(&levels(&[(101, 1)]), &[], Utc::now()));
        state.apply_snapshot(&levels(&[(102, 1)]), &[], Utc::now());
        assert!(state.apply_delta(&levels(&[(103, 1)]), &[], Utc::now()));
    }
}
