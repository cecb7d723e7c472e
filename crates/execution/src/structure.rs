use macro_trade_core::market::Kline;
use rust_decimal::Decimal;
use serde::Serialize;

/// Swing lists are capped; older extremes stop mattering once price
/// has moved past them.
const MAX_SWINGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructureTrend {
    Bullish,
    Bearish,
    Neutral,
}

/// Market structure derived from kline history: local swing extremes
/// and the trend they imply. Recomputed from the full window on each
/// update so stale swings never linger.
#[derive(Debug)]
pub struct MarketStructure {
    swing_highs: Vec<Decimal>,
    swing_lows: Vec<Decimal>,
    trend: StructureTrend,
}

impl Default for MarketStructure {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStructure {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            swing_highs: Vec::new(),
            swing_lows: Vec::new(),
            trend: StructureTrend::Neutral,
        }
    }

    /// Rebuild swings from the kline window. A swing high is a candle
    /// whose high exceeds both neighbors; swing lows mirror that.
    pub fn update(&mut self, klines: &[Kline]) {
        self.swing_highs.clear();
        self.swing_lows.clear();

        if klines.len() >= 3 {
            for window in klines.windows(3) {
                let [prev, current, next] = window else { continue };
                if current.high > prev.high && current.high > next.high {
                    self.swing_highs.push(current.high);
                }
                if current.low < prev.low && current.low < next.low {
                    self.swing_lows.push(current.low);
                }
            }
        }

        if self.swing_highs.len() > MAX_SWINGS {
            self.swing_highs.drain(..self.swing_highs.len() - MAX_SWINGS);
        }
        if self.swing_lows.len() > MAX_SWINGS {
            self.swing_lows.drain(..self.swing_lows.len() - MAX_SWINGS);
        }

        self.trend = self.classify();
    }

    /// Higher highs plus higher lows read bullish, lower plus lower
    /// bearish, anything mixed neutral.
    fn classify(&self) -> StructureTrend {
        let (Some(highs), Some(lows)) = (last_two(&self.swing_highs), last_two(&self.swing_lows))
        else {
            return StructureTrend::Neutral;
        };
        if highs.1 > highs.0 && lows.1 > lows.0 {
            StructureTrend::Bullish
        } else if highs.1 < highs.0 && lows.1 < lows.0 {
            StructureTrend::Bearish
        } else {
            StructureTrend::Neutral
        }
    }

    #[must_use]
    pub const fn trend(&self) -> StructureTrend {
        self.trend
    }

    #[must_use]
    pub fn swing_highs(&self) -> &[Decimal] {
        &self.swing_highs
    }

    #[must_use]
    pub fn swing_lows(&self) -> &[Decimal] {
        &self.swing_lows
    }

    /// Max of the last two swing highs, the level a break must clear.
    #[must_use]
    pub fn recent_high(&self) -> Option<Decimal> {
        self.swing_highs
            .iter()
            .rev()
            .take(2)
            .copied()
            .max()
    }

    /// Min of the last two swing lows.
    #[must_use]
    pub fn recent_low(&self) -> Option<Decimal> {
        self.swing_lows.iter().rev().take(2).copied().min()
    }
}

fn last_two(values: &[Decimal]) -> Option<(Decimal, Decimal)> {
    if values.len() < 2 {
        return None;
    }
    Some((values[values.len() - 2], values[values.len() - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn kline(high: Decimal, low: Decimal) -> Kline {
        Kline {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            open: low,
            high,
            low,
            close: (high + low) / dec!(2),
            volume: dec!(1),
            timeframe: "5".to_string(),
        }
    }

    /// Zigzag where each peak and each trough steps by `step`.
    fn zigzag(start: Decimal, step: Decimal, cycles: usize) -> Vec<Kline> {
        let mut klines = Vec::new();
        for i in 0..cycles {
            let base = start + step * Decimal::from(i as i64);
            klines.push(kline(base, base - dec!(5)));
            klines.push(kline(base + dec!(10), base + dec!(5)));
            klines.push(kline(base, base - dec!(5)));
        }
        klines
    }

    #[test]
    fn too_few_klines_is_neutral() {
        let mut structure = MarketStructure::new();
        structure.update(&[kline(dec!(100), dec!(90)), kline(dec!(101), dec!(91))]);
        assert_eq!(structure.trend(), StructureTrend::Neutral);
        assert!(structure.swing_highs().is_empty());
    }

    #[test]
    fn rising_swings_read_bullish() {
        let mut structure = MarketStructure::new();
        structure.update(&zigzag(dec!(100), dec!(10), 3));
        assert_eq!(structure.trend(), StructureTrend::Bullish);
        assert!(structure.swing_highs().len() >= 2);
    }

    #[test]
    fn falling_swings_read_bearish() {
        let mut structure = MarketStructure::new();
        structure.update(&zigzag(dec!(200), dec!(-10), 3));
        assert_eq!(structure.trend(), StructureTrend::Bearish);
    }

    #[test]
    fn swings_are_capped() {
        let mut structure = MarketStructure::new();
        structure.update(&zigzag(dec!(100), dec!(2), 20));
        assert!(structure.swing_highs().len() <= MAX_SWINGS);
        assert!(structure.swing_lows().len() <= MAX_SWINGS);
    }

    #[test]
    fn update_is_idempotent() {
        // Recomputing from the same window must not duplicate swings.
        let klines = zigzag(dec!(100), dec!(10), 3);
        let mut structure = MarketStructure::new();
        structure.update(&klines);
        let first = structure.swing_highs().to_vec();
        structure.update(&klines);
        assert_eq!(structure.swing_highs(), first.as_slice());
    }

    #[test]
    fn recent_extremes() {
        let mut structure = MarketStructure::new();
        structure.update(&zigzag(dec!(100), dec!(10), 3));
        let high = structure.recent_high().unwrap();
        let low = structure.recent_low().unwrap();
        assert!(high > low);
        assert_eq!(high, dec!(130));
    }
}
