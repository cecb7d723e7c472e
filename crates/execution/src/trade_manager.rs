use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use macro_trade_core::market::Side;
use macro_trade_core::position::{Position, PositionSide, PositionStatus};
use macro_trade_core::signal::{ExecutionSignal, PositionSize, SignalType};
use macro_trade_core::traits::{OrderAck, OrderRequest, OrderRouter};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Provided live router. Real order routing (signing, exchange REST
/// semantics) is a pluggable collaborator; this one refuses every
/// order so a misconfigured live mode cannot trade.
pub struct FailClosedRouter;

#[async_trait]
impl OrderRouter for FailClosedRouter {
    async fn submit_market_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        bail!(
            "live order routing not implemented; refusing {:?} {} {}",
            order.side,
            order.quantity,
            order.symbol
        );
    }

    async fn close_market(&self, symbol: &str, _side: Side, _quantity: Decimal) -> Result<OrderAck> {
        bail!("live order routing not implemented; refusing close on {symbol}");
    }
}

/// A stop or target hit waiting to be executed by the close worker.
/// Produced by the price-tick checks, which never close inline.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitRequest {
    pub position_id: String,
    pub exit_price: Decimal,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    pub open_positions: usize,
    pub closed_positions: usize,
    pub total_trades: usize,
    pub total_pnl: Decimal,
    pub win_rate: f64,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub dry_run: bool,
}

/// Owns the position table and its lifecycle transitions. Positions
/// are never deleted; terminal statuses form the trade history.
/// Construction starts in dry-run, the safe mode.
pub struct TradeManager {
    router: Box<dyn OrderRouter>,
    positions: HashMap<String, Position>,
    position_counter: u64,
    dry_run: bool,
}

impl TradeManager {
    #[must_use]
    pub fn new(router: Box<dyn OrderRouter>) -> Self {
        Self {
            router,
            positions: HashMap::new(),
            position_counter: 0,
            dry_run: true,
        }
    }

    pub fn enable_live_trading(&mut self) {
        warn!("LIVE TRADING ENABLED - orders will be routed");
        self.dry_run = false;
    }

    pub fn disable_live_trading(&mut self) {
        info!("dry-run mode enabled, no orders will be routed");
        self.dry_run = true;
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn next_position_id(&mut self) -> String {
        self.position_counter += 1;
        format!(
            "POS_{}_{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            self.position_counter
        )
    }

    /// Open a position from an approved sizing. Returns `None` on
    /// rejection or placement failure; a failed live placement is kept
    /// in the table with ERROR status.
    pub async fn open_position(
        &mut self,
        signal: &ExecutionSignal,
        size: &PositionSize,
        symbol: &str,
    ) -> Option<Position> {
        if !size.approved {
            warn!(reason = ?size.rejection_reason, "position size not approved");
            return None;
        }

        let (side, order_side) = match signal.signal_type {
            SignalType::EntryLong => (PositionSide::Long, Side::Buy),
            SignalType::EntryShort => (PositionSide::Short, Side::Sell),
            other => {
                error!(signal = ?other, "invalid signal type for opening position");
                return None;
            }
        };

        let mut position = Position {
            id: self.next_position_id(),
            symbol: symbol.to_string(),
            side,
            entry_price: signal.price,
            quantity: size.quantity,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            status: PositionStatus::Pending,
            entry_time: Utc::now(),
            exit_time: None,
            exit_price: None,
            pnl: Decimal::ZERO,
            pnl_percent: 0.0,
            signal_reason: signal.reason.clone(),
            order_ids: Vec::new(),
            error_message: None,
        };

        info!(
            dry_run = self.dry_run,
            id = %position.id,
            %side,
            quantity = %position.quantity,
            entry = %position.entry_price,
            "opening position"
        );

        if self.dry_run {
            position.status = PositionStatus::Open;
            position.order_ids = vec![format!("DRY_RUN_ORDER_{}", position.id)];
            self.positions.insert(position.id.clone(), position.clone());
            return Some(position);
        }

        let request = OrderRequest {
            symbol: symbol.to_string(),
            side: order_side,
            quantity: size.quantity,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
        };
        match self.router.submit_market_order(&request).await {
            Ok(ack) => {
                position.order_ids.push(ack.order_id);
                position.status = PositionStatus::Open;
                self.positions.insert(position.id.clone(), position.clone());
                Some(position)
            }
            Err(err) => {
                error!(id = %position.id, error = %err, "order placement failed");
                position.status = PositionStatus::Error;
                position.error_message = Some(err.to_string());
                self.positions.insert(position.id.clone(), position);
                None
            }
        }
    }

    /// Close an OPEN position at the given price, realizing PnL.
    pub async fn close_position(
        &mut self,
        position_id: &str,
        exit_price: Decimal,
        reason: &str,
    ) -> bool {
        let Some(position) = self.positions.get(position_id) else {
            error!(id = position_id, "position not found");
            return false;
        };
        if position.status != PositionStatus::Open {
            warn!(id = position_id, status = ?position.status, "position is not open");
            return false;
        }

        if !self.dry_run {
            let close_side = match position.side {
                PositionSide::Long => Side::Sell,
                PositionSide::Short => Side::Buy,
            };
            let symbol = position.symbol.clone();
            let quantity = position.quantity;
            if let Err(err) = self.router.close_market(&symbol, close_side, quantity).await {
                error!(id = position_id, error = %err, "close order failed");
                if let Some(position) = self.positions.get_mut(position_id) {
                    position.status = PositionStatus::Error;
                    position.error_message = Some(err.to_string());
                }
                return false;
            }
        }

        let Some(position) = self.positions.get_mut(position_id) else {
            return false;
        };
        let pnl = match position.side {
            PositionSide::Long => (exit_price - position.entry_price) * position.quantity,
            PositionSide::Short => (position.entry_price - exit_price) * position.quantity,
        };
        let notional = position.entry_price * position.quantity;
        let pnl_percent = if notional == Decimal::ZERO {
            0.0
        } else {
            (pnl / notional).to_f64().unwrap_or(0.0) * 100.0
        };

        position.exit_price = Some(exit_price);
        position.exit_time = Some(Utc::now());
        position.pnl = pnl;
        position.pnl_percent = pnl_percent;
        position.status = PositionStatus::Closed;

        info!(
            dry_run = self.dry_run,
            id = position_id,
            %pnl,
            pnl_percent,
            reason,
            "position closed"
        );
        true
    }

    /// Scan OPEN positions for stop hits. Returns exit requests for
    /// the close worker instead of closing inline, so the price path
    /// never blocks and positions are never mutated concurrently.
    #[must_use]
    pub fn check_stop_loss(&self, price: Decimal) -> Vec<ExitRequest> {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .filter_map(|p| {
                let stop = p.stop_loss?;
                let hit = match p.side {
                    PositionSide::Long => price <= stop,
                    PositionSide::Short => price >= stop,
                };
                if hit {
                    warn!(id = %p.id, side = %p.side, %stop, %price, "stop loss hit");
                    Some(ExitRequest {
                        position_id: p.id.clone(),
                        exit_price: stop,
                        reason: "Stop loss hit".to_string(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Scan OPEN positions for target hits.
    #[must_use]
    pub fn check_take_profit(&self, price: Decimal) -> Vec<ExitRequest> {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .filter_map(|p| {
                let target = p.take_profit?;
                let hit = match p.side {
                    PositionSide::Long => price >= target,
                    PositionSide::Short => price <= target,
                };
                if hit {
                    info!(id = %p.id, side = %p.side, %target, %price, "take profit hit");
                    Some(ExitRequest {
                        position_id: p.id.clone(),
                        exit_price: target,
                        reason: "Take profit hit".to_string(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn closed_positions(&self) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Closed)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> PositionSummary {
        let open = self.open_positions().len();
        let closed = self.closed_positions();
        let total_pnl: Decimal = closed.iter().map(|p| p.pnl).sum();
        let winning = closed.iter().filter(|p| p.pnl > Decimal::ZERO).count();
        let losing = closed.iter().filter(|p| p.pnl < Decimal::ZERO).count();
        let win_rate = if closed.is_empty() {
            0.0
        } else {
            winning as f64 / closed.len() as f64 * 100.0
        };

        PositionSummary {
            open_positions: open,
            closed_positions: closed.len(),
            total_trades: self.positions.len(),
            total_pnl,
            win_rate,
            winning_trades: winning,
            losing_trades: losing,
            dry_run: self.dry_run,
        }
    }
}
