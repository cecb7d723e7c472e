use crate::backoff::Backoff;
use crate::book::OrderBookState;
use crate::queue::BoundedQueue;
use crate::wire::{self, Request, StreamEvent};
use futures_util::{SinkExt, StreamExt};
use macro_trade_core::config::StreamConfig;
use macro_trade_core::market::{Kline, OrderBook, Trade};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("stream already started")]
    AlreadyStarted,
}

/// Why one connection attempt ended.
enum ConnectionEnd {
    Shutdown,
    Lost,
}

struct Shared {
    symbol: String,
    config: StreamConfig,
    running: AtomicBool,
    book: Mutex<OrderBookState>,
    book_dirty: AtomicBool,
    book_notify: Notify,
    trade_queue: BoundedQueue<Trade>,
    kline_queue: BoundedQueue<Kline>,
    book_tx: Mutex<Option<mpsc::Sender<OrderBook>>>,
    trade_tx: Mutex<Option<mpsc::Sender<Vec<Trade>>>>,
    kline_tx: Mutex<Option<mpsc::Sender<Kline>>>,
    shutdown: Notify,
}

impl Shared {
    fn sender<T: Clone>(slot: &Mutex<Option<mpsc::Sender<T>>>) -> Option<mpsc::Sender<T>> {
        slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Public market-data stream for one symbol. Maintains the order book
/// incrementally and fans decoded events out to registered consumers:
/// the book is published at a throttled cadence only when it changed,
/// trades are delivered in small time-windowed batches, and klines are
/// forwarded one closed candle at a time. Consumers that fall behind
/// lose the oldest data, never the newest.
pub struct MarketStream {
    shared: Arc<Shared>,
    started: AtomicBool,
}

impl MarketStream {
    #[must_use]
    pub fn new(symbol: impl Into<String>, config: StreamConfig) -> Self {
        let queue_capacity = config.queue_capacity;
        Self {
            shared: Arc::new(Shared {
                symbol: symbol.into(),
                config,
                running: AtomicBool::new(false),
                book: Mutex::new(OrderBookState::new()),
                book_dirty: AtomicBool::new(false),
                book_notify: Notify::new(),
                trade_queue: BoundedQueue::new(queue_capacity),
                kline_queue: BoundedQueue::new(queue_capacity),
                book_tx: Mutex::new(None),
                trade_tx: Mutex::new(None),
                kline_tx: Mutex::new(None),
                shutdown: Notify::new(),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Register the order book consumer. Replaces any prior registration.
    pub fn subscribe_orderbook(&self) -> mpsc::Receiver<OrderBook> {
        let (tx, rx) = mpsc::channel(16);
        *self.shared.book_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Register the trade-batch consumer.
    pub fn subscribe_trades(&self) -> mpsc::Receiver<Vec<Trade>> {
        let (tx, rx) = mpsc::channel(64);
        *self.shared.trade_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Register the closed-kline consumer.
    pub fn subscribe_klines(&self) -> mpsc::Receiver<Kline> {
        let (tx, rx) = mpsc::channel(64);
        *self.shared.kline_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Latest materialized book, without waiting for the publisher.
    #[must_use]
    pub fn snapshot(&self) -> OrderBook {
        let book = self.shared.book.lock().unwrap_or_else(|e| e.into_inner());
        book.materialize(&self.shared.symbol, self.shared.config.orderbook_depth)
    }

    /// Spawn the connection loop and publisher tasks.
    pub fn start(&self) -> Result<StreamHandle, StreamError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StreamError::AlreadyStarted);
        }
        self.shared.running.store(true, Ordering::SeqCst);

        let tasks = vec![
            tokio::spawn(run_loop(Arc::clone(&self.shared))),
            tokio::spawn(book_publisher(Arc::clone(&self.shared))),
            tokio::spawn(trade_publisher(Arc::clone(&self.shared))),
            tokio::spawn(kline_publisher(Arc::clone(&self.shared))),
        ];
        info!(symbol = %self.shared.symbol, "market stream started");
        Ok(StreamHandle {
            shared: Arc::clone(&self.shared),
            tasks,
        })
    }
}

/// Owns the spawned tasks; stopping is idempotent.
pub struct StreamHandle {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamHandle {
    /// Trades evicted because a consumer fell behind.
    #[must_use]
    pub fn dropped_trades(&self) -> u64 {
        self.shared.trade_queue.dropped()
    }

    pub fn stop(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!(symbol = %self.shared.symbol, "market stream stopping");
        }
        self.shared.shutdown.notify_waiters();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn topics(symbol: &str, depth: usize) -> Vec<String> {
    vec![
        format!("orderbook.{depth}.{symbol}"),
        format!("publicTrade.{symbol}"),
        format!("kline.5.{symbol}"),
    ]
}

async fn run_loop(shared: Arc<Shared>) {
    let mut backoff = Backoff::new(
        Duration::from_secs_f64(shared.config.reconnect_base_secs),
        Duration::from_secs_f64(shared.config.reconnect_max_secs),
        Duration::from_secs_f64(shared.config.reconnect_jitter_secs),
    );

    while shared.running.load(Ordering::SeqCst) {
        match run_connection(&shared, &mut backoff).await {
            Ok(ConnectionEnd::Shutdown) => return,
            Ok(ConnectionEnd::Lost) => {
                warn!(symbol = %shared.symbol, "connection lost");
            }
            Err(err) => {
                warn!(symbol = %shared.symbol, error = %err, "connection failed");
            }
        }
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }

        let delay = backoff.next_delay();
        info!(
            symbol = %shared.symbol,
            attempt = backoff.attempt(),
            delay_secs = delay.as_secs_f64(),
            "reconnecting"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shared.shutdown.notified() => return,
        }
    }
}

async fn run_connection(
    shared: &Arc<Shared>,
    backoff: &mut Backoff,
) -> Result<ConnectionEnd, StreamError> {
    let connect_timeout = Duration::from_secs(shared.config.connect_timeout_secs);
    let (ws, _) = tokio::time::timeout(connect_timeout, connect_async(&shared.config.ws_url))
        .await
        .map_err(|_| StreamError::ConnectTimeout(connect_timeout))??;
    let (mut sink, mut stream) = ws.split();

    // Stale book levels must not survive a reconnect.
    shared
        .book
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .invalidate();

    let subscribe = Request::subscribe(topics(&shared.symbol, shared.config.orderbook_depth));
    let frame = serde_json::to_string(&subscribe).unwrap_or_default();
    sink.send(Message::Text(frame)).await?;
    backoff.reset();
    info!(symbol = %shared.symbol, url = %shared.config.ws_url, "connected and subscribed");

    let mut ping = tokio::time::interval(Duration::from_secs(shared.config.ping_interval_secs));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping.reset();

    loop {
        tokio::select! {
            () = shared.shutdown.notified() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(ConnectionEnd::Shutdown);
            }
            _ = ping.tick() => {
                let frame = serde_json::to_string(&Request::ping()).unwrap_or_default();
                if sink.send(Message::Text(frame)).await.is_err() {
                    return Ok(ConnectionEnd::Lost);
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_frame(shared, &text),
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return Ok(ConnectionEnd::Lost);
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Lost),
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(symbol = %shared.symbol, error = %err, "read error");
                    return Ok(ConnectionEnd::Lost);
                }
            }
        }
    }
}

fn handle_frame(shared: &Arc<Shared>, text: &str) {
    let event = match wire::decode(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(symbol = %shared.symbol, error = %err, "undecodable frame");
            return;
        }
    };

    match event {
        StreamEvent::BookSnapshot(update) => {
            let mut book = shared.book.lock().unwrap_or_else(|e| e.into_inner());
            book.apply_snapshot(&update.bids, &update.asks, update.timestamp);
            shared.book_dirty.store(true, Ordering::Release);
            shared.book_notify.notify_one();
        }
        StreamEvent::BookDelta(update) => {
            let mut book = shared.book.lock().unwrap_or_else(|e| e.into_inner());
            if book.apply_delta(&update.bids, &update.asks, update.timestamp) {
                shared.book_dirty.store(true, Ordering::Release);
                shared.book_notify.notify_one();
            }
        }
        StreamEvent::Trades(trades) => {
            for trade in trades {
                if shared.trade_queue.push(trade) {
                    debug!(symbol = %shared.symbol, "trade queue full, dropped oldest");
                }
            }
        }
        StreamEvent::Kline(kline) => {
            shared.kline_queue.push(kline);
        }
        StreamEvent::SubscribeAck { success, ret_msg } => {
            if success {
                debug!(symbol = %shared.symbol, "subscription acknowledged");
            } else {
                warn!(symbol = %shared.symbol, reason = ?ret_msg, "subscription rejected");
            }
        }
        StreamEvent::Pong | StreamEvent::Ignored => {}
    }
}

/// Publishes the materialized book as soon as it changes, held to at
/// most the configured rate. Wakes on the dirty notification instead of
/// polling a fixed tick, so a fresh change never waits a full interval.
async fn book_publisher(shared: Arc<Shared>) {
    let min_gap = Duration::from_secs_f64(1.0 / shared.config.orderbook_publish_hz.max(0.01));
    let mut last_publish: Option<tokio::time::Instant> = None;

    loop {
        // The notified future is created before the dirty check so a
        // mark between the check and the await cannot be missed.
        let notified = shared.book_notify.notified();
        if !shared.book_dirty.load(Ordering::Acquire) {
            notified.await;
        }
        if let Some(at) = last_publish {
            tokio::time::sleep_until(at + min_gap).await;
        }
        if !shared.book_dirty.swap(false, Ordering::AcqRel) {
            continue;
        }
        let book = {
            let state = shared.book.lock().unwrap_or_else(|e| e.into_inner());
            state.materialize(&shared.symbol, shared.config.orderbook_depth)
        };
        last_publish = Some(tokio::time::Instant::now());
        if let Some(tx) = Shared::sender(&shared.book_tx) {
            // Latest-wins: a slow consumer just misses this publish.
            let _ = tx.try_send(book);
        }
    }
}

/// Collects trades into batches bounded by the configured time window.
async fn trade_publisher(shared: Arc<Shared>) {
    let window = Duration::from_millis(shared.config.trade_batch_window_ms);

    loop {
        let first = shared.trade_queue.recv().await;
        let mut batch = vec![first];
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, shared.trade_queue.recv()).await {
                Ok(trade) => batch.push(trade),
                Err(_) => break,
            }
        }

        if let Some(tx) = Shared::sender(&shared.trade_tx) {
            if tx.send(batch).await.is_err() {
                *shared.trade_tx.lock().unwrap_or_else(|e| e.into_inner()) = None;
            }
        }
    }
}

async fn kline_publisher(shared: Arc<Shared>) {
    loop {
        let kline = shared.kline_queue.recv().await;
        if let Some(tx) = Shared::sender(&shared.kline_tx) {
            if tx.send(kline).await.is_err() {
                *shared.kline_tx.lock().unwrap_or_else(|e| e.into_inner()) = None;
            }
        }
    }
}
