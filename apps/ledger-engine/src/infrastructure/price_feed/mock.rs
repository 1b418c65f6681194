//! Scripted price source for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{PriceQuote, PriceSourceError, PriceSourcePort};
use crate::domain::shared::{Clock, Money, Ticker};

/// Scripted price source.
///
/// Answers from a price table, quoting at the clock's current time. Queued
/// one-shot responses for a ticker take precedence over the table, and
/// [`fail_all`](Self::fail_all) makes every call fail until
/// [`recover`](Self::recover).
pub struct MockPriceSource {
    clock: Arc<dyn Clock>,
    prices: RwLock<HashMap<Ticker, Money>>,
    scripted: RwLock<HashMap<Ticker, VecDeque<Result<Money, PriceSourceError>>>>,
    outage: RwLock<Option<PriceSourceError>>,
    latency: RwLock<Duration>,
    calls: RwLock<HashMap<Ticker, u32>>,
    total_calls: AtomicU32,
}

impl std::fmt::Debug for MockPriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPriceSource")
            .field("total_calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl MockPriceSource {
    /// Create an empty source quoting at `clock`'s time.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            prices: RwLock::new(HashMap::new()),
            scripted: RwLock::new(HashMap::new()),
            outage: RwLock::new(None),
            latency: RwLock::new(Duration::ZERO),
            calls: RwLock::new(HashMap::new()),
            total_calls: AtomicU32::new(0),
        }
    }

    /// Set the standing price for a ticker.
    pub fn set_price(&self, ticker: &Ticker, price: Money) {
        self.prices
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(ticker.clone(), price);
    }

    /// Queue a one-shot answer for a ticker.
    pub fn push_response(&self, ticker: &Ticker, response: Result<Money, PriceSourceError>) {
        self.scripted
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(ticker.clone())
            .or_default()
            .push_back(response);
    }

    /// Queue `times` copies of a failure for a ticker.
    pub fn push_failures(&self, ticker: &Ticker, error: &PriceSourceError, times: usize) {
        for _ in 0..times {
            self.push_response(ticker, Err(error.clone()));
        }
    }

    /// Fail every call with `error`.
    pub fn fail_all(&self, error: PriceSourceError) {
        *self
            .outage
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
    }

    /// End an outage started with [`fail_all`](Self::fail_all).
    pub fn recover(&self) {
        *self
            .outage
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// Delay every answer by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self
            .latency
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = latency;
    }

    /// Total calls received.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Calls received for one ticker.
    #[must_use]
    pub fn calls_for(&self, ticker: &Ticker) -> u32 {
        self.calls
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(ticker)
            .copied()
            .unwrap_or(0)
    }

    fn next_scripted(&self, ticker: &Ticker) -> Option<Result<Money, PriceSourceError>> {
        self.scripted
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(ticker)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl PriceSourcePort for MockPriceSource {
    async fn fetch_price(&self, ticker: &Ticker) -> Result<PriceQuote, PriceSourceError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(ticker.clone())
            .or_insert(0) += 1;

        let latency = *self
            .latency
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let outage = self
            .outage
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(error) = outage {
            return Err(error);
        }

        let price = match self.next_scripted(ticker) {
            Some(response) => response?,
            None => self
                .prices
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(ticker)
                .copied()
                .ok_or_else(|| PriceSourceError::NotFound {
                    ticker: ticker.clone(),
                })?,
        };

        Ok(PriceQuote {
            price,
            as_of: self.clock.now(),
        })
    }
}
