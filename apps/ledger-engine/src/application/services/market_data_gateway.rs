//! Market Data Gateway
//!
//! Puts the external price source behind retry-with-backoff and a circuit
//! breaker, and keeps the last good price per ticker as a fallback.
//!
//! # Lookup flow
//!
//! 1. Serialize on the ticker, so one ticker's lookups never interleave.
//! 2. Ask the breaker for a permit. No permit: serve the cache or fail fast.
//! 3. Call the source, retrying transient and rate-limited failures. The
//!    half-open probe gets exactly one call.
//! 4. Report the lookup to the breaker as one outcome.
//! 5. On failure, serve the cache (marked stale) or fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{
    MarketDataError, PriceLookupPort, PriceObservation, PriceOrigin, PriceQuote, PriceSourceError,
    PriceSourcePort,
};
use crate::domain::shared::{Clock, Ticker};
use crate::resilience::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics,
    ExponentialBackoffCalculator, RetryPolicy,
};

/// Gateway settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataGatewayConfig {
    /// Retry policy for one lookup.
    pub retry: RetryPolicy,
    /// Breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Oldest cached price served as a fallback (default: 24h).
    pub max_fallback_age: Duration,
}

impl Default for MarketDataGatewayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_fallback_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    quote: PriceQuote,
}

/// Why a lookup could not be answered live.
enum LiveFailure {
    /// Breaker refused the call.
    CircuitOpen,
    /// Calls were made and failed.
    Exhausted {
        attempts: u32,
        last: PriceSourceError,
    },
}

/// Resilient front for a [`PriceSourcePort`].
pub struct MarketDataGateway<P>
where
    P: PriceSourcePort,
{
    source: Arc<P>,
    config: MarketDataGatewayConfig,
    clock: Arc<dyn Clock>,
    breaker: CircuitBreaker,
    cache: RwLock<HashMap<Ticker, CachedPrice>>,
    ticker_gates: Mutex<HashMap<Ticker, Arc<tokio::sync::Mutex<()>>>>,
}

impl<P> std::fmt::Debug for MarketDataGateway<P>
where
    P: PriceSourcePort,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataGateway")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl<P> MarketDataGateway<P>
where
    P: PriceSourcePort,
{
    /// Create a gateway in front of `source`.
    pub fn new(source: Arc<P>, config: MarketDataGatewayConfig, clock: Arc<dyn Clock>) -> Self {
        let breaker = CircuitBreaker::new(
            "market-data",
            config.circuit_breaker.clone(),
            Arc::clone(&clock),
        );
        Self {
            source,
            config,
            clock,
            breaker,
            cache: RwLock::new(HashMap::new()),
            ticker_gates: Mutex::new(HashMap::new()),
        }
    }

    /// Best available price for `ticker`, live or cached.
    pub async fn get_price(&self, ticker: &Ticker) -> Result<PriceObservation, MarketDataError> {
        let gate = self.ticker_gate(ticker);
        let _serialized = gate.lock().await;

        match self.fetch_live(ticker).await {
            Ok(quote) => {
                self.remember(ticker, quote);
                Ok(PriceObservation {
                    ticker: ticker.clone(),
                    price: quote.price,
                    as_of: quote.as_of,
                    origin: PriceOrigin::Live,
                    stale: false,
                })
            }
            Err(failure) => self.fall_back(ticker, failure),
        }
    }

    /// Like [`get_price`](Self::get_price), but fails with
    /// [`MarketDataError::Stale`] when the price is older than `max_age`.
    pub async fn get_price_within(
        &self,
        ticker: &Ticker,
        max_age: Duration,
    ) -> Result<PriceObservation, MarketDataError> {
        let observation = self.get_price(ticker).await?;
        let age = observation.age(self.clock.now());
        if age > max_age {
            tracing::warn!(
                ticker = %ticker,
                age_secs = age.as_secs(),
                max_age_secs = max_age.as_secs(),
                origin = %observation.origin,
                "Rejecting stale price"
            );
            return Err(MarketDataError::Stale {
                ticker: ticker.clone(),
                price: observation.price,
                age,
                max_age,
            });
        }
        Ok(observation)
    }

    /// The cached price for `ticker` without contacting the source.
    #[must_use]
    pub fn cached_price(&self, ticker: &Ticker) -> Option<PriceObservation> {
        self.cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(ticker)
            .map(|cached| PriceObservation {
                ticker: ticker.clone(),
                price: cached.quote.price,
                as_of: cached.quote.as_of,
                origin: PriceOrigin::Cache,
                stale: true,
            })
    }

    /// Breaker metrics.
    #[must_use]
    pub fn breaker_metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    /// The breaker guarding the source.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn ticker_gate(&self, ticker: &Ticker) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self
            .ticker_gates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(gates.entry(ticker.clone()).or_default())
    }

    fn remember(&self, ticker: &Ticker, quote: PriceQuote) {
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(ticker.clone(), CachedPrice { quote });
    }

    /// One logical lookup against the source, reported to the breaker once.
    async fn fetch_live(&self, ticker: &Ticker) -> Result<PriceQuote, LiveFailure> {
        let Some(permit) = self.breaker.try_acquire() else {
            return Err(LiveFailure::CircuitOpen);
        };

        let mut probe = ProbeGuard {
            breaker: &self.breaker,
            armed: permit == CallPermit::Probe,
        };
        let policy = match permit {
            CallPermit::Normal => self.config.retry.clone(),
            CallPermit::Probe => RetryPolicy::no_retry(),
        };

        let outcome = self.call_with_retry(ticker, &policy).await;
        probe.armed = false;
        match outcome {
            Ok(quote) => {
                self.breaker.record_success();
                Ok(quote)
            }
            Err((_, PriceSourceError::NotFound { ticker })) => {
                // The source answered; it is healthy.
                self.breaker.record_success();
                Err(LiveFailure::Exhausted {
                    attempts: 1,
                    last: PriceSourceError::NotFound { ticker },
                })
            }
            Err((attempts, last)) => {
                self.breaker.record_failure();
                Err(LiveFailure::Exhausted { attempts, last })
            }
        }
    }

    async fn call_with_retry(
        &self,
        ticker: &Ticker,
        policy: &RetryPolicy,
    ) -> Result<PriceQuote, (u32, PriceSourceError)> {
        let mut backoff = ExponentialBackoffCalculator::new(policy);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error = match self.source.fetch_price(ticker).await {
                Ok(quote) if quote.price.is_positive() => return Ok(quote),
                Ok(quote) => PriceSourceError::Permanent {
                    message: format!("source quoted non-positive price {}", quote.price),
                },
                Err(error) => error,
            };

            if !error.category().should_retry() {
                return Err((attempts, error));
            }
            let Some(delay) = backoff.next_backoff_or(error.retry_after()) else {
                return Err((attempts, error));
            };

            tracing::warn!(
                ticker = %ticker,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Price lookup failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn fall_back(
        &self,
        ticker: &Ticker,
        failure: LiveFailure,
    ) -> Result<PriceObservation, MarketDataError> {
        if let LiveFailure::Exhausted {
            last: PriceSourceError::NotFound { .. },
            ..
        } = failure
        {
            return Err(MarketDataError::NotFound {
                ticker: ticker.clone(),
            });
        }

        let now = self.clock.now();
        if let Some(observation) = self.cached_price(ticker)
            && observation.age(now) <= self.config.max_fallback_age
        {
            tracing::warn!(
                ticker = %ticker,
                price = %observation.price,
                age_secs = observation.age(now).as_secs(),
                breaker = %self.breaker.state(),
                "Serving cached price"
            );
            return Ok(observation);
        }

        Err(match failure {
            LiveFailure::CircuitOpen => MarketDataError::CircuitOpen {
                ticker: ticker.clone(),
                retry_in: self.breaker.remaining_cooldown(),
            },
            LiveFailure::Exhausted { attempts, last } => MarketDataError::Unavailable {
                ticker: ticker.clone(),
                attempts,
                reason: last.to_string(),
            },
        })
    }
}

/// Hands a half-open probe back to the breaker when the lookup is dropped
/// before its outcome is recorded.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}

#[async_trait]
impl<P> PriceLookupPort for MarketDataGateway<P>
where
    P: PriceSourcePort,
{
    async fn get_price(&self, ticker: &Ticker) -> Result<PriceObservation, MarketDataError> {
        MarketDataGateway::get_price(self, ticker).await
    }
}
