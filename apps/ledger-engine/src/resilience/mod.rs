//! Resilience patterns for external service calls.
//!
//! This module provides the circuit breaker and the retry/backoff policy
//! used around the market data source and the commit retry loop.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState,
};
pub use retry::{ErrorCategory, ExponentialBackoffCalculator, RetryPolicy};
