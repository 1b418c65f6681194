//! Execute Trade Use Case
//!
//! The single write path into a portfolio. Every change runs the same loop:
//!
//! 1. Load the committed state.
//! 2. Validate the change against it and apply the ledger transition.
//! 3. Commit with the loaded sequence as the expected prior sequence.
//! 4. On conflict or lock timeout, back off and start over from 1.
//!
//! Validation is repeated on every pass because cash and holdings may have
//! moved underneath us. Nothing is written unless step 3 succeeds.

use std::sync::Arc;
use std::time::Duration;

use crate::application::dto::{TradeRequest, TradeResult};
use crate::application::ports::{MarketDataError, PriceLookupPort, StoragePort};
use crate::application::services::{CommitResult, PersistenceError, PersistenceManager};
use crate::domain::ledger::{
    PortfolioState, TradeJournalEntry, Transition, apply_buy, apply_deposit, apply_sell,
    apply_stop_loss_exit, apply_stop_update,
};
use crate::domain::shared::{Clock, Money, PortfolioId, Ticker, Timestamp};
use crate::domain::stop_enforcement::TriggeredExit;
use crate::domain::validation::{OrderSide, Validator};
use crate::error::EngineError;
use crate::resilience::{ExponentialBackoffCalculator, RetryPolicy};

/// Trade executor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeExecutorConfig {
    /// Backoff between attempts after a conflict or lock timeout. The loop
    /// makes `max_retries + 1` attempts (default: 3).
    pub conflict_retry: RetryPolicy,
    /// Oldest looked-up price a trade may execute at (default: 15 minutes).
    pub max_price_age: Duration,
}

impl Default for TradeExecutorConfig {
    fn default() -> Self {
        Self {
            conflict_retry: RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(25),
                max_backoff: Duration::from_millis(250),
                backoff_multiplier: 2.0,
                jitter_factor: 0.5,
            },
            max_price_age: Duration::from_secs(15 * 60),
        }
    }
}

/// Use case for applying trades and other changes to a portfolio.
pub struct TradeExecutor<S, L>
where
    S: StoragePort + 'static,
    L: PriceLookupPort,
{
    persistence: Arc<PersistenceManager<S>>,
    prices: Arc<L>,
    validator: Validator,
    config: TradeExecutorConfig,
    clock: Arc<dyn Clock>,
}

impl<S, L> std::fmt::Debug for TradeExecutor<S, L>
where
    S: StoragePort + 'static,
    L: PriceLookupPort,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeExecutor")
            .field("validator", &self.validator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, L> TradeExecutor<S, L>
where
    S: StoragePort + 'static,
    L: PriceLookupPort,
{
    /// Create a new TradeExecutor.
    pub fn new(
        persistence: Arc<PersistenceManager<S>>,
        prices: Arc<L>,
        validator: Validator,
        config: TradeExecutorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistence,
            prices,
            validator,
            config,
            clock,
        }
    }

    /// Settings in force.
    #[must_use]
    pub const fn config(&self) -> &TradeExecutorConfig {
        &self.config
    }

    /// Create a portfolio holding `starting_cash`.
    #[tracing::instrument(skip_all, fields(portfolio_id = %portfolio_id))]
    pub async fn create_portfolio(
        &self,
        portfolio_id: &PortfolioId,
        starting_cash: Money,
    ) -> Result<PortfolioState, EngineError> {
        Ok(self
            .persistence
            .create_portfolio(portfolio_id, starting_cash)
            .await?)
    }

    /// Current committed state.
    pub async fn get_state(&self, portfolio_id: &PortfolioId) -> Result<PortfolioState, EngineError> {
        Ok(self.persistence.load(portfolio_id).await?)
    }

    /// Execute a buy or sell.
    ///
    /// Input that is malformed regardless of the portfolio is refused before
    /// any price lookup. A missing price is looked up once and reused across
    /// conflict retries.
    #[tracing::instrument(
        skip_all,
        fields(
            portfolio_id = %request.portfolio_id,
            ticker = %request.ticker,
            side = %request.side,
            shares = %request.shares,
        )
    )]
    pub async fn execute(&self, request: TradeRequest) -> Result<TradeResult, EngineError> {
        let proposal = request.to_proposal();
        let ticker = self.validator.validate_request_shape(&proposal)?;
        let proposal = match proposal.price {
            Some(_) => proposal,
            None => {
                let price = self.resolve_price(&ticker).await?;
                proposal.priced(price)
            }
        };

        let outcome = self
            .run(&request.portfolio_id, |state, at| {
                let trade = self.validator.validate(&proposal, state)?;
                let transition = match trade.side {
                    OrderSide::Buy => apply_buy(
                        state,
                        &trade.ticker,
                        trade.shares,
                        trade.price,
                        trade.stop_loss,
                        at,
                    )?,
                    OrderSide::Sell => {
                        apply_sell(state, &trade.ticker, trade.shares, trade.price, at)?
                    }
                };
                Ok(transition)
            })
            .await;

        report("Trade", &request.portfolio_id, &outcome);
        outcome
    }

    /// Sell the whole position flagged by a stop-loss scan.
    ///
    /// The trigger price is a raw quote, so it is rounded to execution
    /// precision first. The stop is then checked again against the committed
    /// state, so an exit whose stop was lowered or cleared after the scan is
    /// refused.
    #[tracing::instrument(
        skip_all,
        fields(portfolio_id = %portfolio_id, ticker = %exit.ticker, price = %exit.trigger_price)
    )]
    pub async fn execute_stop_exit(
        &self,
        portfolio_id: &PortfolioId,
        exit: &TriggeredExit,
    ) -> Result<TradeResult, EngineError> {
        let price = self
            .validator
            .check_price(Some(self.validator.quantize_price(exit.trigger_price)))?;

        let outcome = self
            .run(portfolio_id, |state, at| {
                let Some(position) = state.position(&exit.ticker) else {
                    return Err(EngineError::NoPosition {
                        ticker: exit.ticker.clone(),
                    });
                };
                if !position.stop_breached(price) {
                    return Err(EngineError::StopNotBreached {
                        ticker: exit.ticker.clone(),
                        price,
                        stop_loss: position.stop_loss,
                    });
                }
                Ok(apply_stop_loss_exit(state, &exit.ticker, price, at)?)
            })
            .await;

        report("Stop exit", portfolio_id, &outcome);
        outcome
    }

    /// Add cash.
    #[tracing::instrument(skip_all, fields(portfolio_id = %portfolio_id, amount = %amount))]
    pub async fn deposit(
        &self,
        portfolio_id: &PortfolioId,
        amount: Money,
    ) -> Result<TradeResult, EngineError> {
        self.validator.validate_deposit(amount)?;
        let outcome = self
            .run(portfolio_id, |state, at| Ok(apply_deposit(state, amount, at)?))
            .await;
        report("Deposit", portfolio_id, &outcome);
        outcome
    }

    /// Set (`Some`) or clear (`None`) the stop-loss on a held position.
    #[tracing::instrument(skip_all, fields(portfolio_id = %portfolio_id, ticker = %ticker))]
    pub async fn set_stop_loss(
        &self,
        portfolio_id: &PortfolioId,
        ticker: &str,
        stop_loss: Option<Money>,
    ) -> Result<TradeResult, EngineError> {
        let ticker = self.validator.validate_stop_update(ticker, stop_loss)?;
        let outcome = self
            .run(portfolio_id, |state, at| {
                Ok(apply_stop_update(state, &ticker, stop_loss, at)?)
            })
            .await;
        report("Stop update", portfolio_id, &outcome);
        outcome
    }

    async fn resolve_price(&self, ticker: &Ticker) -> Result<Money, EngineError> {
        let observation = self.prices.get_price(ticker).await?;
        let age = observation.age(self.clock.now());
        if age > self.config.max_price_age {
            tracing::warn!(
                ticker = %ticker,
                age_secs = age.as_secs(),
                origin = %observation.origin,
                "Refusing to execute at a stale price"
            );
            return Err(MarketDataError::Stale {
                ticker: ticker.clone(),
                price: observation.price,
                age,
                max_age: self.config.max_price_age,
            }
            .into());
        }

        let price = self.validator.quantize_price(observation.price);
        tracing::debug!(
            ticker = %ticker,
            price = %price,
            origin = %observation.origin,
            stale = observation.stale,
            "Resolved execution price"
        );
        Ok(price)
    }

    /// Load, plan and commit until the commit lands or attempts run out.
    async fn run<F>(&self, portfolio_id: &PortfolioId, mut plan: F) -> Result<TradeResult, EngineError>
    where
        F: FnMut(&PortfolioState, Timestamp) -> Result<Transition, EngineError>,
    {
        let mut backoff = ExponentialBackoffCalculator::new(&self.config.conflict_retry);
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            let state = self.persistence.load(portfolio_id).await?;
            let (next, entry) = plan(&state, self.clock.now())?;

            let error = match self
                .commit(portfolio_id, state.sequence(), next.clone(), entry.clone())
                .await?
            {
                Ok(commit) => {
                    return Ok(TradeResult::committed(&next, entry, commit.snapshot_taken));
                }
                Err(e) if is_contention(&e) => e,
                Err(e) => return Err(e.into()),
            };

            let Some(delay) = backoff.next_backoff() else {
                return Err(match error {
                    PersistenceError::Conflict { portfolio_id, .. } => EngineError::Conflict {
                        portfolio_id,
                        attempts,
                    },
                    other => other.into(),
                });
            };
            tracing::warn!(
                portfolio_id = %portfolio_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Contention on commit, reloading and retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Run the commit on its own task so it completes even if the caller
    /// stops waiting.
    async fn commit(
        &self,
        portfolio_id: &PortfolioId,
        prior_sequence: u64,
        next: PortfolioState,
        entry: TradeJournalEntry,
    ) -> Result<Result<CommitResult, PersistenceError>, EngineError> {
        let persistence = Arc::clone(&self.persistence);
        let portfolio_id = portfolio_id.clone();
        tokio::spawn(async move {
            persistence
                .commit(&portfolio_id, prior_sequence, &next, &entry)
                .await
        })
        .await
        .map_err(|e| EngineError::Internal(format!("commit task failed: {e}")))
    }
}

const fn is_contention(error: &PersistenceError) -> bool {
    matches!(
        error,
        PersistenceError::Conflict { .. }
            | PersistenceError::Storage(crate::application::ports::StorageError::LockTimeout { .. })
    )
}

fn report(operation: &str, portfolio_id: &PortfolioId, outcome: &Result<TradeResult, EngineError>) {
    match outcome {
        Ok(result) => tracing::info!(
            portfolio_id = %portfolio_id,
            sequence = result.sequence_number,
            action = %result.journal_entry.action,
            cash = %result.new_cash_balance,
            "{operation} committed"
        ),
        Err(e) if e.is_rejection() => tracing::info!(
            portfolio_id = %portfolio_id,
            code = e.code(),
            error = %e,
            "{operation} rejected"
        ),
        Err(e) => tracing::error!(
            portfolio_id = %portfolio_id,
            code = e.code(),
            error = %e,
            "{operation} not confirmed"
        ),
    }
}
