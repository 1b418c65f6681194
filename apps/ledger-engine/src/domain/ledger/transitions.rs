//! Pure ledger transitions.
//!
//! Each function reads a state and returns the next state plus the journal
//! entry describing the step. Inputs are never mutated, so the same call on
//! the same state always yields the same result; replay depends on this.

use super::{LedgerError, PortfolioState, Position, TradeAction, TradeJournalEntry};
use crate::domain::shared::{Money, Quantity, Ticker, Timestamp};

/// A new state and the journal entry that produced it.
pub type Transition = (PortfolioState, TradeJournalEntry);

fn ensure_positive_shares(shares: Quantity) -> Result<(), LedgerError> {
    if shares.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::NonPositive {
            field: "shares",
            value: shares.to_string(),
        })
    }
}

fn ensure_positive_money(field: &'static str, value: Money) -> Result<(), LedgerError> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::NonPositive {
            field,
            value: value.to_string(),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    state: &PortfolioState,
    action: TradeAction,
    ticker: Option<&Ticker>,
    shares: Quantity,
    price: Money,
    stop_loss: Option<Money>,
    cash_delta: Money,
    realized_pnl: Option<Money>,
    at: Timestamp,
) -> TradeJournalEntry {
    TradeJournalEntry {
        sequence: state.sequence() + 1,
        portfolio_id: state.portfolio_id().clone(),
        action,
        ticker: ticker.cloned(),
        shares,
        price,
        stop_loss,
        cash_delta,
        cash_after: state.cash() + cash_delta,
        realized_pnl,
        executed_at: at,
    }
}

/// Buy `shares` of `ticker` at `price`.
///
/// Opens the position or grows it at a weighted average cost. A supplied
/// `stop_loss` replaces the position's stop; `None` keeps the existing one.
pub fn apply_buy(
    state: &PortfolioState,
    ticker: &Ticker,
    shares: Quantity,
    price: Money,
    stop_loss: Option<Money>,
    at: Timestamp,
) -> Result<Transition, LedgerError> {
    ensure_positive_shares(shares)?;
    ensure_positive_money("price", price)?;

    let cost = price * shares.amount();
    if cost > state.cash() {
        return Err(LedgerError::InsufficientCash {
            required: cost,
            available: state.cash(),
        });
    }

    let position = match state.position(ticker) {
        Some(existing) => {
            let grown = existing.accumulate(shares, price);
            Position {
                stop_loss: stop_loss.or(existing.stop_loss),
                ..grown
            }
        }
        None => Position {
            ticker: ticker.clone(),
            shares,
            average_cost: price,
            stop_loss,
            opened_at: at,
        },
    };

    let journal = entry(
        state,
        TradeAction::Buy,
        Some(ticker),
        shares,
        price,
        position.stop_loss,
        -cost,
        None,
        at,
    );
    let next = state.advance(state.cash() - cost, ticker, Some(position), at);
    Ok((next, journal))
}

fn sell(
    state: &PortfolioState,
    action: TradeAction,
    ticker: &Ticker,
    shares: Quantity,
    price: Money,
    at: Timestamp,
) -> Result<Transition, LedgerError> {
    let held = state.position(ticker).map_or(Quantity::ZERO, |p| p.shares);
    let Some(existing) = state.position(ticker).filter(|_| shares <= held) else {
        return Err(LedgerError::InsufficientShares {
            ticker: ticker.clone(),
            requested: shares,
            held,
        });
    };

    let proceeds = price * shares.amount();
    let realized = (price - existing.average_cost) * shares.amount();
    let remaining = existing.shares - shares;
    let position = (!remaining.is_zero()).then(|| Position {
        shares: remaining,
        ..existing.clone()
    });

    let journal = entry(
        state,
        action,
        Some(ticker),
        shares,
        price,
        position.as_ref().and_then(|p| p.stop_loss),
        proceeds,
        Some(realized),
        at,
    );
    let next = state.advance(state.cash() + proceeds, ticker, position, at);
    Ok((next, journal))
}

/// Sell `shares` of `ticker` at `price`.
///
/// The average cost of what remains is unchanged; the position is removed
/// when no shares remain.
pub fn apply_sell(
    state: &PortfolioState,
    ticker: &Ticker,
    shares: Quantity,
    price: Money,
    at: Timestamp,
) -> Result<Transition, LedgerError> {
    ensure_positive_shares(shares)?;
    ensure_positive_money("price", price)?;
    sell(state, TradeAction::Sell, ticker, shares, price, at)
}

/// Exit the whole `ticker` position at `exit_price`.
pub fn apply_stop_loss_exit(
    state: &PortfolioState,
    ticker: &Ticker,
    exit_price: Money,
    at: Timestamp,
) -> Result<Transition, LedgerError> {
    ensure_positive_money("exit price", exit_price)?;
    let Some(position) = state.position(ticker) else {
        return Err(LedgerError::NoPosition {
            ticker: ticker.clone(),
        });
    };
    sell(
        state,
        TradeAction::StopExit,
        ticker,
        position.shares,
        exit_price,
        at,
    )
}

/// Add `amount` of cash.
pub fn apply_deposit(
    state: &PortfolioState,
    amount: Money,
    at: Timestamp,
) -> Result<Transition, LedgerError> {
    ensure_positive_money("deposit", amount)?;
    let journal = entry(
        state,
        TradeAction::Deposit,
        None,
        Quantity::ZERO,
        Money::ZERO,
        None,
        amount,
        None,
        at,
    );
    Ok((state.advance_cash(state.cash() + amount, at), journal))
}

/// Set or clear the stop-loss on the `ticker` position.
pub fn apply_stop_update(
    state: &PortfolioState,
    ticker: &Ticker,
    stop_loss: Option<Money>,
    at: Timestamp,
) -> Result<Transition, LedgerError> {
    if let Some(stop) = stop_loss {
        ensure_positive_money("stop loss", stop)?;
    }
    let Some(existing) = state.position(ticker) else {
        return Err(LedgerError::NoPosition {
            ticker: ticker.clone(),
        });
    };
    let position = Position {
        stop_loss,
        ..existing.clone()
    };
    let journal = entry(
        state,
        TradeAction::StopUpdate,
        Some(ticker),
        Quantity::ZERO,
        Money::ZERO,
        stop_loss,
        Money::ZERO,
        None,
        at,
    );
    let next = state.advance(state.cash(), ticker, Some(position), at);
    Ok((next, journal))
}
