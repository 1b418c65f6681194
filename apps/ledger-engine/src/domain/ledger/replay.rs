//! Journal replay.
//!
//! Rebuilds state by re-running the transition each entry records and
//! checking the recomputed entry matches the recorded one exactly.

use super::transitions::{
    apply_buy, apply_deposit, apply_sell, apply_stop_loss_exit, apply_stop_update,
};
use super::{LedgerError, PortfolioState, TradeAction, TradeJournalEntry};
use crate::domain::shared::Ticker;

fn mismatch(entry: &TradeJournalEntry, reason: impl Into<String>) -> LedgerError {
    LedgerError::ReplayMismatch {
        sequence: entry.sequence,
        action: entry.action,
        reason: reason.into(),
    }
}

fn ticker_of(entry: &TradeJournalEntry) -> Result<&Ticker, LedgerError> {
    entry
        .ticker
        .as_ref()
        .ok_or_else(|| mismatch(entry, "entry has no ticker"))
}

fn describe_difference(recorded: &TradeJournalEntry, recomputed: &TradeJournalEntry) -> String {
    if recorded.portfolio_id != recomputed.portfolio_id {
        return format!(
            "portfolio {} recorded, {} expected",
            recorded.portfolio_id, recomputed.portfolio_id
        );
    }
    if recorded.shares != recomputed.shares {
        return format!(
            "shares {} recorded, {} recomputed",
            recorded.shares, recomputed.shares
        );
    }
    if recorded.cash_delta != recomputed.cash_delta {
        return format!(
            "cash delta {} recorded, {} recomputed",
            recorded.cash_delta, recomputed.cash_delta
        );
    }
    if recorded.cash_after != recomputed.cash_after {
        return format!(
            "cash after {} recorded, {} recomputed",
            recorded.cash_after, recomputed.cash_after
        );
    }
    "recorded entry differs from recomputed entry".to_string()
}

/// Fold one journal entry into `state`.
pub fn apply_entry(
    state: &PortfolioState,
    entry: &TradeJournalEntry,
) -> Result<PortfolioState, LedgerError> {
    let expected = state.sequence() + 1;
    if entry.sequence != expected {
        return Err(LedgerError::SequenceGap {
            expected,
            found: entry.sequence,
        });
    }

    let at = entry.executed_at;
    let outcome = match entry.action {
        TradeAction::Buy => apply_buy(
            state,
            ticker_of(entry)?,
            entry.shares,
            entry.price,
            entry.stop_loss,
            at,
        ),
        TradeAction::Sell => apply_sell(state, ticker_of(entry)?, entry.shares, entry.price, at),
        TradeAction::StopExit => apply_stop_loss_exit(state, ticker_of(entry)?, entry.price, at),
        TradeAction::Deposit => apply_deposit(state, entry.cash_delta, at),
        TradeAction::StopUpdate => apply_stop_update(state, ticker_of(entry)?, entry.stop_loss, at),
    };

    let (next, recomputed) = outcome.map_err(|e| mismatch(entry, e.to_string()))?;
    if recomputed != *entry {
        return Err(mismatch(entry, describe_difference(entry, &recomputed)));
    }
    Ok(next)
}

/// Replay `entries` on top of `initial`.
///
/// Entries at or below the initial sequence are already folded in and are
/// skipped; the rest must follow on without gaps.
pub fn replay<'a, I>(initial: PortfolioState, entries: I) -> Result<PortfolioState, LedgerError>
where
    I: IntoIterator<Item = &'a TradeJournalEntry>,
{
    let folded = initial.sequence();
    entries
        .into_iter()
        .filter(|e| e.sequence > folded)
        .try_fold(initial, |state, entry| apply_entry(&state, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{Money, PortfolioId, Quantity, Timestamp};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn at() -> Timestamp {
        Timestamp::parse("2026-01-05T15:00:00Z").unwrap()
    }

    fn genesis() -> PortfolioState {
        PortfolioState::genesis(PortfolioId::new("p1"), Money::new(dec!(10000)), at())
    }

    fn history() -> (PortfolioState, Vec<TradeJournalEntry>) {
        let aapl = Ticker::parse("AAPL").unwrap();
        let msft = Ticker::parse("MSFT").unwrap();
        let mut entries = Vec::new();
        let s = genesis();
        let (s, e) = apply_buy(&s, &aapl, Quantity::from_i64(10), Money::new(dec!(150)), Some(Money::new(dec!(140))), at()).unwrap();
        entries.push(e);
        let (s, e) = apply_buy(&s, &msft, Quantity::new(dec!(2.5)), Money::new(dec!(400)), None, at()).unwrap();
        entries.push(e);
        let (s, e) = apply_deposit(&s, Money::new(dec!(500)), at()).unwrap();
        entries.push(e);
        let (s, e) = apply_sell(&s, &aapl, Quantity::from_i64(4), Money::new(dec!(155)), at()).unwrap();
        entries.push(e);
        let (s, e) = apply_stop_update(&s, &msft, Some(Money::new(dec!(380))), at()).unwrap();
        entries.push(e);
        let (s, e) = apply_stop_loss_exit(&s, &aapl, Money::new(dec!(139)), at()).unwrap();
        entries.push(e);
        (s, entries)
    }

    #[test]
    fn replay_reproduces_sequential_execution() {
        let (expected, entries) = history();
        let rebuilt = replay(genesis(), &entries).unwrap();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn replay_from_midpoint_skips_folded_entries() {
        let (expected, entries) = history();
        let midpoint = replay(genesis(), &entries[..3]).unwrap();
        let rebuilt = replay(midpoint, &entries).unwrap();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn replay_detects_gap() {
        let (_, entries) = history();
        let gapped: Vec<_> = entries.iter().filter(|e| e.sequence != 3).collect();
        let result = replay(genesis(), gapped);
        assert_eq!(
            result,
            Err(LedgerError::SequenceGap {
                expected: 3,
                found: 4
            })
        );
    }

    #[test]
    fn replay_detects_tampered_cash() {
        let (_, mut entries) = history();
        entries[0].cash_after = Money::new(dec!(9000));
        let result = replay(genesis(), &entries);
        let Err(LedgerError::ReplayMismatch { sequence, reason, .. }) = result else {
            panic!("expected mismatch, got {result:?}");
        };
        assert_eq!(sequence, 1);
        assert!(reason.contains("cash after"));
    }

    #[test]
    fn replay_rejects_entry_that_no_longer_applies() {
        let (_, entries) = history();
        let poor = PortfolioState::genesis(PortfolioId::new("p1"), Money::new(dec!(100)), at());
        let result = replay(poor, &entries);
        assert!(matches!(result, Err(LedgerError::ReplayMismatch { sequence: 1, .. })));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Buy(usize, i64, i64),
        Sell(usize, i64, i64),
        Exit(usize, i64),
        Deposit(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 1i64..5_000, 1i64..50_000).prop_map(|(t, s, p)| Op::Buy(t, s, p)),
            (0usize..3, 1i64..5_000, 1i64..50_000).prop_map(|(t, s, p)| Op::Sell(t, s, p)),
            (0usize..3, 1i64..50_000).prop_map(|(t, p)| Op::Exit(t, p)),
            (1i64..1_000_000).prop_map(Op::Deposit),
        ]
    }

    proptest! {
        #[test]
        fn replay_matches_any_accepted_sequence(ops in prop::collection::vec(op(), 0..40)) {
            let tickers = ["AAPL", "MSFT", "SHOP.TO"].map(|t| Ticker::parse(t).unwrap());
            let mut state = genesis();
            let mut entries = Vec::new();
            for op in ops {
                // shares in hundredths, prices in cents
                let result = match op {
                    Op::Buy(t, s, p) => apply_buy(&state, &tickers[t], Quantity::new(Decimal::new(s, 2)), Money::new(Decimal::new(p, 2)), None, at()),
                    Op::Sell(t, s, p) => apply_sell(&state, &tickers[t], Quantity::new(Decimal::new(s, 2)), Money::new(Decimal::new(p, 2)), at()),
                    Op::Exit(t, p) => apply_stop_loss_exit(&state, &tickers[t], Money::new(Decimal::new(p, 2)), at()),
                    Op::Deposit(c) => apply_deposit(&state, Money::from_cents(c), at()),
                };
                if let Ok((next, entry)) = result {
                    prop_assert!(!next.cash().is_negative());
                    prop_assert!(next.positions().all(|p| p.shares.is_positive()));
                    state = next;
                    entries.push(entry);
                }
            }
            let rebuilt = replay(genesis(), &entries).unwrap();
            prop_assert_eq!(rebuilt, state);
        }
    }
}
