//! Trade validator.

use rust_decimal::Decimal;

use super::{OrderSide, TradeProposal, ValidatedTrade, ValidationError, ValidationLimits};
use crate::domain::ledger::PortfolioState;
use crate::domain::shared::{Money, Quantity, Ticker};

/// Applies [`ValidationLimits`] to trade proposals.
///
/// Rule order (first failure wins):
///
/// 1. ticker format
/// 2. share bounds and precision
/// 3. price bounds and precision
/// 4. sells covered by held shares
/// 5. buys covered by cash
/// 6. notional cap
/// 7. stop-loss sanity
/// 8. open position count
/// 9. position size relative to equity
#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: ValidationLimits,
}

impl Validator {
    /// Create a validator with the given limits.
    #[must_use]
    pub const fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Limits in force.
    #[must_use]
    pub const fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Rule 1.
    pub fn check_ticker(&self, raw: &str) -> Result<Ticker, ValidationError> {
        Ticker::parse(raw).map_err(|e| ValidationError::InvalidTicker {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
    }

    /// Rule 2.
    pub fn check_shares(&self, shares: Quantity) -> Result<(), ValidationError> {
        let reject = |reason: String| {
            Err(ValidationError::InvalidShares {
                value: shares,
                reason,
            })
        };
        if !shares.is_positive() {
            return reject("must be greater than zero".to_string());
        }
        if shares.fractional_digits() > self.limits.max_share_decimals {
            return reject(format!(
                "at most {} decimal places allowed",
                self.limits.max_share_decimals
            ));
        }
        if shares.amount() > self.limits.max_shares {
            return reject(format!("exceeds maximum of {}", self.limits.max_shares));
        }
        Ok(())
    }

    /// Rule 3.
    pub fn check_price(&self, price: Option<Money>) -> Result<Money, ValidationError> {
        let reject = |reason: String| {
            Err(ValidationError::InvalidPrice {
                value: price,
                reason,
            })
        };
        let Some(p) = price else {
            return reject("no execution price".to_string());
        };
        if !p.is_positive() {
            return reject(format!("{p} must be greater than zero"));
        }
        if p.amount().normalize().scale() > self.limits.max_price_decimals {
            return reject(format!(
                "{} has more than {} decimal places",
                p.amount(),
                self.limits.max_price_decimals
            ));
        }
        if p > self.limits.max_price {
            return reject(format!("{p} exceeds maximum of {}", self.limits.max_price));
        }
        Ok(p)
    }

    /// Round a quoted market price to the precision rule 3 accepts.
    #[must_use]
    pub fn quantize_price(&self, price: Money) -> Money {
        Money::new(price.amount().round_dp(self.limits.max_price_decimals))
    }

    /// The side-only part of rule 7: a stop-loss belongs to a buy.
    fn check_stop_side(proposal: &TradeProposal) -> Result<(), ValidationError> {
        match (proposal.side, proposal.stop_loss) {
            (OrderSide::Sell, Some(stop)) => Err(ValidationError::InvalidStopLoss {
                stop_loss: stop,
                reason: "not accepted on a sell; update the stop on the position instead"
                    .to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// The state-independent rules: 1, 2, 3 when a price is supplied, and
    /// the side check of 7.
    ///
    /// Lets a caller refuse malformed input before spending a price lookup.
    pub fn validate_request_shape(&self, proposal: &TradeProposal) -> Result<Ticker, ValidationError> {
        let ticker = self.check_ticker(&proposal.ticker)?;
        self.check_shares(proposal.shares)?;
        if proposal.price.is_some() {
            self.check_price(proposal.price)?;
        }
        Self::check_stop_side(proposal)?;
        Ok(ticker)
    }

    /// Run every rule against `state`.
    pub fn validate(
        &self,
        proposal: &TradeProposal,
        state: &PortfolioState,
    ) -> Result<ValidatedTrade, ValidationError> {
        let ticker = self.check_ticker(&proposal.ticker)?;
        self.check_shares(proposal.shares)?;
        let price = self.check_price(proposal.price)?;
        let notional = price * proposal.shares.amount();
        let existing = state.position(&ticker);

        match proposal.side {
            OrderSide::Sell => {
                let held = existing.map_or(Quantity::ZERO, |p| p.shares);
                if proposal.shares > held {
                    return Err(ValidationError::InsufficientShares {
                        ticker,
                        requested: proposal.shares,
                        held,
                    });
                }
            }
            OrderSide::Buy => {
                if notional > state.cash() {
                    return Err(ValidationError::InsufficientCash {
                        required: notional,
                        available: state.cash(),
                    });
                }
            }
        }

        if notional > self.limits.max_notional {
            return Err(ValidationError::NotionalLimitExceeded {
                notional,
                limit: self.limits.max_notional,
            });
        }

        Self::check_stop_side(proposal)?;
        if let Some(stop) = proposal.stop_loss {
            if !stop.is_positive() {
                return Err(ValidationError::InvalidStopLoss {
                    stop_loss: stop,
                    reason: "must be greater than zero".to_string(),
                });
            }
            if proposal.side == OrderSide::Buy && stop >= price {
                return Err(ValidationError::InvalidStopLoss {
                    stop_loss: stop,
                    reason: format!("must be below the buy price {price}"),
                });
            }
        }

        if proposal.side == OrderSide::Buy {
            if let (None, Some(limit)) = (existing, self.limits.max_open_positions) {
                if state.position_count() >= limit {
                    return Err(ValidationError::PositionLimitReached {
                        open: state.position_count(),
                        limit,
                    });
                }
            }

            if let Some(fraction) = self.limits.max_position_fraction {
                let position_value = existing.map_or(Money::ZERO, |p| p.cost_basis()) + notional;
                let equity = state.book_equity();
                if position_value > equity * fraction {
                    return Err(ValidationError::PositionSizeExceeded {
                        ticker,
                        position_value,
                        equity,
                        limit_pct: (fraction * Decimal::ONE_HUNDRED).normalize(),
                    });
                }
            }
        }

        Ok(ValidatedTrade {
            ticker,
            side: proposal.side,
            shares: proposal.shares,
            price,
            stop_loss: proposal.stop_loss,
            notional,
        })
    }

    /// Check a cash deposit amount.
    pub fn validate_deposit(&self, amount: Money) -> Result<(), ValidationError> {
        if !amount.is_positive() {
            return Err(ValidationError::InvalidAmount {
                value: amount,
                reason: "must be greater than zero".to_string(),
            });
        }
        if amount.amount().normalize().scale() > 2 {
            return Err(ValidationError::InvalidAmount {
                value: amount,
                reason: "at most 2 decimal places allowed".to_string(),
            });
        }
        if amount > self.limits.max_notional {
            return Err(ValidationError::InvalidAmount {
                value: amount,
                reason: format!("exceeds maximum of {}", self.limits.max_notional),
            });
        }
        Ok(())
    }

    /// Check a stop-loss update. `None` clears the stop.
    pub fn validate_stop_update(
        &self,
        raw_ticker: &str,
        stop_loss: Option<Money>,
    ) -> Result<Ticker, ValidationError> {
        let ticker = self.check_ticker(raw_ticker)?;
        if let Some(stop) = stop_loss {
            self.check_price(Some(stop))
                .map_err(|e| ValidationError::InvalidStopLoss {
                    stop_loss: stop,
                    reason: match e {
                        ValidationError::InvalidPrice { reason, .. } => reason,
                        other => other.to_string(),
                    },
                })?;
        }
        Ok(ticker)
    }
}
