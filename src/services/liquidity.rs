//! Liquidity Validator
//!
//! A bet is accepted only if the engine's worst-case exposure on it, the
//! profit paid if it wins (`amount * odds - amount`), fits inside the
//! counter-liquidity standing against it, haircut by the safety buffer.
//!
//! A market with no money in it at all has no counter-liquidity yet. There a
//! fixed bootstrap allowance applies instead: a stake up to
//! `bootstrap_liquidity` is admitted so the first bet can open the market.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::book::MarketBook;
use super::error::BettingError;
use crate::money;

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityParams {
    pub safety_buffer: Decimal,
    pub bootstrap_liquidity: Decimal,
}

impl Default for LiquidityParams {
    fn default() -> Self {
        Self {
            safety_buffer: Decimal::new(9, 1),
            bootstrap_liquidity: Decimal::from(100),
        }
    }
}

/// Outcome of a liquidity check
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityCheck {
    /// Profit the engine would owe if the bet wins
    pub required: Decimal,
    /// Counter-liquidity available after the safety haircut
    pub available: Decimal,
    /// True when the market was empty and the bootstrap allowance applied
    pub bootstrap: bool,
    pub accepted: bool,
}

impl LiquidityCheck {
    pub fn into_result(self) -> Result<Self, BettingError> {
        if self.accepted {
            Ok(self)
        } else {
            Err(BettingError::LiquidityConstraint {
                required: self.required,
                available: self.available,
            })
        }
    }
}

/// Check a proposed `(character_id, amount)` bet at `odds` against `book`.
///
/// `book` must come from the same transaction that will write the bet.
pub fn check_bet(
    book: &MarketBook,
    character_id: Uuid,
    amount: Decimal,
    odds: Decimal,
    params: &LiquidityParams,
) -> LiquidityCheck {
    let required = money::mul(amount, odds) - amount;

    if book.total().is_zero() {
        return LiquidityCheck {
            required,
            available: params.bootstrap_liquidity,
            bootstrap: true,
            accepted: amount <= params.bootstrap_liquidity,
        };
    }

    let available = money::mul(book.opposing_volume(character_id), params.safety_buffer);
    LiquidityCheck {
        required,
        available,
        bootstrap: false,
        accepted: required <= available,
    }
}
