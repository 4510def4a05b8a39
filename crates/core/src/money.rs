//! Monetary amounts in integer minor units.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

pub const DEFAULT_CURRENCY: &str = "KRW";

/// An amount of money in the currency's minor unit (KRW has none, so 1 = ₩1).
///
/// Arithmetic never mixes currencies; overflow is reported rather than wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: String,
}

impl ValueObject for Money {}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> DomainResult<Self> {
        let currency = currency.into().trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter ISO code, got '{currency}'"
            )));
        }
        Ok(Self { amount, currency })
    }

    pub fn krw(amount: i64) -> Self {
        Self {
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn zero(currency: &str) -> Self {
        Self {
            amount: 0,
            currency: currency.to_string(),
        }
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount < 0
    }

    pub fn checked_add(&self, other: &Money) -> DomainResult<Money> {
        if self.currency != other.currency {
            return Err(DomainError::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| DomainError::validation("amount overflow"))?;
        Ok(Money {
            amount,
            currency: self.currency.clone(),
        })
    }

    pub fn times(&self, quantity: u32) -> DomainResult<Money> {
        let amount = self
            .amount
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| DomainError::validation("amount overflow"))?;
        Ok(Money {
            amount,
            currency: self.currency.clone(),
        })
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
