//! Fixed-precision money values.
//!
//! All monetary arithmetic in the engine goes through [`Money`]: exact
//! decimals rounded half-even at the currency's minor-unit scale, never
//! binary floating point. Cross-currency arithmetic is a hard error.

use core::cmp::Ordering;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// ISO 4217 alpha-3 currency code (uppercase ASCII).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub fn new(code: &str) -> BillingResult<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(BillingError::validation(format!(
                "invalid ISO 4217 currency code: {code:?}"
            )));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // Constructor only admits ASCII uppercase.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.as_str().to_string()
    }
}

/// Currency code plus its minor-unit exponent.
///
/// The exponent comes from currency master data (an external input); most
/// currencies use 2. It is carried on every value so rounding never guesses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub exponent: u32,
}

impl Currency {
    pub fn new(code: CurrencyCode, exponent: u32) -> Self {
        Self { code, exponent }
    }

    /// Currency with the common 2-digit minor unit.
    pub fn with_default_scale(code: CurrencyCode) -> Self {
        Self { code, exponent: 2 }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.code, f)
    }
}

/// An exact decimal amount in a single currency.
///
/// Construction rounds to the currency scale (half-even), so a `Money` is
/// always representable on an invoice as printed. Two values are equal iff
/// amount and currency both match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: round_to_scale(amount, currency.exponent),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    pub fn abs(self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    pub fn neg(self) -> Self {
        Self {
            amount: -self.amount,
            currency: self.currency,
        }
    }

    pub fn checked_add(self, other: Money) -> BillingResult<Money> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| BillingError::validation("monetary overflow in addition"))?;
        Ok(Self::new(amount, self.currency))
    }

    pub fn checked_sub(self, other: Money) -> BillingResult<Money> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| BillingError::validation("monetary overflow in subtraction"))?;
        Ok(Self::new(amount, self.currency))
    }

    /// Multiply by a plain decimal factor (e.g. a quantity or tax rate) and
    /// re-round to currency scale.
    ///
    /// Per-line totals are rounded here, once; invoice totals sum those
    /// already-rounded values so rounding error never compounds across lines.
    pub fn mul_decimal(self, factor: Decimal) -> BillingResult<Money> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or_else(|| BillingError::validation("monetary overflow in multiplication"))?;
        Ok(Self::new(amount, self.currency))
    }

    pub fn compare(self, other: Money) -> BillingResult<Ordering> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    fn ensure_same_currency(self, other: Money) -> BillingResult<()> {
        if self.currency.code != other.currency.code {
            return Err(BillingError::CurrencyMismatch {
                left: self.currency.code,
                right: other.currency.code,
            });
        }
        Ok(())
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.code)
    }
}

fn round_to_scale(amount: Decimal, exponent: u32) -> Decimal {
    amount.round_dp_with_strategy(exponent, RoundingStrategy::MidpointNearestEven)
}
