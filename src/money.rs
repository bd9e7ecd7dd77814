//! Currency-bound monetary type with explicit rounding.
//!
//! Uses `rust_decimal` internally. Arithmetic keeps full precision; amounts
//! are only rescaled to the currency's minor-unit scale at posting
//! boundaries via [`Money::rounded`], using banker's rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A three-letter ISO 4217 currency code.
///
/// Stored inline so that [`Currency`] and [`Money`] stay `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Creates a code from a 3-character ASCII string.
    ///
    /// Returns `None` if the input is not exactly three ASCII alphabetic
    /// characters.
    pub fn new(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        Some(CurrencyCode([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        // Safety: constructor only accepts ASCII alphabetic bytes
        std::str::from_utf8(&self.0).expect("ascii code")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CurrencyCode::new(s.trim()).ok_or_else(|| format!("invalid currency code: {s}"))
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CurrencyCode::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A currency: code plus the number of minor-unit decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// ISO currency code.
    pub code: CurrencyCode,

    /// Number of decimal places carried by posted amounts.
    pub scale: u32,
}

impl Currency {
    /// Creates a currency from a code string and scale.
    pub fn new(code: &str, scale: u32) -> Option<Self> {
        Some(Currency {
            code: CurrencyCode::new(code)?,
            scale,
        })
    }
}

/// A monetary amount bound to a currency.
///
/// # Invariants
///
/// - Arithmetic between two `Money` values requires the same currency; this
///   is a programming-contract violation, checked with `debug_assert`.
/// - The internal amount may carry more precision than the currency scale;
///   [`Money::rounded`] produces the posted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    currency: Currency,
    amount: Decimal,
}

impl Money {
    /// Creates an amount in the given currency.
    pub fn new(currency: Currency, amount: Decimal) -> Self {
        Money { currency, amount }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Money {
            currency,
            amount: Decimal::ZERO,
        }
    }

    /// The currency this amount is bound to.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// The raw (possibly unrounded) decimal amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Rescales to the currency's minor-unit scale using banker's rounding.
    pub fn rounded(&self) -> Self {
        Money {
            currency: self.currency,
            amount: self
                .amount
                .round_dp_with_strategy(self.currency.scale, RoundingStrategy::MidpointNearestEven),
        }
    }

    /// Multiplies the amount by a plain decimal factor (e.g. a rate fraction
    /// or a day count). Precision is kept; no rounding occurs here.
    pub fn multiplied_by(&self, factor: Decimal) -> Self {
        Money {
            currency: self.currency,
            amount: self.amount * factor,
        }
    }

    /// Divides the amount by a plain decimal divisor.
    pub fn divided_by(&self, divisor: Decimal) -> Self {
        Money {
            currency: self.currency,
            amount: self.amount / divisor,
        }
    }

    /// Returns the negated amount.
    pub fn negated(&self) -> Self {
        Money {
            currency: self.currency,
            amount: -self.amount,
        }
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Money {
            currency: self.currency,
            amount: self.amount.abs(),
        }
    }

    /// Returns `true` if the amount is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns `true` if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Returns `true` if the amount is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// The smaller of two amounts.
    pub fn min(self, other: Self) -> Self {
        debug_assert_eq!(self.currency, other.currency);
        if self.amount <= other.amount { self } else { other }
    }

    /// The larger of two amounts.
    pub fn max(self, other: Self) -> Self {
        debug_assert_eq!(self.currency, other.currency);
        if self.amount >= other.amount { self } else { other }
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        debug_assert_eq!(self.currency, rhs.currency);
        Money {
            currency: self.currency,
            amount: self.amount + rhs.amount,
        }
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        debug_assert_eq!(self.currency, rhs.currency);
        self.amount += rhs.amount;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        debug_assert_eq!(self.currency, rhs.currency);
        Money {
            currency: self.currency,
            amount: self.amount - rhs.amount,
        }
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        debug_assert_eq!(self.currency, rhs.currency);
        self.amount -= rhs.amount;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        self.negated()
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        debug_assert_eq!(self.currency, other.currency);
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.currency.code,
            self.rounded().amount
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        Currency::new("USD", 2).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_currency_code_normalizes_case() {
        let code = CurrencyCode::new("usd").unwrap();
        assert_eq!(code.as_str(), "USD");
    }

    #[test]
    fn test_currency_code_rejects_bad_input() {
        assert!(CurrencyCode::new("US").is_none());
        assert!(CurrencyCode::new("USDX").is_none());
        assert!(CurrencyCode::new("U5D").is_none());
    }

    #[test]
    fn test_rounded_uses_bankers_rounding() {
        let m = Money::new(usd(), dec("1.125"));
        assert_eq!(m.rounded().amount(), dec("1.12"));

        let m = Money::new(usd(), dec("1.135"));
        assert_eq!(m.rounded().amount(), dec("1.14"));
    }

    #[test]
    fn test_arithmetic_keeps_precision() {
        let a = Money::new(usd(), dec("10.00"));
        let r = a.multiplied_by(dec("0.0475")).divided_by(dec("365"));
        // 10 * 0.0475 / 365 = 0.0013013698...
        assert!(r.amount() > dec("0.0013"));
        assert!(r.amount() < dec("0.00131"));
        assert_eq!(r.rounded().amount(), dec("0.00"));
    }

    #[test]
    fn test_min_max_and_sign_checks() {
        let a = Money::new(usd(), dec("5"));
        let b = Money::new(usd(), dec("-3"));

        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), a);
        assert!(a.is_positive());
        assert!(b.is_negative());
        assert!(Money::zero(usd()).is_zero());
        assert_eq!(b.abs().amount(), dec("3"));
    }
}
