use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Positive expense amount represented as **integer cents**.
///
/// Every committed expense carries one. Values coming from the extraction
/// service are converted once, at the boundary, so the rest of the engine
/// never sees floating point money.
///
/// # Examples
///
/// ```rust
/// use engine::Amount;
///
/// let amount = Amount::from_cents(12_34).unwrap();
/// assert_eq!(amount.cents(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from text (accepts `.` or `,` as decimal separator and an optional
/// leading currency sign; rejects > 2 decimals and non-positive values):
///
/// ```rust
/// use engine::Amount;
///
/// assert_eq!("10".parse::<Amount>().unwrap().cents(), 1000);
/// assert_eq!("$6,5".parse::<Amount>().unwrap().cents(), 650);
/// assert!("12.345".parse::<Amount>().is_err());
/// assert!("0".parse::<Amount>().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
#[repr(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Creates an amount from integer cents. Returns `None` unless `cents > 0`.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Option<Self> {
        if cents > 0 { Some(Self(cents)) } else { None }
    }

    /// Converts a major-unit number (e.g. `6.5`) rounding to the nearest cent.
    ///
    /// Returns `None` for non-finite, non-positive or out of range values.
    #[must_use]
    pub fn from_major(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents < 1.0 || cents > i64::MAX as f64 {
            return None;
        }
        Self::from_cents(cents as i64)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns the value in major units, as written in the parsed payload.
    #[must_use]
    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0 / 100;
        let cents = self.0 % 100;
        write!(f, "{units}.{cents:02}")
    }
}

impl TryFrom<i64> for Amount {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_cents(value)
            .ok_or_else(|| EngineError::InvalidAmount(format!("amount must be > 0, got {value}")))
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = EngineError;

    /// Parses a decimal string into cents.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `$`
    /// or `€`.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`)
    /// - rejects empty/invalid strings
    /// - rejects zero and negative values
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount("invalid amount".to_string());
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        let rest = trimmed
            .strip_prefix('$')
            .or_else(|| trimmed.strip_prefix('€'))
            .unwrap_or(trimmed)
            .trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let units_str = parts.next().ok_or_else(invalid)?;
        let cents_str = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let units: i64 = units_str.parse().map_err(|_| overflow())?;

        let cents: i64 = match cents_str {
            None | Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                match frac.len() {
                    1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                    2 => frac.parse::<i64>().map_err(|_| invalid())?,
                    _ => return Err(EngineError::InvalidAmount("too many decimals".to_string())),
                }
            }
        };

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(overflow)?;

        Amount::try_from(total)
    }
}
