use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Sub},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    Decode,
    Encode,
    Type,
};
use thiserror::Error;

use crate::op;

//--------------------------------------       Amount        ---------------------------------------------------------
/// An exact decimal amount in the rail's display unit (rupiah for QR, whole coins for the coin rails).
///
/// Amounts double as the correlation key between an order and an incoming payment, so equality is exact decimal
/// equality: `0.05 == 0.050`, but `0.05 != 0.0500001`. Amounts are stored as TEXT so that no precision is lost in
/// SQLite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(Decimal);

op!(binary Amount, Add, add);
op!(binary Amount, Sub, sub);
op!(inplace Amount, AddAssign, add_assign);

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an amount: {0}")]
pub struct AmountConversionError(String);

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = AmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self).map_err(|e| AmountConversionError(format!("{s}: {e}")))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Amount {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// `self + rhs`, or `None` if the sum cannot be represented.
    pub fn checked_add(&self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Converts an integer number of indivisible base units (e.g. satoshi-style units) into an amount, given the
    /// number of decimals of the coin.
    pub fn from_base_units(units: i128, decimals: u32) -> Result<Self, AmountConversionError> {
        Decimal::try_from_i128_with_scale(units, decimals)
            .map(Self)
            .map_err(|e| AmountConversionError(format!("{units} with {decimals} decimals: {e}")))
    }

    /// Parses human-formatted decimal strings such as `"1,234.50"`, `"0.05 COIN"` or `" 15_000 "`.
    ///
    /// Commas, underscores and inner spaces are treated as digit-group separators and a leading or trailing unit
    /// symbol is ignored. The decimal separator is always `.`.
    pub fn parse_formatted(s: &str) -> Result<Self, AmountConversionError> {
        let trimmed = s.trim_matches(|c: char| c.is_alphabetic() || c.is_whitespace());
        let digits = trimmed.chars().filter(|c| !matches!(c, ',' | '_' | ' ')).collect::<String>();
        if digits.is_empty() {
            return Err(AmountConversionError(format!("'{s}' contains no digits")));
        }
        Self::from_str(&digits).map_err(|e| AmountConversionError(format!("'{s}' is not a formatted amount. {e}")))
    }
}

impl Type<Sqlite> for Amount {
    fn type_info() -> SqliteTypeInfo {
        <str as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <str as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Amount {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> IsNull {
        <String as Encode<'q, Sqlite>>::encode(self.to_string(), buf)
    }
}

impl<'r> Decode<'r, Sqlite> for Amount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<'r, Sqlite>>::decode(value)?;
        Ok(Self::from_str(s)?)
    }
}
