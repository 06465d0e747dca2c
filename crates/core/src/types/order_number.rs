//! Year-scoped sequential order numbers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Default prefix for order numbers (`ORD-2025-0001`).
pub const DEFAULT_ORDER_PREFIX: &str = "ORD";

/// Minimum number of digits in the sequence segment.
const SEQUENCE_WIDTH: usize = 4;

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    /// The input string is empty.
    #[error("order number cannot be empty")]
    Empty,
    /// The input is not `PREFIX-YEAR-SEQUENCE`.
    #[error("order number must look like PREFIX-YEAR-SEQUENCE")]
    Malformed,
    /// The year segment is not a four digit year.
    #[error("order number year must be four digits")]
    InvalidYear,
    /// The sequence segment is not numeric.
    #[error("order number sequence must be numeric")]
    InvalidSequence,
}

/// A unique order identifier of the form `{PREFIX}-{year}-{NNNN}`.
///
/// The sequence is zero-padded to four digits and grows wider past `9999`.
///
/// ## Examples
///
/// ```
/// use grocer_core::OrderNumber;
///
/// let number = OrderNumber::format("ORD", 2025, 7);
/// assert_eq!(number.as_str(), "ORD-2025-0007");
/// assert_eq!(number.sequence(), 7);
///
/// assert!(OrderNumber::parse("ORD-2025-0007").is_ok());
/// assert!(OrderNumber::parse("ORD-25-1").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Build an order number from its parts.
    #[must_use]
    pub fn format(prefix: &str, year: i32, sequence: u32) -> Self {
        Self(format!(
            "{prefix}-{year}-{sequence:0width$}",
            width = SEQUENCE_WIDTH
        ))
    }

    /// Parse an order number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, does not have three
    /// `-`-separated segments, or has a non-numeric year or sequence.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        if s.is_empty() {
            return Err(OrderNumberError::Empty);
        }

        let (rest, sequence) = s.rsplit_once('-').ok_or(OrderNumberError::Malformed)?;
        let (prefix, year) = rest.rsplit_once('-').ok_or(OrderNumberError::Malformed)?;

        if prefix.is_empty() {
            return Err(OrderNumberError::Malformed);
        }
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::InvalidYear);
        }
        if sequence.is_empty() || sequence.parse::<u32>().is_err() {
            return Err(OrderNumberError::InvalidSequence);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `OrderNumber` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The trailing numeric segment, or `0` if it cannot be read.
    #[must_use]
    pub fn sequence(&self) -> u32 {
        sequence_of(&self.0).unwrap_or(0)
    }

    /// The `LIKE` pattern matching every number of `prefix` in `year`.
    #[must_use]
    pub fn like_pattern(prefix: &str, year: i32) -> String {
        format!("{prefix}-{year}-%")
    }

    /// The number following the highest sequence among `existing`.
    ///
    /// Entries that do not belong to `prefix`/`year` or whose trailing segment
    /// is not numeric are ignored. An empty year starts at `0001`.
    #[must_use]
    pub fn next_after<'a, I>(existing: I, prefix: &str, year: i32) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let scope = format!("{prefix}-{year}-");
        let max = existing
            .into_iter()
            .filter_map(|number| number.strip_prefix(scope.as_str()))
            .filter_map(|tail| tail.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        Self::format(prefix, year, max.saturating_add(1))
    }
}

fn sequence_of(number: &str) -> Option<u32> {
    number.rsplit_once('-')?.1.parse().ok()
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
