use {
    alloy::primitives::U256,
    bigdecimal::{
        BigDecimal,
        ParseBigDecimalError,
        num_bigint::{BigInt, Sign},
    },
    serde::{Serialize, Serializer},
    std::{fmt, ops::AddAssign, str::FromStr},
    thiserror::Error,
};

/// A non-negative integer token amount.
///
/// Reserves of 18 decimal tokens easily exceed the 64 bit range and sums of
/// them may even exceed 256 bits, so amounts are kept as arbitrary precision
/// decimals and never go through floating point.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Amount(BigDecimal);

impl Amount {
    pub fn zero() -> Self {
        Self(BigDecimal::from(0u8))
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        let digits = BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>());
        Self(BigDecimal::from(digits))
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Decimal(#[from] ParseBigDecimalError),
    #[error("amount {0} is negative")]
    Negative(String),
    #[error("amount {0} is not an integer")]
    Fractional(String),
}

impl FromStr for Amount {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = BigDecimal::from_str(s)?;
        if value.sign() == Sign::Minus {
            return Err(ParseError::Negative(s.to_string()));
        }
        if !value.is_integer() {
            return Err(ParseError::Fractional(s.to_string()));
        }
        Ok(Self(value))
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += &rhs.0;
    }
}

/// Renders the canonical minimal decimal form: no leading zeros, no
/// fractional part and no exponent.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (digits, _) = self.0.with_scale(0).into_bigint_and_exponent();
        write!(f, "{digits}")
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
