// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(
    clippy::float_cmp,
    clippy::as_conversions,
    clippy::option_if_let_else
)]

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use anyhow::{anyhow, bail, Result};
use num_bigint::BigInt as NumBigInt;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};
use serde::ser::Serializer;
use serde::Serialize;

use crate::Rc;

pub type BigInt = NumBigInt;

const F64_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Arbitrary precision number.
///
/// Integral values are kept exact (machine integers promoted to big integers on overflow). Only
/// non-integral values use `f64`. Equality and ordering are numeric, so `1`, `1.0` and `1e0` are
/// the same number and hash identically.
#[derive(Clone)]
pub enum Number {
    UInt(u64),
    Int(i64),
    Float(f64),
    BigInt(Rc<BigInt>),
}

impl Number {
    fn from_bigint_owned(value: BigInt) -> Self {
        if value.is_zero() {
            return Number::Int(0);
        }

        if value.is_negative() {
            if let Some(i) = value.to_i64() {
                return Number::Int(i);
            }
        } else if let Some(u) = value.to_u64() {
            return Number::UInt(u);
        }

        Number::BigInt(Rc::new(value))
    }

    fn from_i128(value: i128) -> Self {
        if value >= 0 {
            if let Ok(u) = u64::try_from(value) {
                return Number::UInt(u);
            }
        }

        if let Ok(i) = i64::try_from(value) {
            Number::Int(i)
        } else {
            Number::BigInt(Rc::new(BigInt::from(value)))
        }
    }

    fn to_bigint_owned(&self) -> Option<BigInt> {
        match self {
            Number::UInt(v) => Some(BigInt::from(*v)),
            Number::Int(v) => Some(BigInt::from(*v)),
            Number::BigInt(v) => Some((**v).clone()),
            Number::Float(f) => Self::float_to_small_bigint(*f),
        }
    }

    fn float_to_small_bigint(value: f64) -> Option<BigInt> {
        if !value.is_finite() || value.fract() != 0.0 || value.abs() > F64_SAFE_INTEGER {
            return None;
        }

        if value >= 0.0 {
            let u = value as u64;
            ((u as f64) == value).then(|| BigInt::from(u))
        } else {
            let i = value as i64;
            ((i as f64) == value).then(|| BigInt::from(i))
        }
    }

    fn to_f64_lossy(&self) -> f64 {
        match self {
            Number::UInt(v) => *v as f64,
            Number::Int(v) => *v as f64,
            Number::Float(v) => *v,
            Number::BigInt(v) => match v.to_f64() {
                Some(f) => f,
                None if v.is_negative() => f64::NEG_INFINITY,
                None => f64::INFINITY,
            },
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Number::UInt(v) => *v == 0,
            Number::Int(v) => *v == 0,
            Number::Float(f) => *f == 0.0,
            Number::BigInt(v) => v.is_zero(),
        }
    }

    fn exact_pair(a: &Number, b: &Number) -> Option<(BigInt, BigInt)> {
        if matches!(a, Number::Float(_)) || matches!(b, Number::Float(_)) {
            return None;
        }
        Some((a.to_bigint_owned()?, b.to_bigint_owned()?))
    }

    fn normalize_float(value: f64) -> Number {
        match Self::float_to_small_bigint(value) {
            Some(int) => Self::from_bigint_owned(int),
            None => Number::Float(value),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Number::UInt(v) => Some(*v),
            Number::Int(v) => u64::try_from(*v).ok(),
            Number::BigInt(v) => v.to_u64(),
            Number::Float(f) => Self::float_to_small_bigint(*f).and_then(|b| b.to_u64()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::UInt(v) => i64::try_from(*v).ok(),
            Number::Int(v) => Some(*v),
            Number::BigInt(v) => v.to_i64(),
            Number::Float(f) => Self::float_to_small_bigint(*f).and_then(|b| b.to_i64()),
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_u64().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_f64(&self) -> f64 {
        self.to_f64_lossy()
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Number::Float(f) => f.is_finite() && f.fract() == 0.0,
            _ => true,
        }
    }

    pub fn add(&self, rhs: &Self) -> Result<Number> {
        match Self::exact_pair(self, rhs) {
            Some((a, b)) => Ok(Number::from_bigint_owned(a + b)),
            None => Ok(Number::normalize_float(
                self.to_f64_lossy() + rhs.to_f64_lossy(),
            )),
        }
    }

    pub fn sub(&self, rhs: &Self) -> Result<Number> {
        match (self, rhs) {
            (Number::UInt(a), Number::UInt(b)) => {
                Ok(Number::from_i128(i128::from(*a) - i128::from(*b)))
            }
            (Number::Int(a), Number::Int(b)) => {
                Ok(Number::from_i128(i128::from(*a) - i128::from(*b)))
            }
            _ => match Self::exact_pair(self, rhs) {
                Some((a, b)) => Ok(Number::from_bigint_owned(a - b)),
                None => Ok(Number::normalize_float(
                    self.to_f64_lossy() - rhs.to_f64_lossy(),
                )),
            },
        }
    }

    pub fn mul(&self, rhs: &Self) -> Result<Number> {
        match Self::exact_pair(self, rhs) {
            Some((a, b)) => Ok(Number::from_bigint_owned(a * b)),
            None => Ok(Number::normalize_float(
                self.to_f64_lossy() * rhs.to_f64_lossy(),
            )),
        }
    }

    pub fn divide(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("divide by zero");
        }

        if let Some((a, b)) = Self::exact_pair(self, rhs) {
            let remainder = &a % &b;
            if remainder.is_zero() {
                return Ok(Number::from_bigint_owned(a / b));
            }
        }

        Ok(Number::normalize_float(
            self.to_f64_lossy() / rhs.to_f64_lossy(),
        ))
    }

    pub fn modulo(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("modulo by zero");
        }

        if !self.is_integer() || !rhs.is_integer() {
            bail!("modulo on floating-point number");
        }

        let a = self
            .to_bigint_owned()
            .ok_or_else(|| anyhow!("modulo operand out of range"))?;
        let b = rhs
            .to_bigint_owned()
            .ok_or_else(|| anyhow!("modulo operand out of range"))?;
        Ok(Number::from_bigint_owned(a % b))
    }

    pub fn abs(&self) -> Number {
        match self {
            Number::UInt(_) => self.clone(),
            Number::Int(v) => Number::from_i128(i128::from(*v).abs()),
            Number::BigInt(v) => Number::from_bigint_owned((**v).clone().abs()),
            Number::Float(f) => Number::Float(f.abs()),
        }
    }

    pub fn floor(&self) -> Number {
        match self {
            Number::Float(f) => Number::normalize_float(f.floor()),
            _ => self.clone(),
        }
    }

    pub fn ceil(&self) -> Number {
        match self {
            Number::Float(f) => Number::normalize_float(f.ceil()),
            _ => self.clone(),
        }
    }

    pub fn round(&self) -> Number {
        match self {
            Number::Float(f) => Number::normalize_float(f.round()),
            _ => self.clone(),
        }
    }

    pub fn one() -> Number {
        Number::from_bigint_owned(BigInt::one())
    }

    /// Formats an integral value in the given radix. Fractions are truncated towards zero.
    pub fn format_radix(&self, radix: u32) -> Option<String> {
        let value = match self {
            Number::Float(f) => Self::float_to_small_bigint(f.trunc())?,
            _ => self.to_bigint_owned()?,
        };
        Some(value.to_str_radix(radix))
    }

    pub fn format_decimal(&self) -> String {
        match self {
            Number::UInt(v) => v.to_string(),
            Number::Int(v) => v.to_string(),
            Number::BigInt(v) => v.to_string(),
            Number::Float(f) if f.is_nan() => "NaN".to_string(),
            Number::Float(f) => f.to_string(),
        }
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_decimal())
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::UInt(v) => serializer.serialize_u64(*v),
            Number::Int(v) => serializer.serialize_i64(*v),
            Number::Float(v) => serializer.serialize_f64(*v),
            Number::BigInt(v) => {
                let n = serde_json::Number::from_str(&v.to_string())
                    .map_err(|_| serde::ser::Error::custom("could not serialize number"))?;
                n.serialize(serializer)
            }
        }
    }
}

impl From<BigInt> for Number {
    fn from(value: BigInt) -> Self {
        Number::from_bigint_owned(value)
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Number::UInt(value)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number::UInt(value as u64)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::from_i128(i128::from(value))
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::from(i64::from(value))
    }
}

impl From<u128> for Number {
    fn from(value: u128) -> Self {
        match u64::try_from(value) {
            Ok(n) => Number::UInt(n),
            Err(_) => Number::from_bigint_owned(BigInt::from(value)),
        }
    }
}

impl From<i128> for Number {
    fn from(value: i128) -> Self {
        Number::from_i128(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::normalize_float(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseNumberError;

impl fmt::Display for ParseNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid number")
    }
}

impl core::error::Error for ParseNumberError {}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseNumberError);
        }

        let is_integer_literal =
            !trimmed.contains('.') && !trimmed.contains('e') && !trimmed.contains('E');

        if is_integer_literal {
            let (negative, digits) = match trimmed.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
            };

            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if let Some(value) = BigInt::parse_bytes(digits.as_bytes(), 10) {
                    let value = if negative { -value } else { value };
                    return Ok(Number::from_bigint_owned(value));
                }
            }
            return Err(ParseNumberError);
        }

        if let Some(value) = parse_scientific_bigint(trimmed) {
            return Ok(Number::from_bigint_owned(value));
        }

        trimmed
            .parse::<f64>()
            .map(Number::normalize_float)
            .map_err(|_| ParseNumberError)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::UInt(a), Number::UInt(b)) => a.cmp(b),
            (Number::Int(a), Number::Int(b)) => a.cmp(b),
            _ => self.exact().cmp(&other.exact()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Must agree with `Ord`: every integral value hashes as its exact integer, whatever its
// representation.
impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.exact() {
            Exact::Integer(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Exact::Fraction(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
            Exact::NegInfinity => 2u8.hash(state),
            Exact::Infinity => 3u8.hash(state),
            Exact::NaN => 4u8.hash(state),
        }
    }
}

/// Exact numeric image of a [`Number`], used for ordering and hashing.
///
/// Any finite float without a fractional part converts losslessly to an integer, so integers
/// and integral floats compare exactly at every magnitude. NaN sorts after everything.
#[derive(Debug)]
enum Exact {
    NegInfinity,
    Integer(BigInt),
    // Finite and non-integral, hence smaller than 2^52 in magnitude.
    Fraction(f64),
    Infinity,
    NaN,
}

impl Exact {
    fn rank(&self) -> u8 {
        match self {
            Exact::NegInfinity => 0,
            Exact::Integer(_) | Exact::Fraction(_) => 1,
            Exact::Infinity => 2,
            Exact::NaN => 3,
        }
    }
}

impl Number {
    fn exact(&self) -> Exact {
        match self {
            Number::UInt(v) => Exact::Integer(BigInt::from(*v)),
            Number::Int(v) => Exact::Integer(BigInt::from(*v)),
            Number::BigInt(v) => Exact::Integer((**v).clone()),
            Number::Float(f) if f.is_nan() => Exact::NaN,
            Number::Float(f) if *f == f64::INFINITY => Exact::Infinity,
            Number::Float(f) if *f == f64::NEG_INFINITY => Exact::NegInfinity,
            Number::Float(f) if f.fract() == 0.0 => match BigInt::from_f64(*f) {
                Some(i) => Exact::Integer(i),
                None => Exact::Fraction(*f),
            },
            Number::Float(f) => Exact::Fraction(*f),
        }
    }
}

// A non-integral `f` lies strictly between floor(f) and floor(f) + 1, so comparing its floor
// against an integer is exact.
fn cmp_fraction_integer(f: f64, i: &BigInt) -> Ordering {
    match BigInt::from_f64(f.floor()) {
        Some(floor) if floor < *i => Ordering::Less,
        Some(_) => Ordering::Greater,
        None => f.total_cmp(&i.to_f64().unwrap_or(0.0)),
    }
}

impl Ord for Exact {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Exact::Integer(a), Exact::Integer(b)) => a.cmp(b),
            (Exact::Fraction(a), Exact::Fraction(b)) => a.total_cmp(b),
            (Exact::Fraction(f), Exact::Integer(i)) => cmp_fraction_integer(*f, i),
            (Exact::Integer(i), Exact::Fraction(f)) => cmp_fraction_integer(*f, i).reverse(),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Exact {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Exact {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Exact {}

fn pow10_bigint(exp: u32) -> BigInt {
    num_traits::pow(BigInt::from(10u8), exp as usize)
}

// Parses literals such as `1e3` or `2.50e2` exactly when they denote integers.
fn parse_scientific_bigint(input: &str) -> Option<BigInt> {
    let idx = input.find(['e', 'E'])?;
    let (mantissa, exponent) = (&input[..idx], &input[idx + 1..]);
    let exponent = exponent.parse::<i32>().ok()?;

    let (negative, unsigned) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    if unsigned.is_empty() {
        return None;
    }

    let mut digits = String::new();
    let mut fractional_len: i32 = 0;
    let mut seen_dot = false;
    for ch in unsigned.chars() {
        match ch {
            '.' if !seen_dot => seen_dot = true,
            '0'..='9' => {
                digits.push(ch);
                if seen_dot {
                    fractional_len += 1;
                }
            }
            _ => return None,
        }
    }

    while fractional_len > 0 && digits.ends_with('0') {
        digits.pop();
        fractional_len -= 1;
    }
    if digits.is_empty() {
        return Some(BigInt::zero());
    }

    let adjusted = u32::try_from(exponent.checked_sub(fractional_len)?).ok()?;
    let mut value = BigInt::parse_bytes(digits.as_bytes(), 10)? * pow10_bigint(adjusted);
    if negative {
        value = -value;
    }
    Some(value)
}
