//! Worked-solution traces stored with Grid-1 questions.

use serde::{Deserialize, Serialize};

/// One bring-down step of long division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionStep {
    /// The partial dividend divided at this step.
    pub dividend: u64,
    pub quotient_digit: u64,
    pub product: u64,
    pub remainder: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionTrace {
    pub dividend: u64,
    pub divisor: u64,
    pub quotient: u64,
    pub remainder: u64,
    pub steps: Vec<DivisionStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplicationTrace {
    pub multiplicand: u64,
    pub multiplier: u64,
    /// One shifted partial product per multiplier digit, least significant first.
    pub partial_products: Vec<u64>,
    pub product: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArithmeticTrace {
    LongDivision(DivisionTrace),
    Multiplication(MultiplicationTrace),
}

fn digits(value: u64) -> Vec<u64> {
    value
        .to_string()
        .bytes()
        .map(|b| u64::from(b - b'0'))
        .collect()
}

/// Schoolbook long division. `None` for a zero divisor.
///
/// Leading digits are brought down until the partial dividend reaches the
/// divisor; every later digit produces a step, including zero quotient digits.
pub fn long_division(dividend: u64, divisor: u64) -> Option<DivisionTrace> {
    if divisor == 0 {
        return None;
    }

    let digits = digits(dividend);
    let last = digits.len().saturating_sub(1);
    let mut steps = Vec::new();
    let mut current: u64 = 0;
    let mut quotient: u64 = 0;

    for (position, digit) in digits.into_iter().enumerate() {
        current = current.checked_mul(10)?.checked_add(digit)?;

        if steps.is_empty() && current < divisor && position < last {
            continue;
        }

        let quotient_digit = current / divisor;
        let product = quotient_digit * divisor;
        let remainder = current - product;

        steps.push(DivisionStep {
            dividend: current,
            quotient_digit,
            product,
            remainder,
        });

        quotient = quotient.checked_mul(10)?.checked_add(quotient_digit)?;
        current = remainder;
    }

    Some(DivisionTrace {
        dividend,
        divisor,
        quotient,
        remainder: current,
        steps,
    })
}

/// Partial products of `multiplicand * multiplier`. `None` on overflow.
pub fn multiplication(multiplicand: u64, multiplier: u64) -> Option<MultiplicationTrace> {
    let mut partial_products = Vec::new();
    let mut place: u64 = 1;
    let mut product: u64 = 0;

    for digit in digits(multiplier).into_iter().rev() {
        let partial = multiplicand.checked_mul(digit)?.checked_mul(place)?;
        partial_products.push(partial);
        product = product.checked_add(partial)?;
        place = place.checked_mul(10)?;
    }

    Some(MultiplicationTrace {
        multiplicand,
        multiplier,
        partial_products,
        product,
    })
}
