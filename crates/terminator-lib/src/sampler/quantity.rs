//! Kubernetes resource quantity parsing
//!
//! Supports the suffixes the API server emits for memory:
//! - binary: `Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`
//! - decimal: `k`, `M`, `G`, `T`, `P`, `E` and the sub-unit `m`, `u`, `n`
//! - decimal exponent: `129e6`, `1E3`
//!
//! Fractional byte counts round up, as the API server does.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid quantity {0:?}")]
pub struct InvalidQuantity(pub String);

enum Scale {
    /// Exact integer multiplier
    Whole(u64),
    /// Sub-unit or exponent multiplier
    Fraction(f64),
}

/// Parse a quantity into bytes
pub fn parse_bytes(value: &str) -> Result<u64, InvalidQuantity> {
    let value = value.trim();
    let invalid = || InvalidQuantity(value.to_string());

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    if number.is_empty() || number == "." || number == "+" {
        return Err(invalid());
    }

    let scale = scale_for(suffix).ok_or_else(invalid)?;

    if let (Ok(whole), Scale::Whole(multiplier)) = (number.parse::<u64>(), &scale) {
        return whole.checked_mul(*multiplier).ok_or_else(invalid);
    }

    let number: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier = match scale {
        Scale::Whole(m) => m as f64,
        Scale::Fraction(m) => m,
    };

    let bytes = (number * multiplier).ceil();
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

fn scale_for(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Whole(1),
        "Ki" => Scale::Whole(1 << 10),
        "Mi" => Scale::Whole(1 << 20),
        "Gi" => Scale::Whole(1 << 30),
        "Ti" => Scale::Whole(1 << 40),
        "Pi" => Scale::Whole(1 << 50),
        "Ei" => Scale::Whole(1 << 60),
        "k" => Scale::Whole(1_000),
        "M" => Scale::Whole(1_000_000),
        "G" => Scale::Whole(1_000_000_000),
        "T" => Scale::Whole(1_000_000_000_000),
        "P" => Scale::Whole(1_000_000_000_000_000),
        "E" => Scale::Whole(1_000_000_000_000_000_000),
        "m" => Scale::Fraction(1e-3),
        "u" => Scale::Fraction(1e-6),
        "n" => Scale::Fraction(1e-9),
        _ => return exponent(suffix),
    };
    Some(scale)
}

fn exponent(suffix: &str) -> Option<Scale> {
    let digits = suffix.strip_prefix(['e', 'E'])?;
    let exp: i32 = digits.parse().ok()?;
    if (0..=18).contains(&exp) {
        Some(Scale::Whole(10u64.pow(exp as u32)))
    } else {
        Some(Scale::Fraction(10f64.powi(exp)))
    }
}
