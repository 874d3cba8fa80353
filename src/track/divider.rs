// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, str::FromStr};

use crate::error::LooperError;

/// Largest denominator accepted when a divider is written as a decimal.
const MAX_DECIMAL_DENOMINATOR: u32 = 1000;

/// A positive rational multiple of the master loop length. A dependent track's loop lasts
/// `master loop duration * divider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divider {
    numerator: u32,
    denominator: u32,
}

impl Divider {
    pub const ONE: Divider = Divider {
        numerator: 1,
        denominator: 1,
    };

    /// Creates a divider, reduced to lowest terms.
    pub fn new(numerator: u32, denominator: u32) -> Result<Divider, LooperError> {
        if numerator == 0 || denominator == 0 {
            return Err(LooperError::InvalidDivider(format!(
                "{}/{} is not a positive ratio",
                numerator, denominator
            )));
        }

        let divisor = gcd(numerator, denominator);
        Ok(Divider {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        })
    }

    /// Scales the given master loop duration to this divider's loop length.
    pub fn scale(&self, master_loop_duration: f64) -> f64 {
        master_loop_duration * self.numerator as f64 / self.denominator as f64
    }
}

impl Default for Divider {
    fn default() -> Self {
        Divider::ONE
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn parse_part(value: &str, input: &str) -> Result<u32, LooperError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| LooperError::InvalidDivider(input.to_string()))
}

impl FromStr for Divider {
    type Err = LooperError;

    /// Parses `"2"`, `"1/2"` or a decimal such as `"1.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((numerator, denominator)) = s.split_once('/') {
            return Divider::new(parse_part(numerator, s)?, parse_part(denominator, s)?);
        }

        if s.contains('.') {
            let value: f64 = s
                .parse()
                .map_err(|_| LooperError::InvalidDivider(s.to_string()))?;
            if !value.is_finite() || value <= 0.0 {
                return Err(LooperError::InvalidDivider(s.to_string()));
            }
            let numerator = (value * MAX_DECIMAL_DENOMINATOR as f64).round();
            if numerator < 1.0 || numerator > u32::MAX as f64 {
                return Err(LooperError::InvalidDivider(s.to_string()));
            }
            return Divider::new(numerator as u32, MAX_DECIMAL_DENOMINATOR);
        }

        Divider::new(parse_part(s, s)?, 1)
    }
}

impl fmt::Display for Divider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}
