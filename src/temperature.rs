use std::fmt;

use crate::{Error, Result};

/// Temperature stored as Celsius internally.
/// The device only stores whole Fahrenheit degrees, formatted as "72.0".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }

    /// Format for a setpoint write: whole Fahrenheit degrees, one decimal.
    pub fn to_infinitude(&self) -> String {
        format!("{:.1}", self.fahrenheit().round())
    }

    /// Parse a device Fahrenheit string (e.g. "72.0", "-4.5").
    pub fn from_infinitude(s: &str) -> Result<Self> {
        let f: f64 = s
            .trim()
            .parse()
            .map_err(|_| Error::Decode(format!("not a temperature: {s:?}")))?;
        Ok(Self::from_fahrenheit(f))
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}
