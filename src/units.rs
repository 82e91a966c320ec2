//! Byte-size values as they appear in `contentSize` properties.
//!
//! Sizes are written as a non-negative integer with a unit suffix
//! (`B`, `KB`, `MB`, `GB`, `TB`, decimal powers of 1000). The literal
//! `over100GB` is a sentinel for volumes too large to state exactly and
//! compares as "at least 100 GB".

use std::fmt;

/// The sentinel literal for unbounded large volumes.
pub const OVER_100GB: &str = "over100GB";

const GB: u64 = 1_000_000_000;

/// A parsed `contentSize` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteSize {
    /// An exact size in bytes.
    Bytes(u64),
    /// The `over100GB` sentinel.
    Over100Gb,
}

impl ByteSize {
    /// Parse a size literal. Returns `None` for anything that is not
    /// `<integer><unit>` or the sentinel.
    pub fn parse(s: &str) -> Option<ByteSize> {
        let s = s.trim();
        if s == OVER_100GB {
            return Some(ByteSize::Over100Gb);
        }

        let digits_end = s.find(|c: char| !c.is_ascii_digit())?;
        if digits_end == 0 {
            return None;
        }
        let amount: u64 = s[..digits_end].parse().ok()?;
        let factor: u64 = match &s[digits_end..] {
            "B" => 1,
            "KB" => 1_000,
            "MB" => 1_000_000,
            "GB" => GB,
            "TB" => 1_000_000_000_000,
            _ => return None,
        };
        amount.checked_mul(factor).map(ByteSize::Bytes)
    }

    /// Size in bytes. The sentinel reports its lower bound of 100 GB.
    pub fn bytes(&self) -> u64 {
        match self {
            ByteSize::Bytes(n) => *n,
            ByteSize::Over100Gb => 100 * GB,
        }
    }

    /// Whether this size is at least `bytes` large. The sentinel answers
    /// from its 100 GB lower bound.
    pub fn at_least(&self, bytes: u64) -> bool {
        self.bytes() >= bytes
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, ByteSize::Over100Gb)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSize::Over100Gb => f.write_str(OVER_100GB),
            ByteSize::Bytes(n) => {
                // Largest unit that divides evenly, so parse(display) round-trips.
                let (amount, unit) = if *n >= 1_000_000_000_000 && n % 1_000_000_000_000 == 0 {
                    (n / 1_000_000_000_000, "TB")
                } else if *n >= GB && n % GB == 0 {
                    (n / GB, "GB")
                } else if *n >= 1_000_000 && n % 1_000_000 == 0 {
                    (n / 1_000_000, "MB")
                } else if *n >= 1_000 && n % 1_000 == 0 {
                    (n / 1_000, "KB")
                } else {
                    (*n, "B")
                };
                write!(f, "{}{}", amount, unit)
            }
        }
    }
}

/// Sum a collection of sizes to a byte total. Sentinels contribute their
/// 100 GB lower bound. An empty collection sums to 0.
pub fn sum_bytes<'a, I: IntoIterator<Item = &'a ByteSize>>(sizes: I) -> u64 {
    sizes.into_iter().map(ByteSize::bytes).sum()
}
