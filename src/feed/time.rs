use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Time of day on a service day, in seconds after midnight.
///
/// Values past 24:00:00 are valid and denote trips running after midnight
/// on the same service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime(u32);

impl ServiceTime {
    /// `None` when the time does not fit in the representable range.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Option<Self> {
        hours
            .checked_mul(3600)?
            .checked_add(minutes.checked_mul(60)?)?
            .checked_add(seconds)
            .map(Self)
    }

    pub fn plus_minutes(self, minutes: u32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(|secs| self.0.checked_add(secs))
            .map(Self)
    }

    /// `HHMMSS`, used to build stable trip identifiers.
    pub fn compact(self) -> String {
        format!(
            "{:02}{:02}{:02}",
            self.0 / 3600,
            (self.0 % 3600) / 60,
            self.0 % 60
        )
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 % 3600) / 60,
            self.0 % 60
        )
    }
}

impl FromStr for ServiceTime {
    type Err = String;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("'{s}' is not a valid time; HH:MM or HH:MM:SS expected");
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }
        let field = |p: &str| p.parse::<u32>().map_err(|_| invalid());
        let hours = field(parts[0])?;
        let minutes = field(parts[1])?;
        let seconds = match parts.get(2) {
            Some(p) => field(p)?,
            None => 0,
        };
        if minutes > 59 || seconds > 59 || parts[1].len() != 2 {
            return Err(invalid());
        }
        Self::from_hms(hours, minutes, seconds).ok_or_else(invalid)
    }
}

impl Serialize for ServiceTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ServiceTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
