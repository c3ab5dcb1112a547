//! Recurrence rules: when a task repeats.
//!
//! A rule is a tagged union (interval, daily, weekly, monthly), each variant
//! carrying its own `enabled` flag. Wall-clock times are "HH:MM" strings in
//! the metadata file and parsed into [`ClockTime`] on load.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CarrelError, Result};

/// A wall-clock "HH:MM" time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(CarrelError::InvalidRecurrence(format!(
                "time out of range: {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }
}

impl FromStr for ClockTime {
    type Err = CarrelError;

    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| CarrelError::InvalidRecurrence(format!("unparseable time: '{s}'")))?;
        let hour: u8 = h
            .parse()
            .map_err(|_| CarrelError::InvalidRecurrence(format!("unparseable time: '{s}'")))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| CarrelError::InvalidRecurrence(format!("unparseable time: '{s}'")))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = CarrelError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ClockTime> for String {
    fn from(t: ClockTime) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// How/when a task repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Fire every N minutes, measured from the baseline. Purely additive:
    /// never catches up against wall-clock day boundaries.
    Interval {
        minutes: u32,
        #[serde(default = "bool_true")]
        enabled: bool,
    },
    /// Fire every day at a wall-clock time.
    Daily {
        time: ClockTime,
        #[serde(default = "bool_true")]
        enabled: bool,
    },
    /// Fire at `time` on the given weekdays (0 = Sunday .. 6 = Saturday).
    /// An empty set means every day.
    Weekly {
        time: ClockTime,
        #[serde(default)]
        days: BTreeSet<u8>,
        #[serde(default = "bool_true")]
        enabled: bool,
    },
    /// Fire at `time` on the given days of month (1..=31). An empty set
    /// means every day.
    Monthly {
        time: ClockTime,
        #[serde(default)]
        days: BTreeSet<u8>,
        #[serde(default = "bool_true")]
        enabled: bool,
    },
}

fn bool_true() -> bool {
    true
}

impl Recurrence {
    pub fn enabled(&self) -> bool {
        match self {
            Recurrence::Interval { enabled, .. }
            | Recurrence::Daily { enabled, .. }
            | Recurrence::Weekly { enabled, .. }
            | Recurrence::Monthly { enabled, .. } => *enabled,
        }
    }

    /// True for an enabled interval rule (the only kind the manual
    /// notify-now operation accepts).
    pub fn is_active_interval(&self) -> bool {
        matches!(self, Recurrence::Interval { enabled: true, .. })
    }

    /// Structural validation. Malformed rules resolve to "no trigger"
    /// rather than aborting a tick, but explicit writes reject them.
    pub fn validate(&self) -> Result<()> {
        match self {
            Recurrence::Interval { minutes: 0, .. } => Err(CarrelError::InvalidRecurrence(
                "interval must be at least one minute".into(),
            )),
            Recurrence::Interval { .. } | Recurrence::Daily { .. } => Ok(()),
            Recurrence::Weekly { days, .. } => {
                if let Some(d) = days.iter().find(|d| **d > 6) {
                    return Err(CarrelError::InvalidRecurrence(format!(
                        "weekday out of range: {d}"
                    )));
                }
                Ok(())
            }
            Recurrence::Monthly { days, .. } => {
                if let Some(d) = days.iter().find(|d| **d < 1 || **d > 31) {
                    return Err(CarrelError::InvalidRecurrence(format!(
                        "day of month out of range: {d}"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_parse() {
        let t: ClockTime = "09:30".parse().unwrap();
        assert_eq!((t.hour, t.minute), (9, 30));
        assert_eq!(t.to_string(), "09:30");
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("9.30".parse::<ClockTime>().is_err());
        assert!("aa:bb".parse::<ClockTime>().is_err());
    }

    #[test]
    fn test_serde_tagged_roundtrip() {
        let rule = Recurrence::Weekly {
            time: "08:00".parse().unwrap(),
            days: [1u8, 3].into_iter().collect(),
            enabled: true,
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"kind\":\"weekly\""));
        assert!(json.contains("\"08:00\""));
        let back: Recurrence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_enabled_defaults_to_true() {
        let rule: Recurrence =
            serde_json::from_str(r#"{"kind":"interval","minutes":25}"#).unwrap();
        assert!(rule.enabled());
        assert!(rule.is_active_interval());
    }

    #[test]
    fn test_validate() {
        assert!(Recurrence::Interval { minutes: 0, enabled: true }.validate().is_err());
        let bad_day = Recurrence::Weekly {
            time: "08:00".parse().unwrap(),
            days: [7u8].into_iter().collect(),
            enabled: true,
        };
        assert!(bad_day.validate().is_err());
        let bad_dom = Recurrence::Monthly {
            time: "08:00".parse().unwrap(),
            days: [0u8].into_iter().collect(),
            enabled: true,
        };
        assert!(bad_dom.validate().is_err());
    }
}
