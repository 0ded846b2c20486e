//! Inactivity escalation.
//!
//! Each user sits in one of three escalation levels derived from the time
//! since their last check-in. The monitor persists the level so that a
//! notification fires once per upward transition, not once per sweep.

pub mod monitor;

pub use monitor::{
    LivenessMonitor, LivenessStatus, MonitorSettings, SweepFailure, SweepReport, UserTransition,
};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Escalation level, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessLevel {
    Active,
    Warning,
    Emergency,
}

impl LivenessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessLevel::Active => "ACTIVE",
            LivenessLevel::Warning => "WARNING",
            LivenessLevel::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for LivenessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LivenessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(LivenessLevel::Active),
            "WARNING" => Ok(LivenessLevel::Warning),
            "EMERGENCY" => Ok(LivenessLevel::Emergency),
            other => Err(other.to_string()),
        }
    }
}

/// Persisted escalation level for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessState {
    pub user_id: String,
    pub state: LivenessLevel,
    pub entered_at: DateTime<Utc>,
}

/// Inactivity thresholds. `emergency_after` must exceed `warning_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warning_after: Duration,
    pub emergency_after: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_after: Duration::hours(24),
            emergency_after: Duration::hours(48),
        }
    }
}

impl Thresholds {
    /// Classify an inactivity duration. Lower bounds are inclusive.
    pub fn classify(&self, elapsed: Duration) -> LivenessLevel {
        if elapsed >= self.emergency_after {
            LivenessLevel::Emergency
        } else if elapsed >= self.warning_after {
            LivenessLevel::Warning
        } else {
            LivenessLevel::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries_are_inclusive_at_threshold() {
        let t = Thresholds::default();
        let hm = |h: i64, m: i64| Duration::hours(h) + Duration::minutes(m);
        assert_eq!(t.classify(hm(23, 59)), LivenessLevel::Active);
        assert_eq!(t.classify(hm(24, 0)), LivenessLevel::Warning);
        assert_eq!(t.classify(hm(47, 59)), LivenessLevel::Warning);
        assert_eq!(t.classify(hm(48, 0)), LivenessLevel::Emergency);
    }

    #[test]
    fn negative_elapsed_is_active() {
        // Clock skew can put a check-in slightly in the future.
        let t = Thresholds::default();
        assert_eq!(t.classify(Duration::minutes(-5)), LivenessLevel::Active);
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LivenessLevel::Active < LivenessLevel::Warning);
        assert!(LivenessLevel::Warning < LivenessLevel::Emergency);
        assert_eq!("WARNING".parse::<LivenessLevel>(), Ok(LivenessLevel::Warning));
    }

    proptest! {
        #[test]
        fn classification_never_decreases_with_elapsed(a in 0i64..400_000, b in 0i64..400_000) {
            let t = Thresholds::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(t.classify(Duration::seconds(lo)) <= t.classify(Duration::seconds(hi)));
        }
    }
}
