//! Punishment types and persisted punishments
//!
//! A [`Punishment`] only exists once the enactment engine has persisted it;
//! before that it is a [`DraftPunishment`](super::DraftPunishment).

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::{Operator, ServerScope, Victim};
use crate::error::{PunishmentError, PunishmentResult};

/// Kind of punishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum PunishmentType {
    #[display("ban")]
    Ban,
    #[display("mute")]
    Mute,
    #[display("warn")]
    Warn,
    #[display("kick")]
    Kick,
}

impl PunishmentType {
    /// All punishment types, in stored code order
    pub const ALL: [Self; 4] = [Self::Ban, Self::Mute, Self::Warn, Self::Kick];

    /// Singular types allow at most one active punishment per victim
    #[must_use]
    pub const fn is_singular(self) -> bool {
        matches!(self, Self::Ban | Self::Mute)
    }

    /// Instantaneous types are never active; they are history the moment they land
    #[must_use]
    pub const fn is_instantaneous(self) -> bool {
        matches!(self, Self::Kick)
    }

    /// Stored code of this type
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Ban => 0,
            Self::Mute => 1,
            Self::Warn => 2,
            Self::Kick => 3,
        }
    }

    /// Type for a stored code
    ///
    /// # Errors
    /// Returns a `Corrupt` error for unknown codes
    pub fn from_code(code: i64) -> PunishmentResult<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| PunishmentError::corrupt(format!("unknown punishment type {code}")))
    }
}

impl std::str::FromStr for PunishmentType {
    type Err = PunishmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| PunishmentError::invalid(format!("unknown punishment type '{s}'")))
    }
}

/// A named progression that groups punishments of increasing severity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("{namespace}:{value}")]
pub struct EscalationTrack {
    pub namespace: String,
    pub value: String,
}

impl EscalationTrack {
    /// Create a track
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if either part is blank
    pub fn new(namespace: impl Into<String>, value: impl Into<String>) -> PunishmentResult<Self> {
        let (namespace, value) = (namespace.into(), value.into());
        if namespace.trim().is_empty() || value.trim().is_empty() {
            return Err(PunishmentError::invalid("escalation track parts must not be blank"));
        }
        Ok(Self { namespace, value })
    }
}

/// Undo metadata of a revoked punishment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub operator: Operator,
    pub reason: String,
    pub instant: DateTime<Utc>,
}

/// A persisted punishment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punishment {
    /// Unique, monotonic id assigned by the store
    pub id: i64,
    pub punishment_type: PunishmentType,
    pub victim: Victim,
    pub operator: Operator,
    pub reason: String,
    pub scope: ServerScope,
    /// When the punishment was committed
    pub start: DateTime<Utc>,
    /// When the punishment lapses; `None` means never
    pub end: Option<DateTime<Utc>>,
    pub track: Option<EscalationTrack>,
    /// Present once the punishment has been revoked
    pub revocation: Option<Revocation>,
}

impl Punishment {
    /// Whether this punishment never lapses on its own
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.end.is_none()
    }

    /// Whether this punishment is active at `now`: not revoked and not expired
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.revocation.is_some() || self.punishment_type.is_instantaneous() {
            return false;
        }
        self.end.is_none_or(|end| end > now)
    }

    /// Whether this punishment is active right now
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Whether this punishment is expired or revoked
    #[must_use]
    pub fn is_historical(&self) -> bool {
        !self.is_active()
    }

    /// Whether this punishment has been revoked
    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    /// Time left until expiry, `None` if permanent
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.end
            .map(|end| (end - Utc::now()).max(Duration::zero()))
    }
}

/// Convert a stored epoch-seconds timestamp
///
/// # Errors
/// Returns a `Corrupt` error if the timestamp is out of range
pub fn from_epoch_seconds(seconds: i64) -> PunishmentResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| PunishmentError::corrupt(format!("timestamp {seconds} out of range")))
}

/// Stored form of an end timestamp: 0 for never
#[must_use]
pub fn end_to_epoch_seconds(end: Option<DateTime<Utc>>) -> i64 {
    end.map_or(0, |end| end.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(punishment_type: PunishmentType, end: Option<DateTime<Utc>>) -> Punishment {
        Punishment {
            id: 1,
            punishment_type,
            victim: Victim::Player(Uuid::new_v4()),
            operator: Operator::Console,
            reason: "cheating".into(),
            scope: ServerScope::Global,
            start: Utc::now(),
            end,
            track: None,
            revocation: None,
        }
    }

    #[test]
    fn test_type_codes() {
        for punishment_type in PunishmentType::ALL {
            assert_eq!(PunishmentType::from_code(punishment_type.code()).unwrap(), punishment_type);
        }
        assert!(PunishmentType::from_code(42).is_err());
        assert_eq!("BAN".parse::<PunishmentType>().unwrap(), PunishmentType::Ban);
        assert!("jail".parse::<PunishmentType>().is_err());
    }

    #[test]
    fn test_singular_types() {
        assert!(PunishmentType::Ban.is_singular());
        assert!(PunishmentType::Mute.is_singular());
        assert!(!PunishmentType::Warn.is_singular());
        assert!(!PunishmentType::Kick.is_singular());
    }

    #[test]
    fn test_activity() {
        let permanent = sample(PunishmentType::Ban, None);
        assert!(permanent.is_active());
        assert!(permanent.is_permanent());
        assert!(permanent.remaining().is_none());

        let expired = sample(PunishmentType::Mute, Some(Utc::now() - Duration::seconds(5)));
        assert!(expired.is_historical());

        let running = sample(PunishmentType::Mute, Some(Utc::now() + Duration::hours(1)));
        assert!(running.is_active());
        assert!(running.remaining().unwrap() > Duration::minutes(59));

        let mut revoked = sample(PunishmentType::Ban, None);
        revoked.revocation = Some(Revocation {
            operator: Operator::Console,
            reason: "appeal accepted".into(),
            instant: Utc::now(),
        });
        assert!(revoked.is_revoked());
        assert!(!revoked.is_active());

        let kick = sample(PunishmentType::Kick, None);
        assert!(!kick.is_active());
    }

    #[test]
    fn test_epoch_conversion() {
        assert_eq!(end_to_epoch_seconds(None), 0);
        let at = from_epoch_seconds(1_700_000_000).unwrap();
        assert_eq!(end_to_epoch_seconds(Some(at)), 1_700_000_000);
    }

    #[test]
    fn test_escalation_track() {
        let track = EscalationTrack::new("spam", "level-2").unwrap();
        assert_eq!(track.to_string(), "spam:level-2");
        assert!(EscalationTrack::new("", "x").is_err());
    }
}
