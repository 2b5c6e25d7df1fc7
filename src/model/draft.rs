//! Draft punishments
//!
//! A draft carries everything needed to enact a punishment except the id and
//! the start time, which are assigned by the store at commit time.

use chrono::{DateTime, Duration, Utc};

use super::{EscalationTrack, Operator, PunishmentType, ServerScope, Victim};
use crate::error::{PunishmentError, PunishmentResult};

/// Longest duration a draft may carry, in seconds (1000 years)
pub const MAX_DURATION_SECONDS: i64 = 1000 * 365 * 86_400;

/// A punishment that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPunishment {
    punishment_type: PunishmentType,
    victim: Victim,
    operator: Operator,
    reason: String,
    scope: ServerScope,
    duration: Duration,
    track: Option<EscalationTrack>,
}

impl DraftPunishment {
    /// Start building a draft
    #[must_use]
    pub fn builder() -> DraftPunishmentBuilder {
        DraftPunishmentBuilder::default()
    }

    #[must_use]
    pub const fn punishment_type(&self) -> PunishmentType {
        self.punishment_type
    }

    #[must_use]
    pub const fn victim(&self) -> &Victim {
        &self.victim
    }

    #[must_use]
    pub const fn operator(&self) -> &Operator {
        &self.operator
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub const fn scope(&self) -> &ServerScope {
        &self.scope
    }

    /// Requested duration in whole seconds; zero means permanent
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// The duration as stored, 0 for permanent punishments
    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        if self.is_permanent() {
            0
        } else {
            self.duration.num_seconds()
        }
    }

    #[must_use]
    pub const fn escalation_track(&self) -> Option<&EscalationTrack> {
        self.track.as_ref()
    }

    /// Whether the enacted punishment will never lapse
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.punishment_type.is_instantaneous() && self.duration <= Duration::zero()
    }

    /// End time of this draft if it were committed at `start`.
    ///
    /// Instantaneous punishments end the moment they start.
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if the end is not representable
    pub fn end_from(&self, start: DateTime<Utc>) -> PunishmentResult<Option<DateTime<Utc>>> {
        if self.punishment_type.is_instantaneous() {
            Ok(Some(start))
        } else if self.is_permanent() {
            Ok(None)
        } else {
            start
                .checked_add_signed(self.duration)
                .map(Some)
                .ok_or_else(|| PunishmentError::invalid("punishment end is out of range"))
        }
    }
}

/// Builder for [`DraftPunishment`]; scope defaults to global, duration to permanent
#[derive(Debug, Clone)]
pub struct DraftPunishmentBuilder {
    punishment_type: Option<PunishmentType>,
    victim: Option<Victim>,
    operator: Option<Operator>,
    reason: Option<String>,
    scope: ServerScope,
    duration: Duration,
    track: Option<EscalationTrack>,
}

impl Default for DraftPunishmentBuilder {
    fn default() -> Self {
        Self {
            punishment_type: None,
            victim: None,
            operator: None,
            reason: None,
            scope: ServerScope::Global,
            duration: Duration::zero(),
            track: None,
        }
    }
}

impl DraftPunishmentBuilder {
    #[must_use]
    pub fn punishment_type(mut self, punishment_type: PunishmentType) -> Self {
        self.punishment_type = Some(punishment_type);
        self
    }

    #[must_use]
    pub fn victim(mut self, victim: Victim) -> Self {
        self.victim = Some(victim);
        self
    }

    #[must_use]
    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: ServerScope) -> Self {
        self.scope = scope;
        self
    }

    /// Zero or negative durations mean permanent. Positive durations are
    /// rounded up to whole seconds when the draft is built.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn escalation_track(mut self, track: Option<EscalationTrack>) -> Self {
        self.track = track;
        self
    }

    /// Build the draft
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if the type, victim, operator or
    /// reason was never set, if the victim or operator is a reserved wildcard
    /// value, or if the duration is not below [`MAX_DURATION_SECONDS`]
    pub fn build(self) -> Result<DraftPunishment, PunishmentError> {
        let missing = |field: &str| PunishmentError::invalid(format!("{field} is required"));
        let punishment_type = self.punishment_type.ok_or_else(|| missing("type"))?;
        let victim = self.victim.ok_or_else(|| missing("victim"))?;
        if !victim.is_concrete() {
            return Err(PunishmentError::invalid(format!("{victim} is a wildcard, not a victim")));
        }
        let operator = self.operator.ok_or_else(|| missing("operator"))?;
        operator.validate()?;
        let duration = whole_seconds(self.duration)?;
        Ok(DraftPunishment {
            punishment_type,
            victim,
            operator,
            reason: self.reason.ok_or_else(|| missing("reason"))?,
            scope: self.scope,
            duration,
            track: self.track,
        })
    }
}

/// Round a positive duration up to whole seconds; non-positive becomes zero
fn whole_seconds(duration: Duration) -> PunishmentResult<Duration> {
    if duration <= Duration::zero() {
        return Ok(Duration::zero());
    }
    let seconds = duration.num_seconds();
    if seconds >= MAX_DURATION_SECONDS {
        return Err(PunishmentError::invalid(format!(
            "duration of {seconds}s exceeds the maximum of {MAX_DURATION_SECONDS}s"
        )));
    }
    if duration > Duration::seconds(seconds) {
        Ok(Duration::seconds(seconds + 1))
    } else {
        Ok(Duration::seconds(seconds))
    }
}

/// Shorthand for a builder pre-filled with every required field
#[must_use]
pub fn draft(
    punishment_type: PunishmentType,
    victim: Victim,
    operator: Operator,
    reason: impl Into<String>,
) -> DraftPunishmentBuilder {
    DraftPunishment::builder()
        .punishment_type(punishment_type)
        .victim(victim)
        .operator(operator)
        .reason(reason)
}
