//! Decoding rows of the history view

use crate::error::{PunishmentError, PunishmentResult};
use crate::model::{
    EscalationTrack, Operator, Punishment, PunishmentType, Revocation, ServerScope, Victim,
    from_epoch_seconds,
};

/// One row of the history view, with vendor-specific integer decoding
/// already applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPunishment {
    pub id: i64,
    pub punishment_type: i64,
    pub victim_type: i64,
    pub victim_uuid: Vec<u8>,
    pub victim_address: Vec<u8>,
    pub operator: Vec<u8>,
    pub reason: String,
    pub scope_type: i64,
    pub scope: String,
    pub start_time: i64,
    pub end_time: i64,
    pub track_namespace: Option<String>,
    pub track_value: Option<String>,
    pub undo_operator: Option<Vec<u8>>,
    pub undo_reason: Option<String>,
    pub undo_time: Option<i64>,
}

impl RawPunishment {
    /// Convert into the data model
    ///
    /// # Errors
    /// Returns a `Corrupt` error if any column holds an impossible value
    pub fn into_punishment(self) -> PunishmentResult<Punishment> {
        let track = match (self.track_namespace, self.track_value) {
            (Some(namespace), Some(value)) => Some(
                EscalationTrack::new(namespace, value)
                    .map_err(|e| PunishmentError::corrupt(e.to_string()))?,
            ),
            (None, None) => None,
            _ => return Err(PunishmentError::corrupt(format!("half-set escalation track on {}", self.id))),
        };

        let revocation = match (self.undo_operator, self.undo_reason, self.undo_time) {
            (Some(operator), Some(reason), Some(time)) => Some(Revocation {
                operator: Operator::from_bytes(&operator)?,
                reason,
                instant: from_epoch_seconds(time)?,
            }),
            (None, None, None) => None,
            _ => return Err(PunishmentError::corrupt(format!("partial revocation on {}", self.id))),
        };

        Ok(Punishment {
            id: self.id,
            punishment_type: PunishmentType::from_code(self.punishment_type)?,
            victim: Victim::from_columns(self.victim_type, &self.victim_uuid, &self.victim_address)?,
            operator: Operator::from_bytes(&self.operator)?,
            reason: self.reason,
            scope: ServerScope::from_columns(self.scope_type, self.scope)?,
            start: from_epoch_seconds(self.start_time)?,
            end: match self.end_time {
                0 => None,
                end => Some(from_epoch_seconds(end)?),
            },
            track,
            revocation,
        })
    }
}

/// Narrow an unsigned column value
///
/// # Errors
/// Returns a `Corrupt` error if the value does not fit an `i64`
pub fn unsigned_to_i64(value: u64, column: &str) -> PunishmentResult<i64> {
    i64::try_from(value).map_err(|_| PunishmentError::corrupt(format!("{column} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn raw() -> RawPunishment {
        RawPunishment {
            id: 7,
            punishment_type: 0,
            victim_type: 0,
            victim_uuid: Uuid::new_v4().as_bytes().to_vec(),
            victim_address: Vec::new(),
            operator: vec![0; 16],
            reason: "griefing".into(),
            scope_type: 1,
            scope: "lobby".into(),
            start_time: 1_000,
            end_time: 0,
            track_namespace: None,
            track_value: None,
            undo_operator: None,
            undo_reason: None,
            undo_time: None,
        }
    }

    #[test]
    fn test_decode_permanent_ban() {
        let punishment = raw().into_punishment().unwrap();
        assert_eq!(punishment.id, 7);
        assert_eq!(punishment.punishment_type, PunishmentType::Ban);
        assert!(matches!(punishment.victim, Victim::Player(_)));
        assert_eq!(punishment.operator, Operator::Console);
        assert_eq!(punishment.scope, ServerScope::Server("lobby".into()));
        assert_eq!(punishment.start.timestamp(), 1_000);
        assert!(punishment.end.is_none());
        assert!(punishment.revocation.is_none());
    }

    #[test]
    fn test_decode_revoked_tracked() {
        let mut row = raw();
        row.end_time = 2_000;
        row.track_namespace = Some("spam".into());
        row.track_value = Some("chat".into());
        row.undo_operator = Some(vec![0; 16]);
        row.undo_reason = Some("appeal".into());
        row.undo_time = Some(1_500);

        let punishment = row.into_punishment().unwrap();
        assert_eq!(punishment.end.map(|end| end.timestamp()), Some(2_000));
        assert_eq!(punishment.track, Some(EscalationTrack::new("spam", "chat").unwrap()));
        let revocation = punishment.revocation.unwrap();
        assert_eq!(revocation.reason, "appeal");
        assert_eq!(revocation.instant.timestamp(), 1_500);
    }

    #[test]
    fn test_decode_rejects_corrupt_rows() {
        let mut row = raw();
        row.punishment_type = 12;
        assert!(matches!(row.into_punishment(), Err(PunishmentError::Corrupt(_))));

        let mut row = raw();
        row.undo_reason = Some("orphan".into());
        assert!(matches!(row.into_punishment(), Err(PunishmentError::Corrupt(_))));

        assert!(unsigned_to_i64(u64::MAX, "id").is_err());
        assert_eq!(unsigned_to_i64(5, "id").unwrap(), 5);
    }
}
