//! Operators: whoever issued or revoked a punishment

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PunishmentError, PunishmentResult};

/// The staff member or system that performed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum Operator {
    /// A player operator, by UUID. The nil UUID is reserved for the console.
    #[display("player:{_0}")]
    Player(Uuid),
    /// The console or any automated system
    #[default]
    #[display("console")]
    Console,
}

impl Operator {
    /// A player operator
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error for the nil UUID, which is stored
    /// as the console
    pub fn player(uuid: Uuid) -> PunishmentResult<Self> {
        let operator = Self::Player(uuid);
        operator.validate()?;
        Ok(operator)
    }

    /// Check that this operator survives storage unchanged
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error for a player with the nil UUID
    pub fn validate(&self) -> PunishmentResult<()> {
        match self {
            Self::Player(uuid) if uuid.is_nil() => Err(PunishmentError::invalid(
                "the nil UUID is reserved for the console operator",
            )),
            _ => Ok(()),
        }
    }

    /// Stored form: the player's UUID, or the nil UUID for the console
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Player(uuid) => uuid.as_bytes().to_vec(),
            Self::Console => Uuid::nil().as_bytes().to_vec(),
        }
    }

    /// Rebuild an operator from its stored form
    ///
    /// # Errors
    /// Returns a `Corrupt` error if the bytes are not a UUID
    pub fn from_bytes(bytes: &[u8]) -> PunishmentResult<Self> {
        let uuid = Uuid::from_slice(bytes)
            .map_err(|e| PunishmentError::corrupt(format!("operator: {e}")))?;
        Ok(if uuid.is_nil() {
            Self::Console
        } else {
            Self::Player(uuid)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_is_nil_uuid() {
        assert_eq!(Operator::Console.to_bytes(), vec![0u8; 16]);
        assert_eq!(Operator::from_bytes(&[0u8; 16]).unwrap(), Operator::Console);
    }

    #[test]
    fn test_nil_player_rejected() {
        assert!(matches!(
            Operator::player(Uuid::nil()),
            Err(PunishmentError::InvalidArgument(_))
        ));
        assert!(Operator::Player(Uuid::nil()).validate().is_err());
        assert!(Operator::Console.validate().is_ok());

        let uuid = Uuid::new_v4();
        assert_eq!(Operator::player(uuid).unwrap(), Operator::Player(uuid));
    }

    #[test]
    fn test_player_bytes() {
        let uuid = Uuid::new_v4();
        let operator = Operator::Player(uuid);
        assert_eq!(Operator::from_bytes(&operator.to_bytes()).unwrap(), operator);
        assert!(Operator::from_bytes(&[1, 2]).is_err());
    }
}
