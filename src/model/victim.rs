//! Victims of punishments
//!
//! A victim is either a player, a network address, or a composite pairing of
//! both. Composite victims overlap with the player and the address they are
//! made of, which is what conflict detection and revocation rely on.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

use crate::error::{PunishmentError, PunishmentResult};

/// An IPv4 or IPv6 address a punishment can be keyed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[display("{_0}")]
pub struct NetworkAddress(IpAddr);

impl NetworkAddress {
    /// The address standing in for "any address" inside a composite victim
    pub const WILDCARD: Self = Self(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    /// Wrap an IP address
    #[must_use]
    pub const fn new(address: IpAddr) -> Self {
        Self(address)
    }

    /// The wrapped IP address
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.0
    }

    /// Whether this is the composite wildcard address
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }

    /// Raw network-order bytes: 4 for IPv4, 16 for IPv6
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.0 {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    /// Parse raw bytes as stored by [`Self::to_bytes`]
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if the slice is neither 4 nor 16 bytes long
    pub fn from_bytes(bytes: &[u8]) -> PunishmentResult<Self> {
        if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
            return Ok(Self(IpAddr::V4(Ipv4Addr::from(octets))));
        }
        if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
            return Ok(Self(IpAddr::V6(Ipv6Addr::from(octets))));
        }
        Err(PunishmentError::invalid(format!(
            "network address must be 4 or 16 bytes, got {}",
            bytes.len()
        )))
    }
}

impl std::str::FromStr for NetworkAddress {
    type Err = PunishmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(Self)
            .map_err(|e| PunishmentError::invalid(format!("malformed address '{s}': {e}")))
    }
}

/// Discriminant of a [`Victim`], as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum VictimType {
    #[display("player")]
    Player,
    #[display("address")]
    Address,
    #[display("composite")]
    Composite,
}

impl VictimType {
    /// Stored code of this victim type
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Player => 0,
            Self::Address => 1,
            Self::Composite => 2,
        }
    }

    /// Victim type for a stored code
    ///
    /// # Errors
    /// Returns a `Corrupt` error for unknown codes
    pub fn from_code(code: i64) -> PunishmentResult<Self> {
        match code {
            0 => Ok(Self::Player),
            1 => Ok(Self::Address),
            2 => Ok(Self::Composite),
            other => Err(PunishmentError::corrupt(format!("unknown victim type {other}"))),
        }
    }
}

/// Who a punishment is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Victim {
    /// A player, by UUID
    #[display("player:{_0}")]
    Player(Uuid),
    /// A network address
    #[display("address:{_0}")]
    Address(NetworkAddress),
    /// A player and an address together; either component may be a wildcard
    #[display("composite:{uuid}/{address}")]
    Composite { uuid: Uuid, address: NetworkAddress },
}

impl Victim {
    /// The UUID standing in for "any player" inside a composite victim
    pub const WILDCARD_UUID: Uuid = Uuid::nil();

    /// Shorthand for a composite victim
    #[must_use]
    pub const fn composite(uuid: Uuid, address: NetworkAddress) -> Self {
        Self::Composite { uuid, address }
    }

    /// The discriminant of this victim
    #[must_use]
    pub const fn victim_type(&self) -> VictimType {
        match self {
            Self::Player(_) => VictimType::Player,
            Self::Address(_) => VictimType::Address,
            Self::Composite { .. } => VictimType::Composite,
        }
    }

    /// The player component, if any; wildcards count as absent
    #[must_use]
    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            Self::Player(uuid) | Self::Composite { uuid, .. } if *uuid != Self::WILDCARD_UUID => {
                Some(*uuid)
            }
            _ => None,
        }
    }

    /// The address component, if any; wildcards count as absent
    #[must_use]
    pub fn address(&self) -> Option<NetworkAddress> {
        match self {
            Self::Address(address) | Self::Composite { address, .. } if !address.is_wildcard() => {
                Some(*address)
            }
            _ => None,
        }
    }

    /// Whether this victim names a real player or address.
    ///
    /// The wildcard markers only have meaning inside a composite, and a
    /// composite needs at least one real component.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Player(_) => self.uuid().is_some(),
            Self::Address(_) => self.address().is_some(),
            Self::Composite { .. } => self.uuid().is_some() || self.address().is_some(),
        }
    }

    /// The composite wildcard covering this victim.
    ///
    /// A player becomes `Composite(uuid, *)`, an address `Composite(*, address)`,
    /// and a composite victim stays as it is.
    #[must_use]
    pub fn composite_wildcard(&self) -> Self {
        match *self {
            Self::Player(uuid) => Self::composite(uuid, NetworkAddress::WILDCARD),
            Self::Address(address) => Self::composite(Self::WILDCARD_UUID, address),
            composite @ Self::Composite { .. } => composite,
        }
    }

    /// Whether a punishment keyed to `other` also applies to this victim.
    ///
    /// Player(U) overlaps Composite(U, *) and Address(A) overlaps Composite(*, A).
    /// Two composites overlap when they share a non-wildcard component. The
    /// relation is symmetric.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let same_uuid = matches!((self.uuid(), other.uuid()), (Some(a), Some(b)) if a == b);
        let same_address =
            matches!((self.address(), other.address()), (Some(a), Some(b)) if a == b);
        match (self, other) {
            (Self::Player(_), Self::Address(_)) | (Self::Address(_), Self::Player(_)) => false,
            (Self::Player(_), _) | (_, Self::Player(_)) => same_uuid,
            (Self::Address(_), _) | (_, Self::Address(_)) => same_address,
            _ => same_uuid || same_address,
        }
    }

    /// Stored form of the UUID column: nil when there is no player component
    #[must_use]
    pub fn uuid_bytes(&self) -> Vec<u8> {
        match self {
            Self::Player(uuid) | Self::Composite { uuid, .. } => uuid.as_bytes().to_vec(),
            Self::Address(_) => Uuid::nil().as_bytes().to_vec(),
        }
    }

    /// Stored form of the address column: empty when there is no address component
    #[must_use]
    pub fn address_bytes(&self) -> Vec<u8> {
        match self {
            Self::Player(_) => Vec::new(),
            Self::Address(address) | Self::Composite { address, .. } => address.to_bytes(),
        }
    }

    /// Rebuild a victim from its stored columns
    ///
    /// # Errors
    /// Returns a `Corrupt` error if the columns do not describe a valid victim
    pub fn from_columns(victim_type: i64, uuid: &[u8], address: &[u8]) -> PunishmentResult<Self> {
        let uuid = || {
            Uuid::from_slice(uuid)
                .map_err(|e| PunishmentError::corrupt(format!("victim uuid: {e}")))
        };
        let address = || {
            NetworkAddress::from_bytes(address)
                .map_err(|e| PunishmentError::corrupt(format!("victim address: {e}")))
        };
        Ok(match VictimType::from_code(victim_type)? {
            VictimType::Player => Self::Player(uuid()?),
            VictimType::Address => Self::Address(address()?),
            VictimType::Composite => Self::composite(uuid()?, address()?),
        })
    }
}
