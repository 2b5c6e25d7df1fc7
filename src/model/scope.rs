//! Server scopes

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{PunishmentError, PunishmentResult};

/// Where on the network a punishment applies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum ServerScope {
    /// Every server on the network
    #[default]
    #[display("global")]
    Global,
    /// A single named server
    #[display("server:{_0}")]
    Server(String),
    /// A named group of servers
    #[display("category:{_0}")]
    Category(String),
}

impl ServerScope {
    /// A scope for one server
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if the name is blank
    pub fn server(name: impl Into<String>) -> PunishmentResult<Self> {
        Ok(Self::Server(Self::checked_name(name.into())?))
    }

    /// A scope for a group of servers
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if the name is blank
    pub fn category(name: impl Into<String>) -> PunishmentResult<Self> {
        Ok(Self::Category(Self::checked_name(name.into())?))
    }

    fn checked_name(name: String) -> PunishmentResult<String> {
        if name.trim().is_empty() {
            return Err(PunishmentError::invalid("scope name must not be blank"));
        }
        Ok(name)
    }

    /// Stored scope type code
    #[must_use]
    pub const fn type_code(&self) -> i64 {
        match self {
            Self::Global => 0,
            Self::Server(_) => 1,
            Self::Category(_) => 2,
        }
    }

    /// Stored scope value; empty for the global scope
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Global => "",
            Self::Server(name) | Self::Category(name) => name,
        }
    }

    /// Rebuild a scope from its stored columns
    ///
    /// # Errors
    /// Returns a `Corrupt` error for unknown type codes
    pub fn from_columns(type_code: i64, value: String) -> PunishmentResult<Self> {
        match type_code {
            0 => Ok(Self::Global),
            1 => Ok(Self::Server(value)),
            2 => Ok(Self::Category(value)),
            other => Err(PunishmentError::corrupt(format!("unknown scope type {other}"))),
        }
    }
}
