//! Live connections and the mute cache
//!
//! The host platform registers every player connection here and drains the
//! returned receiver for messages addressed to that player. Enforcement
//! looks up affected players by victim overlap and scope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use super::{EnforcementError, EnforcementResult};
use crate::ENFORCEMENT_TARGET;
use crate::model::{NetworkAddress, Punishment, ServerScope, Victim};

/// Message delivered to a connected player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    /// Close the connection with this message
    Disconnect(String),
    /// Show this message to the player
    Notify(String),
}

/// A connected player
#[derive(Debug, Clone)]
pub struct PlayerConnection {
    pub uuid: Uuid,
    pub address: NetworkAddress,
    pub server: String,
    pub category: Option<String>,
    sender: UnboundedSender<ConnectionMessage>,
}

impl PlayerConnection {
    /// The identity punishments are matched against
    #[must_use]
    pub const fn victim(&self) -> Victim {
        Victim::composite(self.uuid, self.address)
    }

    /// Whether a punishment in `scope` applies where this player is
    #[must_use]
    pub fn is_in_scope(&self, scope: &ServerScope) -> bool {
        match scope {
            ServerScope::Global => true,
            ServerScope::Server(name) => *name == self.server,
            ServerScope::Category(name) => self.category.as_deref() == Some(name.as_str()),
        }
    }

    /// Whether `punishment` applies to this player here
    #[must_use]
    pub fn is_affected_by(&self, punishment: &Punishment) -> bool {
        punishment.victim.overlaps(&self.victim()) && self.is_in_scope(&punishment.scope)
    }

    /// Deliver a message to the player
    ///
    /// # Errors
    /// Returns a `Connection` error if the player's receiver is gone
    pub fn send(&self, message: ConnectionMessage) -> EnforcementResult<()> {
        self.sender
            .send(message)
            .map_err(|_| EnforcementError::Connection(format!("player {} is no longer connected", self.uuid)))
    }
}

/// Registry of live connections and enforced mutes
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<Uuid, PlayerConnection>>,
    mutes: Arc<DashMap<i64, Punishment>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player; the receiver yields messages for them
    pub fn connect(
        &self,
        uuid: Uuid,
        address: NetworkAddress,
        server: impl Into<String>,
        category: Option<String>,
    ) -> UnboundedReceiver<ConnectionMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = PlayerConnection {
            uuid,
            address,
            server: server.into(),
            category,
            sender,
        };
        debug!(target: ENFORCEMENT_TARGET, player = %uuid, server = %connection.server, "Player connected");
        self.connections.insert(uuid, connection);
        receiver
    }

    pub fn disconnect(&self, uuid: Uuid) -> Option<PlayerConnection> {
        self.connections.remove(&uuid).map(|(_, connection)| connection)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections a punishment applies to
    #[must_use]
    pub fn affected_by(&self, punishment: &Punishment) -> Vec<PlayerConnection> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_affected_by(punishment))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remember an enforced mute
    pub fn register_mute(&self, punishment: &Punishment) {
        self.mutes.insert(punishment.id, punishment.clone());
    }

    pub fn remove_mute(&self, id: i64) -> Option<Punishment> {
        self.mutes.remove(&id).map(|(_, punishment)| punishment)
    }

    /// The mute stopping a connected player from chatting, if any
    #[must_use]
    pub fn is_muted(&self, uuid: Uuid) -> Option<Punishment> {
        let connection = self.connections.get(&uuid)?;
        let now = Utc::now();
        self.mutes
            .iter()
            .find(|entry| entry.value().is_active_at(now) && connection.is_affected_by(entry.value()))
            .map(|entry| entry.value().clone())
    }

    /// Forget mutes that lapsed before `now`
    pub fn prune_mutes(&self, now: DateTime<Utc>) -> usize {
        let before = self.mutes.len();
        self.mutes.retain(|_, punishment| punishment.is_active_at(now));
        before - self.mutes.len()
    }
}
