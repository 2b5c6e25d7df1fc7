//! Enforcement action handlers
//!
//! One handler per punishment type decides what enforcing and unenforcing
//! means for live connections.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use super::{ConnectionMessage, ConnectionRegistry, EnforcementError, EnforcementResult};
use crate::ENFORCEMENT_TARGET;
use crate::model::{Punishment, PunishmentType};

/// Trait for applying a punishment to live connections
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Apply the punishment; returns how many connections were affected
    async fn enforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize>;

    /// Lift the punishment; returns how many connections were affected
    async fn unenforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize>;
}

/// Registry of action handlers
pub struct ActionHandlerRegistry {
    handlers: HashMap<PunishmentType, Box<dyn ActionHandler>>,
}

impl Default for ActionHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandlerRegistry {
    /// Create a new registry with all handlers registered
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };

        registry.register(PunishmentType::Ban, Box::new(DisconnectHandler));
        registry.register(PunishmentType::Kick, Box::new(DisconnectHandler));
        registry.register(PunishmentType::Mute, Box::new(MuteHandler));
        registry.register(PunishmentType::Warn, Box::new(WarnHandler));

        registry
    }

    /// Register a handler for a punishment type
    pub fn register(&mut self, punishment_type: PunishmentType, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(punishment_type, handler);
    }

    /// Get a handler for a punishment type
    #[must_use]
    pub fn get(&self, punishment_type: PunishmentType) -> Option<&dyn ActionHandler> {
        self.handlers.get(&punishment_type).map(AsRef::as_ref)
    }

    /// Enforce a punishment
    ///
    /// # Errors
    ///
    /// Returns `NoHandler` if no handler is registered for the punishment type.
    pub async fn enforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize> {
        let handler = self
            .get(punishment.punishment_type)
            .ok_or(EnforcementError::NoHandler(punishment.punishment_type))?;
        handler.enforce(connections, punishment).await
    }

    /// Unenforce a punishment
    ///
    /// # Errors
    ///
    /// Returns `NoHandler` if no handler is registered for the punishment type.
    pub async fn unenforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize> {
        let handler = self
            .get(punishment.punishment_type)
            .ok_or(EnforcementError::NoHandler(punishment.punishment_type))?;
        handler.unenforce(connections, punishment).await
    }
}

/// Send a message to every affected connection, counting deliveries
fn deliver(connections: &ConnectionRegistry, punishment: &Punishment, message: &ConnectionMessage) -> usize {
    connections
        .affected_by(punishment)
        .iter()
        .filter(|connection| match connection.send(message.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: ENFORCEMENT_TARGET, player = %connection.uuid, error = %e, "Could not reach player");
                false
            }
        })
        .count()
}

/// Handler for bans and kicks: affected players are disconnected
struct DisconnectHandler;

#[async_trait]
impl ActionHandler for DisconnectHandler {
    async fn enforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize> {
        let message = match punishment.punishment_type {
            PunishmentType::Kick => format!("You were kicked: {}", punishment.reason),
            _ => match punishment.end {
                Some(end) => format!("You are banned until {end}: {}", punishment.reason),
                None => format!("You are permanently banned: {}", punishment.reason),
            },
        };
        let affected = connections.affected_by(punishment);
        for connection in &affected {
            if let Err(e) = connection.send(ConnectionMessage::Disconnect(message.clone())) {
                warn!(target: ENFORCEMENT_TARGET, player = %connection.uuid, error = %e, "Could not reach player");
            }
            connections.disconnect(connection.uuid);
        }
        Ok(affected.len())
    }

    async fn unenforce(&self, _connections: &ConnectionRegistry, _punishment: &Punishment) -> EnforcementResult<usize> {
        // Banned players are not connected; nothing to lift
        Ok(0)
    }
}

/// Handler for mutes: the live mute cache is updated and players are told
struct MuteHandler;

#[async_trait]
impl ActionHandler for MuteHandler {
    async fn enforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize> {
        connections.register_mute(punishment);
        let message = ConnectionMessage::Notify(format!("You have been muted: {}", punishment.reason));
        Ok(deliver(connections, punishment, &message))
    }

    async fn unenforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize> {
        connections.remove_mute(punishment.id);
        let message = ConnectionMessage::Notify("You are no longer muted".to_string());
        Ok(deliver(connections, punishment, &message))
    }
}

/// Handler for warnings: players are told
struct WarnHandler;

#[async_trait]
impl ActionHandler for WarnHandler {
    async fn enforce(&self, connections: &ConnectionRegistry, punishment: &Punishment) -> EnforcementResult<usize> {
        let message = ConnectionMessage::Notify(format!("You have been warned: {}", punishment.reason));
        Ok(deliver(connections, punishment, &message))
    }

    async fn unenforce(&self, _connections: &ConnectionRegistry, _punishment: &Punishment) -> EnforcementResult<usize> {
        Ok(0)
    }
}
