//! Enforcement service
//!
//! Requests are queued on a channel and carried out by a single spawned
//! task, which also periodically sweeps expired mutes and index entries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{
    ActionHandlerRegistry, Announcement, Broadcaster, Change, ConnectionRegistry, EnforcementError,
    EnforcementResult,
};
use crate::ENFORCEMENT_TARGET;
use crate::database::PunishmentStore;
use crate::logging::log_enforced;
use crate::model::Punishment;
use crate::punish::{Broadcasting, Enforcement, EnforcementOptions};

/// Applies and lifts the real-world effects of punishments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Enforcer: Send + Sync {
    async fn enforce(&self, punishment: &Punishment, options: &EnforcementOptions) -> EnforcementResult<()>;

    async fn unenforce(&self, punishment: &Punishment, options: &EnforcementOptions) -> EnforcementResult<()>;
}

type Reply = oneshot::Sender<EnforcementResult<()>>;

/// Request type for the enforcement task
#[derive(Debug)]
pub enum EnforcementRequest {
    Enforce {
        punishment: Punishment,
        options: EnforcementOptions,
        reply: Option<Reply>,
    },
    Unenforce {
        punishment: Punishment,
        options: EnforcementOptions,
        reply: Option<Reply>,
    },
    /// Sweep expired mutes and index entries now
    Prune,
    /// Shutdown the enforcement task
    Shutdown,
}

/// The state owned by the enforcement task
pub struct EnforcementDispatcher {
    handlers: ActionHandlerRegistry,
    connections: ConnectionRegistry,
    broadcaster: Arc<dyn Broadcaster>,
    store: Option<Arc<dyn PunishmentStore>>,
}

impl EnforcementDispatcher {
    #[must_use]
    pub fn new(connections: ConnectionRegistry, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            handlers: ActionHandlerRegistry::new(),
            connections,
            broadcaster,
            store: None,
        }
    }

    /// Also prune the store's expired index entries on every sweep
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PunishmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Apply a freshly enacted punishment
    ///
    /// # Errors
    /// Returns the first handler or broadcast failure
    pub async fn enforce(&self, punishment: &Punishment, options: &EnforcementOptions) -> EnforcementResult<()> {
        if options.enforcement() == Enforcement::Global {
            let affected = self.handlers.enforce(&self.connections, punishment).await?;
            log_enforced(punishment, "enforce", affected);
            self.broadcaster.synchronize(punishment, Change::Enacted).await?;
        }
        self.announce(punishment, Change::Enacted, options).await
    }

    /// Lift a freshly revoked punishment
    ///
    /// # Errors
    /// Returns the first handler or broadcast failure
    pub async fn unenforce(&self, punishment: &Punishment, options: &EnforcementOptions) -> EnforcementResult<()> {
        if options.enforcement() == Enforcement::Global {
            let affected = self.handlers.unenforce(&self.connections, punishment).await?;
            log_enforced(punishment, "unenforce", affected);
            self.broadcaster.synchronize(punishment, Change::Revoked).await?;
        }
        self.announce(punishment, Change::Revoked, options).await
    }

    async fn announce(&self, punishment: &Punishment, change: Change, options: &EnforcementOptions) -> EnforcementResult<()> {
        let silent = match options.broadcasting() {
            Broadcasting::None => return Ok(()),
            Broadcasting::Silent => true,
            Broadcasting::Normal => false,
        };
        let announcement = Announcement {
            punishment: punishment.clone(),
            change,
            silent,
            target_argument: options.target_argument().map(str::to_owned),
        };
        self.broadcaster.announce(&announcement).await
    }

    async fn prune(&self) {
        let mutes = self.connections.prune_mutes(Utc::now());
        let entries = match &self.store {
            Some(store) => match store.prune_expired().await {
                Ok(pruned) => pruned,
                Err(e) => {
                    error!(target: ENFORCEMENT_TARGET, error = %e, "Failed to prune expired punishments");
                    0
                }
            },
            None => 0,
        };
        debug!(target: ENFORCEMENT_TARGET, mutes, entries, "Pruned expired punishments");
    }

    /// The main enforcement task
    async fn run(self, mut rx: mpsc::Receiver<EnforcementRequest>, prune_interval: Duration) {
        info!(target: ENFORCEMENT_TARGET, "Starting enforcement task with {}s prune interval", prune_interval.as_secs());

        let mut interval = tokio::time::interval(prune_interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                request = rx.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    match request {
                        EnforcementRequest::Enforce { punishment, options, reply } => {
                            let result = self.enforce(&punishment, &options).await;
                            respond(reply, result);
                        }
                        EnforcementRequest::Unenforce { punishment, options, reply } => {
                            let result = self.unenforce(&punishment, &options).await;
                            respond(reply, result);
                        }
                        EnforcementRequest::Prune => self.prune().await,
                        EnforcementRequest::Shutdown => {
                            info!(target: ENFORCEMENT_TARGET, "Received shutdown request for enforcement task");
                            break;
                        }
                    }
                }

                _ = interval.tick() => self.prune().await,
            }
        }

        info!(target: ENFORCEMENT_TARGET, "Enforcement task shut down");
    }
}

fn respond(reply: Option<Reply>, result: EnforcementResult<()>) {
    match reply {
        // The caller may have stopped waiting
        Some(reply) => {
            let _ = reply.send(result);
        }
        None => {
            if let Err(e) = result {
                error!(target: ENFORCEMENT_TARGET, error = %e, "Enforcement failed");
            }
        }
    }
}

/// Handle to the enforcement task
#[derive(Clone)]
pub struct EnforcementService {
    tx: mpsc::Sender<EnforcementRequest>,
}

impl EnforcementService {
    /// Spawn the enforcement task
    #[must_use]
    pub fn start(
        dispatcher: EnforcementDispatcher,
        queue_capacity: usize,
        prune_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let handle = tokio::spawn(dispatcher.run(rx, prune_interval));
        (Self { tx }, handle)
    }

    async fn send(&self, request: EnforcementRequest) -> EnforcementResult<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EnforcementError::ChannelClosed)
    }

    /// Queue an enforcement without waiting for it
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the task is not running
    pub async fn dispatch(&self, punishment: Punishment, options: EnforcementOptions) -> EnforcementResult<()> {
        self.send(EnforcementRequest::Enforce {
            punishment,
            options,
            reply: None,
        })
        .await
    }

    /// Queue a request carrying a reply channel and wait for the outcome
    ///
    /// # Errors
    /// Returns the enforcement failure, or `ChannelClosed` if the task stopped
    pub async fn dispatch_and_wait(
        &self,
        request: impl FnOnce(Reply) -> EnforcementRequest,
    ) -> EnforcementResult<()> {
        let (reply, outcome) = oneshot::channel();
        self.send(request(reply)).await?;
        outcome.await.map_err(|_| EnforcementError::ChannelClosed)?
    }

    /// Ask the task to sweep expired punishments now
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the task is not running
    pub async fn prune(&self) -> EnforcementResult<()> {
        self.send(EnforcementRequest::Prune).await
    }

    /// Stop the task once queued requests are handled
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the task already stopped
    pub async fn shutdown(&self) -> EnforcementResult<()> {
        self.send(EnforcementRequest::Shutdown).await
    }
}

#[async_trait]
impl Enforcer for EnforcementService {
    async fn enforce(&self, punishment: &Punishment, options: &EnforcementOptions) -> EnforcementResult<()> {
        self.dispatch_and_wait(|reply| EnforcementRequest::Enforce {
            punishment: punishment.clone(),
            options: options.clone(),
            reply: Some(reply),
        })
        .await
    }

    async fn unenforce(&self, punishment: &Punishment, options: &EnforcementOptions) -> EnforcementResult<()> {
        self.dispatch_and_wait(|reply| EnforcementRequest::Unenforce {
            punishment: punishment.clone(),
            options: options.clone(),
            reply: Some(reply),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::{ConnectionMessage, MockBroadcaster};
    use crate::model::{NetworkAddress, Operator, PunishmentType, ServerScope, Victim};
    use uuid::Uuid;

    fn ban(uuid: Uuid) -> Punishment {
        Punishment {
            id: 11,
            punishment_type: PunishmentType::Ban,
            victim: Victim::Player(uuid),
            operator: Operator::Console,
            reason: "cheating".into(),
            scope: ServerScope::Global,
            start: Utc::now(),
            end: None,
            track: None,
            revocation: None,
        }
    }

    #[tokio::test]
    async fn test_enforce_through_task() {
        let connections = ConnectionRegistry::new();
        let uuid = Uuid::new_v4();
        let address: NetworkAddress = "10.2.2.2".parse().unwrap();
        let mut rx = connections.connect(uuid, address, "lobby", None);

        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_synchronize()
            .withf(|_, change| *change == Change::Enacted)
            .times(1)
            .returning(|_, _| Ok(()));
        broadcaster
            .expect_announce()
            .withf(|announcement| announcement.silent && announcement.target_argument.as_deref() == Some("Notch"))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = EnforcementDispatcher::new(connections.clone(), Arc::new(broadcaster));
        let (service, handle) = EnforcementService::start(dispatcher, 8, Duration::from_secs(60));

        let options = EnforcementOptions::builder()
            .broadcasting(Broadcasting::Silent)
            .target_argument("Notch")
            .build();
        service.enforce(&ban(uuid), &options).await.unwrap();
        assert!(matches!(rx.recv().await, Some(ConnectionMessage::Disconnect(_))));

        service.dispatch(ban(Uuid::new_v4()), EnforcementOptions::none()).await.unwrap();
        service.prune().await.unwrap();
        service.shutdown().await.unwrap();
        handle.await.unwrap();
        assert!(matches!(
            service.enforce(&ban(uuid), &options).await,
            Err(EnforcementError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_no_enforcement_no_broadcast() {
        let connections = ConnectionRegistry::new();
        let uuid = Uuid::new_v4();
        let address: NetworkAddress = "10.2.2.3".parse().unwrap();
        let _rx = connections.connect(uuid, address, "lobby", None);

        let mut broadcaster = MockBroadcaster::new();
        broadcaster.expect_synchronize().never();
        broadcaster.expect_announce().never();
        let dispatcher = EnforcementDispatcher::new(connections.clone(), Arc::new(broadcaster));

        dispatcher.enforce(&ban(uuid), &EnforcementOptions::none()).await.unwrap();
        assert_eq!(connections.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_reported() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_synchronize()
            .returning(|_, _| Err(EnforcementError::Broadcast("proxy unreachable".into())));
        let dispatcher = EnforcementDispatcher::new(ConnectionRegistry::new(), Arc::new(broadcaster));

        let result = dispatcher.unenforce(&ban(Uuid::new_v4()), &EnforcementOptions::default()).await;
        assert!(matches!(result, Err(EnforcementError::Broadcast(_))));
    }
}
