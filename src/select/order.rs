//! Selection orders
//!
//! A [`SelectionOrder`] is an immutable snapshot of filters built by a
//! [`SelectionOrderBuilder`]. Executing it against a store yields a lazy,
//! restartable stream of punishments, the first match, or a count. Results
//! are ordered by start time descending, ties broken by ascending id.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use super::SelectionPredicate;
use crate::database::PunishmentStore;
use crate::error::PunishmentResult;
use crate::model::{EscalationTrack, Operator, Punishment, PunishmentType, ServerScope, Victim};

/// Rows fetched per round trip while streaming
pub const PAGE_SIZE: u32 = 100;

/// Stream of punishments produced by executing a selection order
pub type PunishmentStream = BoxStream<'static, PunishmentResult<Punishment>>;

/// Keyset position after the last row handed out: `(start epoch seconds, id)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub start: i64,
    pub id: i64,
}

impl From<&Punishment> for PageCursor {
    fn from(punishment: &Punishment) -> Self {
        Self {
            start: punishment.start.timestamp(),
            id: punishment.id,
        }
    }
}

/// One page of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Resume strictly after this row
    pub after: Option<PageCursor>,
    /// Rows to skip before the first returned row
    pub offset: u32,
    /// Maximum rows to return
    pub limit: u32,
}

/// Immutable, composed query filter over punishments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOrder {
    types: SelectionPredicate<PunishmentType>,
    victims: SelectionPredicate<Victim>,
    operators: SelectionPredicate<Operator>,
    scopes: SelectionPredicate<ServerScope>,
    tracks: SelectionPredicate<EscalationTrack>,
    active_only: bool,
    skip: u32,
    limit: Option<u32>,
}

impl SelectionOrder {
    /// Start building a selection order
    #[must_use]
    pub fn builder() -> SelectionOrderBuilder {
        SelectionOrderBuilder::default()
    }

    #[must_use]
    pub const fn types(&self) -> &SelectionPredicate<PunishmentType> {
        &self.types
    }

    #[must_use]
    pub const fn victims(&self) -> &SelectionPredicate<Victim> {
        &self.victims
    }

    #[must_use]
    pub const fn operators(&self) -> &SelectionPredicate<Operator> {
        &self.operators
    }

    #[must_use]
    pub const fn scopes(&self) -> &SelectionPredicate<ServerScope> {
        &self.scopes
    }

    #[must_use]
    pub const fn escalation_tracks(&self) -> &SelectionPredicate<EscalationTrack> {
        &self.tracks
    }

    /// Whether only active punishments (not expired, not revoked) are selected
    #[must_use]
    pub const fn selects_active_only(&self) -> bool {
        self.active_only
    }

    #[must_use]
    pub const fn skip_count(&self) -> u32 {
        self.skip
    }

    /// Maximum punishments to retrieve; `None` is unlimited
    #[must_use]
    pub const fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Whether a punishment satisfies every filter of this order at `now`
    #[must_use]
    pub fn matches(&self, punishment: &Punishment, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.types.matches(&punishment.punishment_type)
            && self.victims.matches(&punishment.victim)
            && self.operators.matches(&punishment.operator)
            && self.scopes.matches(&punishment.scope)
            && punishment
                .track
                .as_ref()
                .map_or(!self.tracks.is_acceptance(), |track| self.tracks.matches(track))
            && (!self.active_only || punishment.is_active_at(now))
    }

    /// Lazily stream every matching punishment.
    ///
    /// Rows are fetched a page at a time. Each call to `stream` queries the
    /// store afresh, so a stream can be restarted by calling it again.
    #[must_use]
    pub fn stream(&self, store: Arc<dyn PunishmentStore>) -> PunishmentStream {
        let state = StreamState {
            order: self.clone(),
            store,
            buffer: VecDeque::new(),
            cursor: None,
            remaining: self.limit,
            exhausted: false,
        };
        stream::try_unfold(state, StreamState::next).boxed()
    }

    /// Collect every matching punishment
    ///
    /// # Errors
    /// Returns a `Storage` error if any page fails to load
    pub async fn all(&self, store: Arc<dyn PunishmentStore>) -> PunishmentResult<Vec<Punishment>> {
        self.stream(store).try_collect().await
    }

    /// The first matching punishment, if any
    ///
    /// # Errors
    /// Returns a `Storage` error if the query fails
    pub async fn first(&self, store: &dyn PunishmentStore) -> PunishmentResult<Option<Punishment>> {
        if self.limit == Some(0) {
            return Ok(None);
        }
        let request = PageRequest {
            after: None,
            offset: self.skip,
            limit: 1,
        };
        Ok(store.select_page(self, request).await?.into_iter().next())
    }

    /// Number of punishments this order would retrieve
    ///
    /// # Errors
    /// Returns a `Storage` error if the query fails
    pub async fn count(&self, store: &dyn PunishmentStore) -> PunishmentResult<u64> {
        let total = store.count(self).await?;
        let after_skip = total.saturating_sub(u64::from(self.skip));
        Ok(self
            .limit
            .map_or(after_skip, |limit| after_skip.min(u64::from(limit))))
    }
}

struct StreamState {
    order: SelectionOrder,
    store: Arc<dyn PunishmentStore>,
    buffer: VecDeque<Punishment>,
    cursor: Option<PageCursor>,
    remaining: Option<u32>,
    exhausted: bool,
}

impl StreamState {
    async fn next(mut self) -> PunishmentResult<Option<(Punishment, Self)>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }
            if let Some(punishment) = self.buffer.pop_front() {
                self.cursor = Some(PageCursor::from(&punishment));
                self.remaining = self.remaining.map(|n| n - 1);
                return Ok(Some((punishment, self)));
            }
            if self.exhausted {
                return Ok(None);
            }

            let limit = self.remaining.map_or(PAGE_SIZE, |n| n.min(PAGE_SIZE));
            let request = PageRequest {
                after: self.cursor,
                offset: if self.cursor.is_none() { self.order.skip } else { 0 },
                limit,
            };
            let page = self.store.select_page(&self.order, request).await?;
            debug!(rows = page.len(), after = ?self.cursor, "Fetched selection page");

            self.exhausted = page.len() < limit as usize;
            if page.is_empty() {
                return Ok(None);
            }
            self.buffer.extend(page);
        }
    }
}

/// Builder for [`SelectionOrder`]; every filter defaults to "match all" and
/// only active punishments are selected by default.
///
/// `build` may be called any number of times; each call snapshots the
/// builder's current state.
#[derive(Debug, Clone)]
pub struct SelectionOrderBuilder {
    types: SelectionPredicate<PunishmentType>,
    victims: SelectionPredicate<Victim>,
    operators: SelectionPredicate<Operator>,
    scopes: SelectionPredicate<ServerScope>,
    tracks: SelectionPredicate<EscalationTrack>,
    active_only: bool,
    skip: u32,
    limit: Option<u32>,
}

impl Default for SelectionOrderBuilder {
    fn default() -> Self {
        Self {
            types: SelectionPredicate::match_all(),
            victims: SelectionPredicate::match_all(),
            operators: SelectionPredicate::match_all(),
            scopes: SelectionPredicate::match_all(),
            tracks: SelectionPredicate::match_all(),
            active_only: true,
            skip: 0,
            limit: None,
        }
    }
}

impl SelectionOrderBuilder {
    /// Match one type, or all types with `None`
    pub fn punishment_type(&mut self, punishment_type: impl Into<Option<PunishmentType>>) -> &mut Self {
        let punishment_type: Option<PunishmentType> = punishment_type.into();
        self.types = punishment_type.into();
        self
    }

    pub fn types(&mut self, predicate: SelectionPredicate<PunishmentType>) -> &mut Self {
        self.types = predicate;
        self
    }

    /// Match one victim, or all victims with `None`
    pub fn victim(&mut self, victim: impl Into<Option<Victim>>) -> &mut Self {
        let victim: Option<Victim> = victim.into();
        self.victims = victim.into();
        self
    }

    pub fn victims(&mut self, predicate: SelectionPredicate<Victim>) -> &mut Self {
        self.victims = predicate;
        self
    }

    /// Match one operator, or all operators with `None`
    pub fn operator(&mut self, operator: impl Into<Option<Operator>>) -> &mut Self {
        let operator: Option<Operator> = operator.into();
        self.operators = operator.into();
        self
    }

    pub fn operators(&mut self, predicate: SelectionPredicate<Operator>) -> &mut Self {
        self.operators = predicate;
        self
    }

    /// Match one scope, or all scopes with `None`
    pub fn scope(&mut self, scope: impl Into<Option<ServerScope>>) -> &mut Self {
        let scope: Option<ServerScope> = scope.into();
        self.scopes = scope.into();
        self
    }

    pub fn scopes(&mut self, predicate: SelectionPredicate<ServerScope>) -> &mut Self {
        self.scopes = predicate;
        self
    }

    /// Match one escalation track, or any track (including none) with `None`
    pub fn escalation_track(&mut self, track: impl Into<Option<EscalationTrack>>) -> &mut Self {
        let track: Option<EscalationTrack> = track.into();
        self.tracks = track.into();
        self
    }

    pub fn escalation_tracks(&mut self, predicate: SelectionPredicate<EscalationTrack>) -> &mut Self {
        self.tracks = predicate;
        self
    }

    pub fn select_active_only(&mut self, active_only: bool) -> &mut Self {
        self.active_only = active_only;
        self
    }

    /// Select historical and expired punishments too
    pub fn select_all(&mut self) -> &mut Self {
        self.select_active_only(false)
    }

    pub fn skip_first_retrieved(&mut self, skip: u32) -> &mut Self {
        self.skip = skip;
        self
    }

    /// Retrieve at most `limit` punishments; 0 means unlimited
    pub fn limit_to_retrieve(&mut self, limit: u32) -> &mut Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Snapshot the builder into an independent selection order
    #[must_use]
    pub fn build(&self) -> SelectionOrder {
        SelectionOrder {
            types: self.types.clone(),
            victims: self.victims.clone(),
            operators: self.operators.clone(),
            scopes: self.scopes.clone(),
            tracks: self.tracks.clone(),
            active_only: self.active_only,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashSet;
    use uuid::Uuid;

    fn punishment(punishment_type: PunishmentType, victim: Victim) -> Punishment {
        Punishment {
            id: 1,
            punishment_type,
            victim,
            operator: Operator::Console,
            reason: "testing".into(),
            scope: ServerScope::Global,
            start: Utc::now(),
            end: None,
            track: None,
            revocation: None,
        }
    }

    #[test]
    fn test_builder_defaults() {
        let order = SelectionOrder::builder().build();
        assert!(order.selects_active_only());
        assert!(order.types().is_match_all());
        assert!(order.victims().is_match_all());
        assert!(order.operators().is_match_all());
        assert!(order.scopes().is_match_all());
        assert_eq!(order.skip_count(), 0);
        assert_eq!(order.limit(), None);
    }

    #[test]
    fn test_build_is_repeatable_and_independent() {
        let victim = Victim::Player(Uuid::new_v4());
        let mut builder = SelectionOrder::builder();
        builder.punishment_type(PunishmentType::Ban).victim(victim);
        let first = builder.build();

        builder.punishment_type(PunishmentType::Mute).select_all();
        let second = builder.build();

        assert_eq!(first.types().accepted_values(), HashSet::from([PunishmentType::Ban]));
        assert!(first.selects_active_only());
        assert_eq!(second.types().accepted_values(), HashSet::from([PunishmentType::Mute]));
        assert!(!second.selects_active_only());
        assert_eq!(first.victims(), second.victims());

        // Rebuilding without changes yields an equal snapshot
        assert_eq!(builder.build(), second);
    }

    #[test]
    fn test_null_resets_to_match_all() {
        let mut builder = SelectionOrder::builder();
        builder.punishment_type(PunishmentType::Warn);
        builder.punishment_type(None);
        assert!(builder.build().types().is_match_all());
    }

    #[test]
    fn test_limit_zero_is_unlimited() {
        let mut builder = SelectionOrder::builder();
        builder.limit_to_retrieve(5);
        assert_eq!(builder.build().limit(), Some(5));
        builder.limit_to_retrieve(0);
        assert_eq!(builder.build().limit(), None);
    }

    #[test]
    fn test_matches_in_memory() {
        let victim = Victim::Player(Uuid::new_v4());
        let mut builder = SelectionOrder::builder();
        builder.punishment_type(PunishmentType::Ban).victim(victim);
        let order = builder.build();
        let now = Utc::now();

        assert!(order.matches(&punishment(PunishmentType::Ban, victim), now));
        assert!(!order.matches(&punishment(PunishmentType::Mute, victim), now));

        let mut expired = punishment(PunishmentType::Ban, victim);
        expired.end = Some(now - Duration::minutes(1));
        assert!(!order.matches(&expired, now));

        builder.select_all();
        assert!(builder.build().matches(&expired, now));
    }
}
