//! Punishment selection
//!
//! Predicates describe which values a filter accepts; selection orders
//! combine them into executable queries.

mod order;
mod predicate;

pub use order::{
    PAGE_SIZE, PageCursor, PageRequest, PunishmentStream, SelectionOrder, SelectionOrderBuilder,
};
pub use predicate::SelectionPredicate;
