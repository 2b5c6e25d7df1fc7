//! Enforcement options
//!
//! Options describe what should happen in the world after a punishment is
//! enacted or revoked. They never influence whether persistence happens.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::model::Operator;

/// Whether the real effect of a punishment is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum Enforcement {
    /// Record only
    #[display("none")]
    None,
    /// Apply on every server of the network
    #[default]
    #[display("global")]
    Global,
}

/// Whether and how a change is announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
pub enum Broadcasting {
    #[display("none")]
    None,
    /// Announced to staff only
    #[display("silent")]
    Silent,
    #[default]
    #[display("normal")]
    Normal,
}

/// Side effects requested for an enact or undo
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnforcementOptions {
    enforcement: Enforcement,
    broadcasting: Broadcasting,
    target_argument: Option<String>,
    un_operator: Option<Operator>,
}

impl EnforcementOptions {
    #[must_use]
    pub fn builder() -> EnforcementOptionsBuilder {
        EnforcementOptionsBuilder::default()
    }

    /// Neither enforce nor announce
    #[must_use]
    pub fn none() -> Self {
        Self {
            enforcement: Enforcement::None,
            broadcasting: Broadcasting::None,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    #[must_use]
    pub const fn broadcasting(&self) -> Broadcasting {
        self.broadcasting
    }

    /// The target as the invoker typed it, for message templates
    #[must_use]
    pub fn target_argument(&self) -> Option<&str> {
        self.target_argument.as_deref()
    }

    /// Who is undoing, when the revocation order does not say
    #[must_use]
    pub const fn un_operator(&self) -> Option<Operator> {
        self.un_operator
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnforcementOptionsBuilder {
    options: EnforcementOptions,
}

impl EnforcementOptionsBuilder {
    #[must_use]
    pub const fn enforcement(mut self, enforcement: Enforcement) -> Self {
        self.options.enforcement = enforcement;
        self
    }

    #[must_use]
    pub const fn broadcasting(mut self, broadcasting: Broadcasting) -> Self {
        self.options.broadcasting = broadcasting;
        self
    }

    #[must_use]
    pub fn target_argument(mut self, target: impl Into<String>) -> Self {
        self.options.target_argument = Some(target.into());
        self
    }

    #[must_use]
    pub const fn un_operator(mut self, operator: Operator) -> Self {
        self.options.un_operator = Some(operator);
        self
    }

    #[must_use]
    pub fn build(self) -> EnforcementOptions {
        self.options
    }
}
