pub mod center;
pub mod config;
pub mod database;
pub mod enforcement;
pub mod error;
pub mod logging;
pub mod model;
pub mod punish;
pub mod select;

// Log targets
pub const PUNISH_TARGET: &str = "warden::punish";
pub const ENFORCEMENT_TARGET: &str = "warden::enforcement";
pub const STORAGE_TARGET: &str = "warden::storage";
pub const ERROR_TARGET: &str = "warden::error";
pub const CONSOLE_TARGET: &str = "warden";

pub use center::PunishmentCenter;
pub use config::Config;
pub use error::{PunishmentError, PunishmentResult};
pub use model::{DraftPunishment, Operator, Punishment, PunishmentType, ServerScope, Victim};
pub use punish::{EnforcementOptions, RevocationOrder};
pub use select::{SelectionOrder, SelectionPredicate};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
