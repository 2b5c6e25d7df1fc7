//! Database vendors and their capability flags
//!
//! Vendor identity is resolved into [`StoreCapabilities`] and an
//! [`SqlDialect`] once, when the store is opened. Query code only ever looks
//! at those, never at the vendor itself.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Supported relational backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// MariaDB or MySQL server; atomic enactment through stored procedures
    #[display("MariaDB")]
    MariaDb,
    /// Embedded SQLite; enactment through explicit transactions
    #[display("SQLite")]
    Sqlite,
}

impl Vendor {
    /// Whether integer columns are declared unsigned
    #[must_use]
    pub const fn unsigned_numerics(self) -> bool {
        matches!(self, Self::MariaDb)
    }

    /// Whether singular enactment runs as a server-side procedure
    #[must_use]
    pub const fn use_enactment_procedures(self) -> bool {
        matches!(self, Self::MariaDb)
    }

    /// Whether a connection URL is meant for this vendor
    #[must_use]
    pub fn accepts_url(self, url: &str) -> bool {
        match self {
            Self::MariaDb => url.starts_with("mysql://") || url.starts_with("mariadb://"),
            Self::Sqlite => url.starts_with("sqlite:"),
        }
    }

    /// Resolve the capabilities of this vendor
    #[must_use]
    pub fn capabilities(self, table_prefix: impl Into<String>) -> StoreCapabilities {
        StoreCapabilities {
            unsigned_numerics: self.unsigned_numerics(),
            use_enactment_procedures: self.use_enactment_procedures(),
            table_prefix: table_prefix.into(),
            dialect: self.dialect(),
        }
    }

    const fn dialect(self) -> SqlDialect {
        match self {
            Self::MariaDb => SqlDialect {
                integer_key_type: None,
                auto_increment_key: "AUTO_INCREMENT PRIMARY KEY",
                uuid_type: "BINARY(16)",
                address_type: "VARBINARY(16)",
                short_text_type: "VARCHAR(64)",
                long_text_type: "VARCHAR(256)",
                create_view: "CREATE OR REPLACE VIEW",
                table_options: " ENGINE=InnoDB",
            },
            Self::Sqlite => SqlDialect {
                integer_key_type: Some("INTEGER"),
                auto_increment_key: "PRIMARY KEY AUTOINCREMENT",
                uuid_type: "BLOB",
                address_type: "BLOB",
                short_text_type: "TEXT",
                long_text_type: "TEXT",
                create_view: "CREATE VIEW IF NOT EXISTS",
                table_options: "",
            },
        }
    }
}

/// Syntax fragments that differ between vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect {
    /// Forced type of the auto-increment key column, if the vendor needs one
    pub integer_key_type: Option<&'static str>,
    pub auto_increment_key: &'static str,
    pub uuid_type: &'static str,
    pub address_type: &'static str,
    pub short_text_type: &'static str,
    pub long_text_type: &'static str,
    pub create_view: &'static str,
    pub table_options: &'static str,
}

/// Everything the store needs to know about its backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub unsigned_numerics: bool,
    pub use_enactment_procedures: bool,
    pub table_prefix: String,
    pub dialect: SqlDialect,
}

impl StoreCapabilities {
    /// Integer column type honouring the unsigned flag
    #[must_use]
    pub fn bigint(&self) -> &'static str {
        if self.unsigned_numerics {
            "BIGINT UNSIGNED"
        } else {
            "BIGINT"
        }
    }

    /// Small integer column type honouring the unsigned flag
    #[must_use]
    pub fn smallint(&self) -> &'static str {
        if self.unsigned_numerics {
            "SMALLINT UNSIGNED"
        } else {
            "SMALLINT"
        }
    }

    /// Full declaration of the auto-increment id column
    #[must_use]
    pub fn id_column(&self) -> String {
        let id_type = self.dialect.integer_key_type.unwrap_or_else(|| self.bigint());
        format!("id {id_type} NOT NULL {}", self.dialect.auto_increment_key)
    }

    /// Prefixed table, view or procedure name
    #[must_use]
    pub fn table(&self, name: &str) -> String {
        format!("{}{name}", self.table_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_flags() {
        assert!(Vendor::MariaDb.unsigned_numerics());
        assert!(Vendor::MariaDb.use_enactment_procedures());
        assert!(!Vendor::Sqlite.unsigned_numerics());
        assert!(!Vendor::Sqlite.use_enactment_procedures());
    }

    #[test]
    fn test_url_schemes() {
        assert!(Vendor::Sqlite.accepts_url("sqlite://warden.db?mode=rwc"));
        assert!(Vendor::Sqlite.accepts_url("sqlite::memory:"));
        assert!(!Vendor::Sqlite.accepts_url("mysql://localhost/warden"));
        assert!(Vendor::MariaDb.accepts_url("mariadb://localhost/warden"));
        assert!(!Vendor::MariaDb.accepts_url("warden.db"));
    }

    #[test]
    fn test_capabilities() {
        let capabilities = Vendor::Sqlite.capabilities("warden_");
        assert_eq!(capabilities.bigint(), "BIGINT");
        assert_eq!(capabilities.table("punishments"), "warden_punishments");
        assert_eq!(capabilities.id_column(), "id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT");

        let capabilities = Vendor::MariaDb.capabilities("");
        assert_eq!(capabilities.bigint(), "BIGINT UNSIGNED");
        assert_eq!(capabilities.table("punishments"), "punishments");
        assert_eq!(
            capabilities.id_column(),
            "id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"
        );
    }

    #[test]
    fn test_vendor_yaml_names() {
        let vendor: Vendor = serde_yaml::from_str("mariadb").unwrap();
        assert_eq!(vendor, Vendor::MariaDb);
        assert_eq!(serde_yaml::to_string(&Vendor::Sqlite).unwrap().trim(), "sqlite");
    }
}
