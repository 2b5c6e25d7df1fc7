use crate::config::LoggingConfig;
use crate::model::{Punishment, PunishmentType, Victim};
use crate::{CONSOLE_TARGET, ENFORCEMENT_TARGET, ERROR_TARGET, PUNISH_TARGET};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the logging system with console and file outputs
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Create log directory if it doesn't exist
    if !Path::new(&config.directory).exists() {
        std::fs::create_dir_all(&config.directory)?;
    }

    // Audit log with daily rotation
    let audit_file = RollingFileAppender::new(Rotation::DAILY, &config.directory, &config.file_name);

    // Console output (human-readable format)
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Audit output (JSON format)
    let audit_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(audit_file);

    // RUST_LOG wins over the configured level; sqlx statement logging is noisy
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?.add_directive("sqlx=warn".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(audit_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

/// Log a committed punishment
pub fn log_enacted(punishment: &Punishment) {
    info!(
        target: PUNISH_TARGET,
        punishment_id = punishment.id,
        punishment_type = %punishment.punishment_type,
        victim = %punishment.victim,
        operator = %punishment.operator,
        scope = %punishment.scope,
        end = ?punishment.end,
        event = "enacted",
        "Punishment enacted"
    );
}

/// Log an enactment refused because the victim is already punished
pub fn log_conflict(punishment_type: PunishmentType, victim: &Victim) {
    info!(
        target: PUNISH_TARGET,
        punishment_type = %punishment_type,
        victim = %victim,
        event = "conflict",
        "Victim already has an active punishment of this type"
    );
}

/// Log a committed revocation
pub fn log_revoked(punishment: &Punishment) {
    let (undo_operator, undo_reason) = punishment
        .revocation
        .as_ref()
        .map_or(("unknown".to_string(), ""), |r| (r.operator.to_string(), r.reason.as_str()));
    info!(
        target: PUNISH_TARGET,
        punishment_id = punishment.id,
        punishment_type = %punishment.punishment_type,
        victim = %punishment.victim,
        undo_operator = %undo_operator,
        undo_reason = %undo_reason,
        event = "revoked",
        "Punishment revoked"
    );
}

/// Log an operation stopped by a cancelled or timed-out event
pub fn log_cancelled(action: &str, punishment_type: PunishmentType) {
    warn!(
        target: PUNISH_TARGET,
        action = %action,
        punishment_type = %punishment_type,
        event = "cancelled",
        "Event cancelled the operation"
    );
}

/// Log a failed enforcement; the punishment itself stays committed
pub fn log_enforcement_failure(punishment: &Punishment, action: &str, error: &dyn std::error::Error) {
    error!(
        target: ERROR_TARGET,
        punishment_id = punishment.id,
        punishment_type = %punishment.punishment_type,
        victim = %punishment.victim,
        action = %action,
        error = %error,
        "Enforcement failed"
    );
}

/// Log an enforcement action carried out on live connections
pub fn log_enforced(punishment: &Punishment, action: &str, affected: usize) {
    info!(
        target: ENFORCEMENT_TARGET,
        punishment_id = punishment.id,
        punishment_type = %punishment.punishment_type,
        action = %action,
        affected = affected,
        event = "enforced",
        "Enforcement applied"
    );
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
