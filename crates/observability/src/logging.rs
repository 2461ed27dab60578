//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `FR_LOG_LEVEL`: Log-Level oder Filter-Direktiven, Standard: info
//! - `FR_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "FR_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "FR_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Die Umgebungsvariablen haben Vorrang vor den uebergebenen Werten.
/// Ein zweiter Aufruf (z.B. in Tests) wird ignoriert.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let env_format = std::env::var(ENV_LOG_FORMAT).ok();
    let format = format_waehlen(env_format.as_deref(), format);

    let ergebnis = match format {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Waehlt das Format: Umgebung vor Konfiguration, ungueltige Werte -> text
fn format_waehlen<'a>(aus_env: Option<&'a str>, konfiguriert: &'a str) -> &'a str {
    match aus_env.unwrap_or(konfiguriert) {
        f if log_format_gueltig(f) => f,
        _ => "text",
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
