//! Funkrelais Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use funkrelais_observability::logging_initialisieren;
use funkrelais_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("FUNKRELAIS_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Funkrelais Server wird initialisiert"
    );

    Server::neu(config).starten().await?;

    Ok(())
}
