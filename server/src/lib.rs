//! funkrelais-server – Bibliotheks-Root
//!
//! Verdrahtet Relay, Key-Management-Tunnel und Metriken. Relay und Tunnel
//! kennen sich nur ueber `RelayZustellung` bzw. `KmfTunnel`; beide gehoeren
//! dem [`Server`].

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use funkrelais_observability::{metrics_server_starten, RelayMetriken};
use funkrelais_relay::{KmfTunnel, MediaRelay, RelayZustellung, UdpWeiterleiter};
use std::sync::Arc;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. UDP-Socket des Relays binden
    /// 2. Key-Management-Tunnel mit dem Relay-Handle verbinden (optional)
    /// 3. Relay-Worker starten
    /// 4. Metriken-Server starten (optional)
    /// 5. Auf Ctrl-C warten, Relay stoppen
    pub async fn starten(self) -> Result<()> {
        let metriken = RelayMetriken::neu()?;
        let relay = MediaRelay::binden(self.config.relay_config()?)
            .await?
            .mit_metriken(metriken.clone());

        let tunnel: Option<Arc<dyn KmfTunnel>> = match &self.config.kmf.adresse {
            Some(adresse) => {
                let zustellung: Arc<dyn RelayZustellung> = Arc::new(relay.handle());
                Some(Arc::new(UdpWeiterleiter::verbinden(adresse, zustellung).await?))
            }
            None => {
                tracing::info!("Kein Key-Management konfiguriert, DTLS wird rundgesendet");
                None
            }
        };

        let laufend = relay.starten(tunnel);

        let metriken_task = if self.config.observability.aktiviert {
            let adresse = self.config.observability_bind_adresse()?;
            Some(tokio::spawn(async move {
                if let Err(e) = metrics_server_starten(adresse, metriken).await {
                    tracing::error!(fehler = %e, "Metriken-Server beendet");
                }
            }))
        } else {
            None
        };

        tracing::info!(
            relay = ?laufend.lokale_adresse(),
            kmf = ?self.config.kmf.adresse,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        laufend.stoppen().await;
        if let Some(task) = metriken_task {
            task.abort();
        }

        Ok(())
    }
}
