//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use funkrelais_protocol::SchutzProfil;
use funkrelais_relay::config::STANDARD_ICE_PASSWORT;
use funkrelais_relay::RelayConfig;
use funkrelais_sfu::SfuConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP-Relay
    pub relay: RelayEinstellungen,
    /// Sprecher-Auswahl und Forwarding
    pub sfu: SfuEinstellungen,
    /// Key-Management-Peer
    pub kmf: KmfEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken)
    pub observability: ObservabilityEinstellungen,
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Bind-Adresse des UDP-Sockets
    pub bind_adresse: String,
    pub queue_groesse: usize,
    pub weck_intervall_ms: u64,
    pub nachlauf_ms: u64,
    pub puffer_groesse: usize,
    /// Passwort fuer MESSAGE-INTEGRITY in STUN-Antworten
    pub ice_passwort: String,
    /// DTLS-SRTP-Profil-Ids (RFC 5764 §4.1.2)
    pub schutzprofile: Vec<u16>,
    pub broadcast_rueckfall: bool,
    pub audio_level_id: u8,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0:4443".into(),
            queue_groesse: 10,
            weck_intervall_ms: 10,
            nachlauf_ms: 10,
            puffer_groesse: 2048,
            ice_passwort: STANDARD_ICE_PASSWORT.into(),
            schutzprofile: vec![
                SchutzProfil::AES128_CM_SHA1_80.0,
                SchutzProfil::AES128_CM_SHA1_32.0,
            ],
            broadcast_rueckfall: true,
            audio_level_id: 1,
        }
    }
}

/// SFU-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuEinstellungen {
    /// Audio-Payload-Typen pro Sprecher-Slot
    pub audio_payload_typen: Vec<u8>,
    pub sprecher_schwelle_db: f32,
    pub umschalt_sperre_ms: u64,
    pub neuer_anruf_abstand_ms: u64,
    pub glaettung: f32,
    /// 0 = FIB bei jeder Energie-Aktualisierung neu berechnen
    pub fib_mindestabstand_ms: u64,
}

impl Default for SfuEinstellungen {
    fn default() -> Self {
        let sfu = SfuConfig::default();
        Self {
            audio_payload_typen: sfu.audio_payload_typen,
            sprecher_schwelle_db: sfu.sprecher_schwelle_db,
            umschalt_sperre_ms: sfu.umschalt_sperre.as_millis() as u64,
            neuer_anruf_abstand_ms: sfu.neuer_anruf_abstand.as_millis() as u64,
            glaettung: sfu.glaettung,
            fib_mindestabstand_ms: sfu.fib_mindestabstand.as_millis() as u64,
        }
    }
}

/// Key-Management-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KmfEinstellungen {
    /// Adresse des Key-Management-Peers (leer = DTLS wird rundgesendet)
    pub adresse: Option<String>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Metriken-Server
    pub aktiviert: bool,
    pub bind_adresse: String,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "0.0.0.0:9300".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Baut die Relay-Konfiguration (inkl. SFU) aus den Einstellungen
    pub fn relay_config(&self) -> anyhow::Result<RelayConfig> {
        let r = &self.relay;
        let bind_addr: SocketAddr = r
            .bind_adresse
            .parse()
            .with_context(|| format!("Ungueltige Relay-Adresse '{}'", r.bind_adresse))?;

        Ok(RelayConfig {
            bind_addr,
            queue_groesse: r.queue_groesse,
            weck_intervall: Duration::from_millis(r.weck_intervall_ms),
            nachlauf: Duration::from_millis(r.nachlauf_ms),
            puffer_groesse: r.puffer_groesse,
            ice_passwort: r.ice_passwort.clone(),
            schutzprofile: r.schutzprofile.iter().copied().map(SchutzProfil).collect(),
            broadcast_rueckfall: r.broadcast_rueckfall,
            audio_level_id: r.audio_level_id,
            sfu: self.sfu_config(),
        })
    }

    pub fn sfu_config(&self) -> SfuConfig {
        let s = &self.sfu;
        SfuConfig {
            audio_payload_typen: s.audio_payload_typen.clone(),
            sprecher_schwelle_db: s.sprecher_schwelle_db,
            umschalt_sperre: Duration::from_millis(s.umschalt_sperre_ms),
            neuer_anruf_abstand: Duration::from_millis(s.neuer_anruf_abstand_ms),
            glaettung: s.glaettung,
            fib_mindestabstand: Duration::from_millis(s.fib_mindestabstand_ms),
        }
    }

    /// Bind-Adresse fuer den Metriken-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.observability.bind_adresse.parse().with_context(|| {
            format!(
                "Ungueltige Observability-Adresse '{}'",
                self.observability.bind_adresse
            )
        })
    }
}
