//! Konfiguration des Media-Relays

use funkrelais_protocol::SchutzProfil;
use funkrelais_sfu::SfuConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Standard-ICE-Passwort fuer STUN-Antworten
pub const STANDARD_ICE_PASSWORT: &str = "AAAAAAAAAAAaaaaaaaaaaa";

/// Konfiguration fuer einen lauschenden Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind-Adresse des UDP-Sockets
    pub bind_addr: SocketAddr,
    /// Kapazitaet der Queue zwischen Empfangs- und Dispatch-Worker
    pub queue_groesse: usize,
    /// Weck-Intervall des Dispatch-Workers
    pub weck_intervall: Duration,
    /// Pause nach dem Schliessen des Sockets
    pub nachlauf: Duration,
    /// Groesse des Empfangspuffers (maximale Paketgroesse)
    pub puffer_groesse: usize,
    /// Schluessel fuer MESSAGE-INTEGRITY in STUN-Antworten
    pub ice_passwort: String,
    /// Angebotene Schutzprofile beim ersten DTLS-Flight
    pub schutzprofile: Vec<SchutzProfil>,
    /// Pakete von Assoziationen ohne Konferenz an alle anderen senden
    pub broadcast_rueckfall: bool,
    /// Id der RTP-Erweiterung fuer den Audio-Pegel (RFC 6464)
    pub audio_level_id: u8,
    /// Konfiguration der Selective-Forwarding-Engine
    pub sfu: SfuConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 4443),
            queue_groesse: 10,
            weck_intervall: Duration::from_millis(10),
            nachlauf: Duration::from_millis(10),
            puffer_groesse: 2048,
            ice_passwort: STANDARD_ICE_PASSWORT.to_string(),
            schutzprofile: vec![SchutzProfil::AES128_CM_SHA1_80, SchutzProfil::AES128_CM_SHA1_32],
            broadcast_rueckfall: true,
            audio_level_id: 1,
            sfu: SfuConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Erstellt eine Konfiguration mit Standard-Werten fuer die gegebene Adresse
    pub fn neu(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }
}
