//! Fehlertypen des Media-Relays

use funkrelais_core::AssoziationsId;
use funkrelais_protocol::ProtokollFehler;
use thiserror::Error;

/// Result-Alias fuer Relay-Operationen
pub type RelayResult<T> = std::result::Result<T, RelayFehler>;

/// Fehler, die der Relay an Aufrufer und Kollaborateure meldet
#[derive(Debug, Error)]
pub enum RelayFehler {
    #[error("Unbekannte Assoziation: {0}")]
    UnbekannteAssoziation(AssoziationsId),

    #[error("Paket ist kein DTLS-Paket")]
    KeinDtlsPaket,

    #[error("Relay ist gestoppt")]
    Gestoppt,

    #[error("E/A-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    #[error("SRTP-Fehler: {0}")]
    Srtp(String),

    #[error("DTLS-Fehler: {0}")]
    Dtls(String),

    #[error("Tunnel-Fehler: {0}")]
    Tunnel(String),
}

impl RelayFehler {
    /// Prueft ob der Fehler durch eine unbekannte Assoziation entstand
    pub fn ist_unbekannte_assoziation(&self) -> bool {
        matches!(self, Self::UnbekannteAssoziation(_))
    }
}
