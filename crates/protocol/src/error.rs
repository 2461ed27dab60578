//! Fehlertypen der Wire-Formate

use thiserror::Error;

/// Result-Alias fuer Protokoll-Operationen
pub type ProtokollResult<T> = std::result::Result<T, ProtokollFehler>;

/// Alle Fehler beim Dekodieren und Kodieren von Wire-Formaten
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtokollFehler {
    // --- STUN ---
    #[error("STUN-Nachricht zu kurz: {0} Bytes (mindestens 20)")]
    StunZuKurz(usize),

    #[error("STUN Magic Cookie ungueltig: {0:#010x}")]
    StunCookie(u32),

    #[error("STUN-Laengenfeld {angegeben} passt nicht zu {vorhanden} Bytes")]
    StunLaenge { angegeben: usize, vorhanden: usize },

    #[error("STUN-Attribut {typ:#06x} abgeschnitten")]
    StunAttributAbgeschnitten { typ: u16 },

    #[error("STUN-Nachricht ist zu gross fuer das Laengenfeld")]
    StunZuGross,

    #[error("MESSAGE-INTEGRITY ohne ICE-Passwort")]
    StunKeinPasswort,

    #[error("Attribut {0:#06x} nach MESSAGE-INTEGRITY/FINGERPRINT ist nicht erlaubt")]
    StunReihenfolge(u16),

    // --- RTP ---
    #[error("RTP-Paket ungueltig: {0}")]
    Rtp(String),

    // --- Hop-by-Hop-Schluessel ---
    #[error("Hop-by-Hop-Schluesseldatensatz ungueltig: {0}")]
    HbhSchluessel(String),

    #[error("Unbekanntes Schutzprofil: {0:#06x}")]
    UnbekanntesProfil(u16),
}
