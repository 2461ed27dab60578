//! Konfiguration der Selective-Forwarding-Engine

use std::time::Duration;

/// Konfiguration fuer die Sprecher-Auswahl und Forwarding-Tabelle
#[derive(Debug, Clone)]
pub struct SfuConfig {
    /// Audio-Payload-Typen pro Sprecher-Slot (erster = primaerer Typ)
    pub audio_payload_typen: Vec<u8>,
    /// Mindest-Energie (dBov) um Sprecher werden zu koennen
    pub sprecher_schwelle_db: f32,
    /// Mindestabstand zwischen zwei Sprecherwechseln
    pub umschalt_sperre: Duration,
    /// Nach dieser Pause ersetzt ein neuer Wert die Energie vollstaendig
    pub neuer_anruf_abstand: Duration,
    /// Gewicht des neuen Werts bei der Glaettung (0.0–1.0)
    pub glaettung: f32,
    /// Mindestabstand zwischen zwei FIB-Neuberechnungen ohne Sprecherwechsel
    /// (0 = bei jeder Energie-Aktualisierung)
    pub fib_mindestabstand: Duration,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            audio_payload_typen: vec![109, 110, 111],
            sprecher_schwelle_db: -35.0,
            umschalt_sperre: Duration::from_millis(200),
            neuer_anruf_abstand: Duration::from_millis(1500),
            glaettung: 0.2,
            fib_mindestabstand: Duration::ZERO,
        }
    }
}

impl SfuConfig {
    /// Primaerer Audio-Payload-Typ (Slot 0)
    pub fn primaerer_payload_typ(&self) -> Option<u8> {
        self.audio_payload_typen.first().copied()
    }

    /// Anzahl der Sprecher-Slots (mindestens aktiver und vorheriger Sprecher)
    pub fn slot_anzahl(&self) -> usize {
        self.audio_payload_typen.len().max(2)
    }
}
