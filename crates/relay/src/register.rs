//! Assoziations-Register – Zuordnung Absenderadresse <-> AssoziationsId
//!
//! Die Id ist eine reine Funktion der Adresse, Kollisionen werden weder
//! erkannt noch aufgeloest. Mutiert wird nur vom Dispatch-Worker; Lesezugriffe
//! (z.B. `senden` aus dem Key-Management-Tunnel) laufen parallel ueber DashMap.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use funkrelais_core::AssoziationsId;
use std::net::SocketAddr;
use std::sync::Arc;

/// Thread-sicheres Register aller bekannten Assoziationen
#[derive(Clone, Default)]
pub struct AssoziationsRegister {
    adressen: Arc<DashMap<AssoziationsId, SocketAddr>>,
}

impl AssoziationsRegister {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Berechnet die AssoziationsId einer Adresse (deterministisch, ohne Registrierung)
    pub fn aufloesen(&self, adresse: &SocketAddr) -> AssoziationsId {
        AssoziationsId::aus_adresse(adresse)
    }

    /// Registriert die Assoziation beim ersten Kontakt
    ///
    /// Gibt `true` zurueck wenn die Assoziation neu ist.
    pub fn sicherstellen(&self, id: AssoziationsId, adresse: SocketAddr) -> bool {
        match self.adressen.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(eintrag) => {
                eintrag.insert(adresse);
                true
            }
        }
    }

    /// Adresse einer Assoziation
    pub fn nachschlagen(&self, id: &AssoziationsId) -> Option<SocketAddr> {
        self.adressen.get(id).map(|eintrag| *eintrag)
    }

    /// Entfernt eine Assoziation, gibt die bisherige Adresse zurueck
    pub fn entfernen(&self, id: &AssoziationsId) -> Option<SocketAddr> {
        self.adressen.remove(id).map(|(_, adresse)| adresse)
    }

    /// Anzahl bekannter Assoziationen
    pub fn anzahl(&self) -> usize {
        self.adressen.len()
    }

    /// Momentaufnahme aller Assoziationen (fuer Broadcast)
    pub fn alle(&self) -> Vec<(AssoziationsId, SocketAddr)> {
        self.adressen
            .iter()
            .map(|eintrag| (*eintrag.key(), *eintrag.value()))
            .collect()
    }
}
