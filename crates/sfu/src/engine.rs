//! Selective-Forwarding-Engine – Sprecher-Auswahl und Forwarding-Tabelle
//!
//! Pro Konferenz werden die geglaetteten Energiepegel der Mitglieder
//! verfolgt. Daraus ergibt sich eine geordnete Sprecherliste:
//!
//! ```text
//! Slot 0   aktiver Sprecher      Audio (primaerer PT) + Video an alle anderen
//! Slot 1   vorheriger Sprecher   Audio (2. PT) an alle anderen, Video nur an Slot 0
//! Slot 2+  weitere Sprecher      Audio (n. PT) an alle anderen
//! ```
//!
//! Die Forwarding-Tabelle (FIB) wird bei jeder Aenderung komplett neu
//! aufgebaut und ersetzt, nie inkrementell gepatcht.
//!
//! Die Engine ist nicht synchronisiert: sie gehoert genau einem Aufrufer
//! (dem Dispatch-Worker des Relays).

use crate::config::SfuConfig;
use funkrelais_core::types::{ClientId, KonferenzId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

/// Energie eines Clients ohne Messwert (dBov)
pub const NEUTRALE_ENERGIE: f32 = -127.0;

/// Payload-Klasse fuer alles ausser dem primaeren Audio-Typ
pub const PT_KLASSE_VIDEO: u8 = 0;

// ---------------------------------------------------------------------------
// FIB-Eintrag
// ---------------------------------------------------------------------------

/// Ein Weiterleitungsziel
///
/// `payload_typ == 0` bedeutet: Payload-Typ des Pakets unveraendert lassen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FibEintrag {
    pub ziel: ClientId,
    pub payload_typ: u8,
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SfuClient {
    /// Geglaettete Energie in dBov
    energie: f32,
    letzte_aktualisierung: Option<Instant>,
}

impl SfuClient {
    fn neu() -> Self {
        Self {
            energie: NEUTRALE_ENERGIE,
            letzte_aktualisierung: None,
        }
    }
}

#[derive(Debug, Default)]
struct SfuKonferenz {
    mitglieder: BTreeMap<ClientId, SfuClient>,
    aktiver: Option<ClientId>,
    vorheriger: Option<ClientId>,
    weitere: Vec<ClientId>,
    letzter_wechsel: Option<Instant>,
    /// (Quelle, Payload-Klasse) -> Ziele
    fib: HashMap<(ClientId, u8), Vec<FibEintrag>>,
    letzte_fib: Option<Instant>,
}

impl SfuKonferenz {
    /// Sprecher in Slot-Reihenfolge (leere Slots als `None`)
    fn slots(&self) -> Vec<Option<ClientId>> {
        let mut slots = vec![self.aktiver, self.vorheriger];
        slots.extend(self.weitere.iter().copied().map(Some));
        slots
    }

    fn sprecher_entfernen(&mut self, client: ClientId) {
        if self.aktiver == Some(client) {
            self.aktiver = self.vorheriger.take();
        }
        if self.vorheriger == Some(client) {
            self.vorheriger = None;
        }
        self.weitere.retain(|c| *c != client);
    }
}

// ---------------------------------------------------------------------------
// SfuEngine
// ---------------------------------------------------------------------------

/// Selective-Forwarding-Engine fuer alle Konferenzen eines Relays
#[derive(Debug)]
pub struct SfuEngine {
    config: SfuConfig,
    konferenzen: HashMap<KonferenzId, SfuKonferenz>,
    /// Client -> Konferenz
    konferenz_index: HashMap<ClientId, KonferenzId>,
    stumm: HashSet<ClientId>,
    fib_neuberechnungen: u64,
}

impl SfuEngine {
    /// Erstellt eine Engine mit Standard-Konfiguration
    pub fn neu() -> Self {
        Self::mit_config(SfuConfig::default())
    }

    /// Erstellt eine Engine mit eigener Konfiguration
    pub fn mit_config(config: SfuConfig) -> Self {
        Self {
            config,
            konferenzen: HashMap::new(),
            konferenz_index: HashMap::new(),
            stumm: HashSet::new(),
            fib_neuberechnungen: 0,
        }
    }

    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Mitgliedschaft
    // -----------------------------------------------------------------------

    /// Fuegt einen Client einer Konferenz hinzu
    ///
    /// Legt die Konferenz bei Bedarf an und setzt die Energie des Clients auf
    /// den neutralen Wert. Ein Client gehoert hoechstens einer Konferenz an;
    /// eine fruehere Mitgliedschaft wird beendet.
    pub fn client_hinzufuegen(&mut self, konferenz: KonferenzId, client: ClientId) {
        if let Some(alte) = self.konferenz_index.get(&client).copied() {
            let war_stumm = self.stumm.contains(&client);
            self.client_entfernen(alte, client);
            if war_stumm {
                self.stumm.insert(client);
            }
        }

        let konf = self.konferenzen.entry(konferenz).or_default();
        konf.mitglieder.insert(client, SfuClient::neu());
        self.konferenz_index.insert(client, konferenz);
        self.fib_berechnen(konferenz, Instant::now());

        tracing::debug!(client = %client, konferenz = %konferenz, "Client der Konferenz beigetreten");
    }

    /// Entfernt einen Client aus einer Konferenz
    ///
    /// Eine leere Konferenz bleibt als inaktiver Eintrag bestehen.
    pub fn client_entfernen(&mut self, konferenz: KonferenzId, client: ClientId) {
        if let Some(konf) = self.konferenzen.get_mut(&konferenz) {
            if konf.mitglieder.remove(&client).is_some() {
                konf.sprecher_entfernen(client);
                self.fib_berechnen(konferenz, Instant::now());
                tracing::debug!(client = %client, konferenz = %konferenz, "Client hat Konferenz verlassen");
            }
        }
        if self.konferenz_index.get(&client) == Some(&konferenz) {
            self.konferenz_index.remove(&client);
            self.stumm.remove(&client);
        }
    }

    /// Entfernt alle Mitglieder und verwirft die Konferenz
    ///
    /// Gibt die entfernten Mitglieder zurueck.
    pub fn konferenz_beenden(&mut self, konferenz: KonferenzId) -> Vec<ClientId> {
        let Some(konf) = self.konferenzen.remove(&konferenz) else {
            return Vec::new();
        };
        let mitglieder: Vec<ClientId> = konf.mitglieder.into_keys().collect();
        for client in &mitglieder {
            if self.konferenz_index.get(client) == Some(&konferenz) {
                self.konferenz_index.remove(client);
                self.stumm.remove(client);
            }
        }
        tracing::info!(konferenz = %konferenz, mitglieder = mitglieder.len(), "Konferenz beendet");
        mitglieder
    }

    /// Setzt oder loescht die Stummschaltung eines Clients
    ///
    /// Stumme Clients koennen nicht Sprecher werden; ihre Medien werden
    /// weiterhin gemaess FIB weitergeleitet.
    pub fn stummschalten(&mut self, client: ClientId, stumm: bool) {
        if stumm {
            self.stumm.insert(client);
        } else {
            self.stumm.remove(&client);
        }
    }

    pub fn ist_stumm(&self, client: ClientId) -> bool {
        self.stumm.contains(&client)
    }

    // -----------------------------------------------------------------------
    // Energie und Sprecher
    // -----------------------------------------------------------------------

    /// Verarbeitet einen Energiewert (dBov) eines Clients
    pub fn energie_aktualisieren(&mut self, client: ClientId, dbov: f32) {
        self.energie_aktualisieren_zum(client, dbov, Instant::now());
    }

    /// Wie [`energie_aktualisieren`](Self::energie_aktualisieren) mit explizitem Zeitpunkt
    ///
    /// Werte >= 0 gelten als "kein Signal" und werden ignoriert, ebenso
    /// unbekannte Clients.
    pub fn energie_aktualisieren_zum(&mut self, client: ClientId, dbov: f32, jetzt: Instant) {
        if dbov.is_nan() || dbov >= 0.0 {
            return;
        }
        let Some(&konferenz) = self.konferenz_index.get(&client) else {
            return;
        };
        let Some(konf) = self.konferenzen.get_mut(&konferenz) else {
            return;
        };
        let Some(eintrag) = konf.mitglieder.get_mut(&client) else {
            return;
        };

        let neuer_anruf = match eintrag.letzte_aktualisierung {
            None => true,
            Some(letzte) => jetzt.saturating_duration_since(letzte) > self.config.neuer_anruf_abstand,
        };
        eintrag.energie = if neuer_anruf {
            dbov
        } else {
            let g = self.config.glaettung;
            dbov.max(g * dbov + (1.0 - g) * eintrag.energie)
        };
        eintrag.letzte_aktualisierung = Some(jetzt);

        let gewechselt = self.sprecher_berechnen(konferenz, jetzt);

        let faellig = match self.konferenzen.get(&konferenz).and_then(|k| k.letzte_fib) {
            None => true,
            Some(letzte) => jetzt.saturating_duration_since(letzte) >= self.config.fib_mindestabstand,
        };
        if gewechselt || faellig {
            self.fib_berechnen(konferenz, jetzt);
        }
    }

    /// Bestimmt die Sprecher-Slots neu; gibt `true` zurueck wenn sich etwas geaendert hat
    fn sprecher_berechnen(&mut self, konferenz: KonferenzId, jetzt: Instant) -> bool {
        let schwelle = self.config.sprecher_schwelle_db;
        let sperre = self.config.umschalt_sperre;
        let weitere_slots = self.config.slot_anzahl().saturating_sub(2);
        let stumm = &self.stumm;
        let Some(konf) = self.konferenzen.get_mut(&konferenz) else {
            return false;
        };
        let vorher = konf.slots();

        // Kandidaten absteigend nach Energie
        let mut kandidaten: Vec<(ClientId, f32)> = konf
            .mitglieder
            .iter()
            .filter(|(id, c)| !stumm.contains(*id) && c.energie > schwelle)
            .map(|(id, c)| (*id, c.energie))
            .collect();
        kandidaten.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        if let Some(&(kandidat, _)) = kandidaten.first() {
            if konf.aktiver != Some(kandidat) {
                let darf_wechseln = match (konf.aktiver, konf.letzter_wechsel) {
                    (None, _) | (_, None) => true,
                    (Some(_), Some(letzter)) => jetzt.saturating_duration_since(letzter) >= sperre,
                };
                if darf_wechseln {
                    if konf.aktiver.is_some() {
                        konf.vorheriger = konf.aktiver;
                    }
                    konf.aktiver = Some(kandidat);
                    konf.letzter_wechsel = Some(jetzt);
                    tracing::debug!(
                        konferenz = %konferenz,
                        aktiver = %kandidat,
                        "Aktiver Sprecher gewechselt"
                    );
                }
            }
        }

        let aktiver = konf.aktiver;
        let vorheriger = konf.vorheriger;
        konf.weitere = kandidaten
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| Some(*id) != aktiver && Some(*id) != vorheriger)
            .take(weitere_slots)
            .collect();

        konf.slots() != vorher
    }

    /// Baut die FIB der Konferenz komplett neu auf
    fn fib_berechnen(&mut self, konferenz: KonferenzId, jetzt: Instant) {
        let Some(konf) = self.konferenzen.get_mut(&konferenz) else {
            return;
        };
        let Some(primaer) = self.config.primaerer_payload_typ() else {
            return;
        };

        let mut fib: HashMap<(ClientId, u8), Vec<FibEintrag>> = HashMap::new();
        let andere = |quelle: ClientId, payload_typ: u8| -> Vec<FibEintrag> {
            konf.mitglieder
                .keys()
                .filter(|id| **id != quelle)
                .map(|id| FibEintrag {
                    ziel: *id,
                    payload_typ,
                })
                .collect()
        };

        // Audio: jeder Sprecher-Slot mit eigenem Payload-Typ an alle anderen
        for (slot, sprecher) in konf.slots().into_iter().enumerate() {
            let (Some(sprecher), Some(&pt)) = (sprecher, self.config.audio_payload_typen.get(slot))
            else {
                continue;
            };
            if konf.mitglieder.contains_key(&sprecher) {
                fib.insert((sprecher, primaer), andere(sprecher, pt));
            }
        }

        // Video: aktiver an alle, vorheriger nur an den aktiven
        if let Some(aktiver) = konf.aktiver.filter(|c| konf.mitglieder.contains_key(c)) {
            fib.insert((aktiver, PT_KLASSE_VIDEO), andere(aktiver, PT_KLASSE_VIDEO));
            if let Some(vorheriger) = konf
                .vorheriger
                .filter(|c| *c != aktiver && konf.mitglieder.contains_key(c))
            {
                fib.insert(
                    (vorheriger, PT_KLASSE_VIDEO),
                    vec![FibEintrag {
                        ziel: aktiver,
                        payload_typ: PT_KLASSE_VIDEO,
                    }],
                );
            }
        }

        konf.fib = fib;
        konf.letzte_fib = Some(jetzt);
        self.fib_neuberechnungen += 1;
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    /// Weiterleitungsziele fuer ein Paket eines Clients
    ///
    /// Jeder Payload-Typ ausser dem primaeren Audio-Typ wird als Klasse 0
    /// (Video/generisch) nachgeschlagen. Unbekannte Clients ergeben eine
    /// leere Liste.
    pub fn fib_eintrag(&self, client: ClientId, payload_typ: u8) -> Vec<FibEintrag> {
        let klasse = if Some(payload_typ) == self.config.primaerer_payload_typ() {
            payload_typ
        } else {
            PT_KLASSE_VIDEO
        };
        self.konferenz_index
            .get(&client)
            .and_then(|k| self.konferenzen.get(k))
            .and_then(|konf| konf.fib.get(&(client, klasse)))
            .cloned()
            .unwrap_or_default()
    }

    /// Aktuelle Sprecher in Slot-Reihenfolge (aktiver zuerst)
    pub fn aktive_sprecher(&self, konferenz: KonferenzId) -> Vec<ClientId> {
        self.konferenzen
            .get(&konferenz)
            .map(|konf| konf.slots().into_iter().flatten().collect())
            .unwrap_or_default()
    }

    /// Konferenz eines Clients
    pub fn konferenz_von(&self, client: ClientId) -> Option<KonferenzId> {
        self.konferenz_index.get(&client).copied()
    }

    /// Mitglieder einer Konferenz (sortiert)
    pub fn mitglieder(&self, konferenz: KonferenzId) -> Vec<ClientId> {
        self.konferenzen
            .get(&konferenz)
            .map(|konf| konf.mitglieder.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Geglaettete Energie eines Clients
    pub fn energie(&self, client: ClientId) -> Option<f32> {
        let konferenz = self.konferenz_index.get(&client)?;
        self.konferenzen
            .get(konferenz)?
            .mitglieder
            .get(&client)
            .map(|c| c.energie)
    }

    /// Anzahl bekannter Konferenzen (inkl. leerer)
    pub fn konferenz_anzahl(&self) -> usize {
        self.konferenzen.len()
    }

    /// Anzahl der bisherigen FIB-Neuberechnungen
    pub fn fib_neuberechnungen(&self) -> u64 {
        self.fib_neuberechnungen
    }
}

impl Default for SfuEngine {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const KONF: KonferenzId = KonferenzId(1);
    const A: ClientId = ClientId(10);
    const B: ClientId = ClientId(11);
    const C: ClientId = ClientId(12);

    fn engine_mit_drei() -> SfuEngine {
        let mut sfu = SfuEngine::neu();
        sfu.client_hinzufuegen(KONF, A);
        sfu.client_hinzufuegen(KONF, B);
        sfu.client_hinzufuegen(KONF, C);
        sfu
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ziele(eintraege: &[FibEintrag]) -> Vec<(ClientId, u8)> {
        let mut v: Vec<_> = eintraege.iter().map(|e| (e.ziel, e.payload_typ)).collect();
        v.sort();
        v
    }

    #[test]
    fn hysterese_konvergiert_zum_lautesten() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        let mut aktive = Vec::new();

        for runde in 0..6u64 {
            let t = t0 + ms(150 * runde);
            sfu.energie_aktualisieren_zum(A, -10.0, t);
            sfu.energie_aktualisieren_zum(B, -12.0, t);
            sfu.energie_aktualisieren_zum(C, -11.0, t);
            aktive.push(sfu.aktive_sprecher(KONF)[0]);
        }

        assert!(aktive.iter().all(|c| *c == A), "Slot 0 muss stabil A sein: {:?}", aktive);
    }

    #[test]
    fn hysterese_spaeter_lauterer_sprecher() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();

        // C startet, B ist kurz darauf lauter
        sfu.energie_aktualisieren_zum(C, -20.0, t0);
        assert_eq!(sfu.aktive_sprecher(KONF), vec![C]);

        sfu.energie_aktualisieren_zum(B, -10.0, t0 + ms(50));
        assert_eq!(sfu.aktive_sprecher(KONF)[0], C, "Wechsel innerhalb der Sperre");

        sfu.energie_aktualisieren_zum(B, -10.0, t0 + ms(250));
        assert_eq!(sfu.aktive_sprecher(KONF)[..2], [B, C]);
    }

    #[test]
    fn energie_nicht_negativ_wird_ignoriert() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -30.0, t0);

        sfu.energie_aktualisieren_zum(A, 0.0, t0 + ms(10));
        sfu.energie_aktualisieren_zum(A, 3.5, t0 + ms(20));
        sfu.energie_aktualisieren_zum(A, f32::NAN, t0 + ms(30));
        assert_eq!(sfu.energie(A), Some(-30.0));

        sfu.energie_aktualisieren_zum(B, 0.0, t0);
        assert_eq!(sfu.energie(B), Some(NEUTRALE_ENERGIE));
    }

    #[test]
    fn glaettung_einseitig() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -20.0, t0);

        // leiser: 0.2 * -40 + 0.8 * -20 = -24
        sfu.energie_aktualisieren_zum(A, -40.0, t0 + ms(100));
        let e = sfu.energie(A).unwrap();
        assert!((e - -24.0).abs() < 1e-4, "Energie {}", e);

        // lauter: roher Wert gewinnt
        sfu.energie_aktualisieren_zum(A, -5.0, t0 + ms(200));
        assert_eq!(sfu.energie(A), Some(-5.0));
    }

    #[test]
    fn neuer_anruf_ersetzt_energie() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -10.0, t0);
        sfu.energie_aktualisieren_zum(A, -60.0, t0 + ms(1600));
        assert_eq!(sfu.energie(A), Some(-60.0));
    }

    #[test]
    fn unter_schwelle_kein_sprecher() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -50.0, t0);
        sfu.energie_aktualisieren_zum(B, -36.0, t0);
        assert!(sfu.aktive_sprecher(KONF).is_empty());
        assert!(sfu.fib_eintrag(A, 109).is_empty());
    }

    #[test]
    fn stummer_client_wird_kein_sprecher() {
        let mut sfu = engine_mit_drei();
        sfu.stummschalten(A, true);
        assert!(sfu.ist_stumm(A));

        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -5.0, t0);
        sfu.energie_aktualisieren_zum(B, -20.0, t0);
        assert_eq!(sfu.aktive_sprecher(KONF)[0], B);

        sfu.stummschalten(A, false);
        assert!(!sfu.ist_stumm(A));
    }

    #[test]
    fn fib_audio_fanout_des_aktiven() {
        let mut sfu = engine_mit_drei();
        sfu.energie_aktualisieren_zum(A, -10.0, Instant::now());

        let eintraege = sfu.fib_eintrag(A, 109);
        assert_eq!(ziele(&eintraege), vec![(B, 109), (C, 109)]);
        assert!(eintraege.iter().all(|e| e.ziel != A));

        // Nicht-Sprecher haben keinen Audio-Fan-out
        assert!(sfu.fib_eintrag(B, 109).is_empty());
        assert!(sfu.fib_eintrag(C, 109).is_empty());
    }

    #[test]
    fn fib_vorheriger_sprecher() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -10.0, t0);
        sfu.energie_aktualisieren_zum(B, -5.0, t0 + ms(300));
        assert_eq!(sfu.aktive_sprecher(KONF)[..2], [B, A]);

        // Audio: vorheriger mit zweitem Payload-Typ an alle anderen
        assert_eq!(ziele(&sfu.fib_eintrag(A, 109)), vec![(B, 110), (C, 110)]);
        assert_eq!(ziele(&sfu.fib_eintrag(B, 109)), vec![(A, 109), (C, 109)]);

        // Video: aktiver an alle, vorheriger nur an den aktiven
        assert_eq!(ziele(&sfu.fib_eintrag(B, 96)), vec![(A, 0), (C, 0)]);
        assert_eq!(ziele(&sfu.fib_eintrag(A, 96)), vec![(B, 0)]);
        assert!(sfu.fib_eintrag(C, 96).is_empty());
    }

    #[test]
    fn fib_weitere_sprecher_slot() {
        let mut sfu = engine_mit_drei();
        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -10.0, t0);
        sfu.energie_aktualisieren_zum(B, -5.0, t0 + ms(300));
        sfu.energie_aktualisieren_zum(C, -20.0, t0 + ms(310));

        assert_eq!(sfu.aktive_sprecher(KONF), vec![B, A, C]);
        assert_eq!(ziele(&sfu.fib_eintrag(C, 109)), vec![(A, 111), (B, 111)]);
    }

    #[test]
    fn nicht_primaerer_pt_ist_klasse_null() {
        let mut sfu = engine_mit_drei();
        sfu.energie_aktualisieren_zum(A, -10.0, Instant::now());
        // 110 ist ein Audio-Typ, aber nicht der primaere
        assert_eq!(sfu.fib_eintrag(A, 110), sfu.fib_eintrag(A, 0));
        assert_eq!(ziele(&sfu.fib_eintrag(A, 110)), vec![(B, 0), (C, 0)]);
    }

    #[test]
    fn unbekannter_client_leer() {
        let sfu = engine_mit_drei();
        assert!(sfu.fib_eintrag(ClientId(99), 109).is_empty());
        assert!(sfu.aktive_sprecher(KonferenzId(99)).is_empty());
        assert_eq!(sfu.energie(ClientId(99)), None);
    }

    #[test]
    fn client_entfernen_raeumt_sprecher_auf() {
        let mut sfu = engine_mit_drei();
        sfu.energie_aktualisieren_zum(A, -10.0, Instant::now());
        sfu.client_entfernen(KONF, B);

        assert_eq!(ziele(&sfu.fib_eintrag(A, 109)), vec![(C, 109)]);
        assert_eq!(sfu.konferenz_von(B), None);

        sfu.client_entfernen(KONF, A);
        assert!(sfu.aktive_sprecher(KONF).is_empty());
        assert!(sfu.fib_eintrag(A, 109).is_empty());

        sfu.client_entfernen(KONF, C);
        assert_eq!(sfu.konferenz_anzahl(), 1, "Leere Konferenz bleibt bestehen");
        assert!(sfu.mitglieder(KONF).is_empty());
    }

    #[test]
    fn konferenz_beenden_entfernt_alle() {
        let mut sfu = engine_mit_drei();
        let entfernt = sfu.konferenz_beenden(KONF);
        assert_eq!(entfernt, vec![A, B, C]);
        assert_eq!(sfu.konferenz_anzahl(), 0);
        assert_eq!(sfu.konferenz_von(A), None);

        sfu.energie_aktualisieren_zum(A, -10.0, Instant::now());
        assert_eq!(sfu.energie(A), None);
    }

    #[test]
    fn stummschaltung_endet_mit_der_mitgliedschaft() {
        let mut sfu = engine_mit_drei();
        sfu.stummschalten(A, true);
        sfu.stummschalten(B, true);

        sfu.client_entfernen(KONF, A);
        assert!(!sfu.ist_stumm(A));

        sfu.konferenz_beenden(KONF);
        assert!(!sfu.ist_stumm(B));
    }

    #[test]
    fn stummschaltung_bleibt_beim_konferenzwechsel() {
        let mut sfu = engine_mit_drei();
        sfu.stummschalten(A, true);
        sfu.client_hinzufuegen(KonferenzId(2), A);
        assert!(sfu.ist_stumm(A));
    }

    #[test]
    fn client_wechselt_konferenz() {
        let mut sfu = engine_mit_drei();
        sfu.client_hinzufuegen(KonferenzId(2), A);
        assert_eq!(sfu.konferenz_von(A), Some(KonferenzId(2)));
        assert_eq!(sfu.mitglieder(KONF), vec![B, C]);
        assert_eq!(sfu.mitglieder(KonferenzId(2)), vec![A]);
    }

    #[test]
    fn erneutes_hinzufuegen_setzt_energie_zurueck() {
        let mut sfu = engine_mit_drei();
        sfu.energie_aktualisieren_zum(A, -10.0, Instant::now());
        sfu.client_hinzufuegen(KONF, A);
        assert_eq!(sfu.energie(A), Some(NEUTRALE_ENERGIE));
    }

    #[test]
    fn fib_mindestabstand_begrenzt_neuberechnung() {
        let config = SfuConfig {
            fib_mindestabstand: Duration::from_secs(1),
            ..SfuConfig::default()
        };
        let mut sfu = SfuEngine::mit_config(config);
        sfu.client_hinzufuegen(KONF, A);
        sfu.client_hinzufuegen(KONF, B);

        let t0 = Instant::now();
        sfu.energie_aktualisieren_zum(A, -10.0, t0);
        let nach_wechsel = sfu.fib_neuberechnungen();

        // Kein Sprecherwechsel, Abstand noch nicht erreicht
        sfu.energie_aktualisieren_zum(A, -11.0, t0 + ms(100));
        assert_eq!(sfu.fib_neuberechnungen(), nach_wechsel);

        sfu.energie_aktualisieren_zum(A, -11.0, t0 + ms(1200));
        assert_eq!(sfu.fib_neuberechnungen(), nach_wechsel + 1);

        // Standard: jede Aktualisierung
        let mut standard = engine_mit_drei();
        standard.energie_aktualisieren_zum(A, -10.0, t0);
        let vorher = standard.fib_neuberechnungen();
        standard.energie_aktualisieren_zum(A, -10.0, t0 + ms(10));
        assert_eq!(standard.fib_neuberechnungen(), vorher + 1);
    }
}
