//! Dispatch-Kern – UDP-Socket, Empfangs- und Dispatch-Worker
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)
//!     |
//!     v
//! Empfangs-Worker  --(mpsc, begrenzt)-->  Dispatch-Worker
//!                                             |
//!        RelayHandle --(Steuerbefehle)------->|
//!                                             v
//!                                   klassifizieren()
//!                                             |
//!          +-----------+----------+-----------+------------+
//!          v           v          v           v            v
//!        DTLS        SRTP        STUN      HBH-Key     Unbekannt
//!     KmfTunnel   SfuEngine   Antwort   SRTP-Kontext   verwerfen
//! ```
//!
//! Der Dispatch-Worker ist der einzige Mutator von Register, SFU-Zustand und
//! SRTP-Kontexten. Aufrufer ausserhalb (Tunnel, Server) gehen ueber den
//! [`RelayHandle`], der Aenderungen als Steuerbefehl in dieselbe Schleife
//! einreiht.

use crate::config::RelayConfig;
use crate::error::{RelayFehler, RelayResult};
use crate::kollaborateure::{
    srtp_schluessel_ableiten, DtlsSitzung, KmfTunnel, RelayZustellung, SrtpFabrik, SrtpSitzung,
};
use crate::register::AssoziationsRegister;
use async_trait::async_trait;
use funkrelais_core::{AssoziationsId, ClientId, KonferenzId};
use funkrelais_observability::RelayMetriken;
use funkrelais_protocol::dtls::ist_client_hello;
use funkrelais_protocol::stun::{self, StunKlasse};
use funkrelais_protocol::{
    klassifizieren, HbhSchluessel, PaketKlasse, RtpPaket, SchutzProfil, SrtpSchluessel,
    StunNachricht,
};
use funkrelais_sfu::{SfuEngine, PT_KLASSE_VIDEO};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Kapazitaet der Steuerbefehl-Queue
const BEFEHL_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Interne Nachrichten
// ---------------------------------------------------------------------------

/// Ein empfangenes Datagramm
#[derive(Debug)]
struct EmpfangenesPaket {
    daten: Vec<u8>,
    absender: SocketAddr,
}

/// Zustandsaenderungen, die der Dispatch-Worker fuer Aufrufer ausfuehrt
enum Steuerbefehl {
    Beitreten {
        konferenz: KonferenzId,
        assoziation: AssoziationsId,
        ack: oneshot::Sender<()>,
    },
    Verlassen {
        konferenz: KonferenzId,
        assoziation: AssoziationsId,
        ack: oneshot::Sender<()>,
    },
    KonferenzBeenden {
        konferenz: KonferenzId,
        ack: oneshot::Sender<Vec<AssoziationsId>>,
    },
    Stummschalten {
        assoziation: AssoziationsId,
        stumm: bool,
        ack: oneshot::Sender<()>,
    },
    AktiveSprecher {
        konferenz: KonferenzId,
        ack: oneshot::Sender<Vec<AssoziationsId>>,
    },
    SchluesselSetzen {
        assoziation: AssoziationsId,
        schluessel: HbhSchluessel,
        ack: oneshot::Sender<RelayResult<()>>,
    },
    Schutzprofil {
        assoziation: AssoziationsId,
        ack: oneshot::Sender<Option<SchutzProfil>>,
    },
}

// ---------------------------------------------------------------------------
// RelayHandle
// ---------------------------------------------------------------------------

/// Klonbarer Zugriff auf einen Relay
///
/// Haelt den Socket nur schwach: nach `stoppen()` schlagen alle
/// Sendeoperationen mit [`RelayFehler::Gestoppt`] fehl.
#[derive(Clone)]
pub struct RelayHandle {
    socket: Weak<UdpSocket>,
    register: AssoziationsRegister,
    befehle: mpsc::Sender<Steuerbefehl>,
    gestoppt: Arc<AtomicBool>,
}

impl RelayHandle {
    /// AssoziationsId einer Adresse (ohne Registrierung)
    pub fn aufloesen(&self, adresse: &SocketAddr) -> AssoziationsId {
        self.register.aufloesen(adresse)
    }

    /// Adresse einer bekannten Assoziation
    pub fn nachschlagen(&self, assoziation: &AssoziationsId) -> Option<SocketAddr> {
        self.register.nachschlagen(assoziation)
    }

    /// Anzahl bekannter Assoziationen
    pub fn assoziationen(&self) -> usize {
        self.register.anzahl()
    }

    /// Nimmt eine Assoziation in eine Konferenz auf (verlaesst ggf. die bisherige)
    pub async fn beitreten(
        &self,
        konferenz: KonferenzId,
        assoziation: AssoziationsId,
    ) -> RelayResult<()> {
        self.befehl(|ack| Steuerbefehl::Beitreten {
            konferenz,
            assoziation,
            ack,
        })
        .await
    }

    /// Entfernt eine Assoziation aus der Konferenz und vergisst sie
    pub async fn verlassen(
        &self,
        konferenz: KonferenzId,
        assoziation: AssoziationsId,
    ) -> RelayResult<()> {
        self.befehl(|ack| Steuerbefehl::Verlassen {
            konferenz,
            assoziation,
            ack,
        })
        .await
    }

    /// Beendet eine Konferenz, gibt die entfernten Assoziationen zurueck
    pub async fn konferenz_beenden(
        &self,
        konferenz: KonferenzId,
    ) -> RelayResult<Vec<AssoziationsId>> {
        self.befehl(|ack| Steuerbefehl::KonferenzBeenden { konferenz, ack })
            .await
    }

    /// Schliesst eine Assoziation von der Sprecher-Auswahl aus (bzw. wieder ein)
    pub async fn stummschalten(&self, assoziation: AssoziationsId, stumm: bool) -> RelayResult<()> {
        self.befehl(|ack| Steuerbefehl::Stummschalten {
            assoziation,
            stumm,
            ack,
        })
        .await
    }

    /// Aktuelle Sprecher einer Konferenz (aktiver zuerst)
    pub async fn aktive_sprecher(&self, konferenz: KonferenzId) -> RelayResult<Vec<AssoziationsId>> {
        self.befehl(|ack| Steuerbefehl::AktiveSprecher { konferenz, ack })
            .await
    }

    /// Schutzprofil der fuer die Assoziation hinterlegten Schluessel
    pub async fn schutzprofil(&self, assoziation: AssoziationsId) -> RelayResult<Option<SchutzProfil>> {
        self.befehl(|ack| Steuerbefehl::Schutzprofil { assoziation, ack })
            .await
    }

    /// Uebernimmt die SRTP-Schluessel einer abgeschlossenen DTLS-Sitzung
    ///
    /// Fuer Endpunkte, deren Handshake im Prozess terminiert wird statt beim
    /// Key-Management-Peer. Gibt das ausgehandelte Profil zurueck.
    pub async fn dtls_schluessel_uebernehmen(
        &self,
        assoziation: AssoziationsId,
        dtls: &dyn DtlsSitzung,
    ) -> RelayResult<SchutzProfil> {
        let hbh = srtp_schluessel_ableiten(dtls)?;
        let profil = hbh.profil;
        self.schluessel_setzen(assoziation, hbh).await?;
        Ok(profil)
    }

    /// Reiht einen Befehl ein und wartet auf die Bestaetigung des Dispatch-Workers
    async fn befehl<T>(
        &self,
        erstellen: impl FnOnce(oneshot::Sender<T>) -> Steuerbefehl,
    ) -> RelayResult<T> {
        if self.gestoppt.load(Ordering::Acquire) {
            return Err(RelayFehler::Gestoppt);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.befehle
            .send(erstellen(ack_tx))
            .await
            .map_err(|_| RelayFehler::Gestoppt)?;
        ack_rx.await.map_err(|_| RelayFehler::Gestoppt)
    }
}

#[async_trait]
impl RelayZustellung for RelayHandle {
    async fn senden(&self, assoziation: AssoziationsId, daten: &[u8]) -> RelayResult<()> {
        if self.gestoppt.load(Ordering::Acquire) {
            return Err(RelayFehler::Gestoppt);
        }
        let adresse = self
            .register
            .nachschlagen(&assoziation)
            .ok_or(RelayFehler::UnbekannteAssoziation(assoziation))?;
        let socket = self.socket.upgrade().ok_or(RelayFehler::Gestoppt)?;

        socket.send_to(daten, adresse).await?;
        tracing::trace!(
            assoziation = %assoziation,
            bytes = daten.len(),
            ziel = %adresse,
            "Paket fuer Kollaborateur gesendet"
        );
        Ok(())
    }

    async fn senden_mit_schluesseln(
        &self,
        assoziation: AssoziationsId,
        daten: &[u8],
        profil: SchutzProfil,
        schluessel: SrtpSchluessel,
    ) -> RelayResult<()> {
        if klassifizieren(daten) != PaketKlasse::Dtls {
            return Err(RelayFehler::KeinDtlsPaket);
        }
        if self.register.nachschlagen(&assoziation).is_none() {
            return Err(RelayFehler::UnbekannteAssoziation(assoziation));
        }

        match self
            .schluessel_setzen(assoziation, HbhSchluessel { profil, schluessel })
            .await
        {
            Ok(()) => {}
            Err(RelayFehler::Gestoppt) => return Err(RelayFehler::Gestoppt),
            Err(e) => {
                tracing::warn!(
                    assoziation = %assoziation,
                    fehler = %e,
                    "SRTP-Kontext nicht erstellt, sende trotzdem"
                );
            }
        }
        self.senden(assoziation, daten).await
    }

    async fn schluessel_setzen(
        &self,
        assoziation: AssoziationsId,
        schluessel: HbhSchluessel,
    ) -> RelayResult<()> {
        self.befehl(|ack| Steuerbefehl::SchluesselSetzen {
            assoziation,
            schluessel,
            ack,
        })
        .await?
    }
}

// ---------------------------------------------------------------------------
// MediaRelay
// ---------------------------------------------------------------------------

/// Gebundener, noch nicht gestarteter Relay
///
/// Zwischen `binden()` und `starten()` kann der [`RelayHandle`] an den
/// Key-Management-Tunnel uebergeben werden, bevor dieser dem Relay
/// uebergeben wird.
pub struct MediaRelay {
    config: RelayConfig,
    socket: Arc<UdpSocket>,
    register: AssoziationsRegister,
    befehle_tx: mpsc::Sender<Steuerbefehl>,
    befehle_rx: mpsc::Receiver<Steuerbefehl>,
    gestoppt: Arc<AtomicBool>,
    metriken: Option<RelayMetriken>,
    fabrik: Option<Arc<dyn SrtpFabrik>>,
}

impl MediaRelay {
    /// Bindet den UDP-Socket
    pub async fn binden(config: RelayConfig) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "Media-Relay gebunden");

        let (befehle_tx, befehle_rx) = mpsc::channel(BEFEHL_QUEUE_GROESSE);
        Ok(Self {
            config,
            socket: Arc::new(socket),
            register: AssoziationsRegister::neu(),
            befehle_tx,
            befehle_rx,
            gestoppt: Arc::new(AtomicBool::new(false)),
            metriken: None,
            fabrik: None,
        })
    }

    /// Bindet und startet ohne Key-Management-Tunnel
    pub async fn lauschen(config: RelayConfig) -> std::io::Result<LaufenderRelay> {
        Ok(Self::binden(config).await?.starten(None))
    }

    pub fn mit_metriken(mut self, metriken: RelayMetriken) -> Self {
        self.metriken = Some(metriken);
        self
    }

    /// Setzt die Fabrik fuer SRTP-Kontexte (ohne Fabrik laufen Medien unverschluesselt)
    pub fn mit_srtp_fabrik(mut self, fabrik: Arc<dyn SrtpFabrik>) -> Self {
        self.fabrik = Some(fabrik);
        self
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            socket: Arc::downgrade(&self.socket),
            register: self.register.clone(),
            befehle: self.befehle_tx.clone(),
            gestoppt: Arc::clone(&self.gestoppt),
        }
    }

    /// Startet Empfangs- und Dispatch-Worker und kehrt sofort zurueck
    pub fn starten(self, tunnel: Option<Arc<dyn KmfTunnel>>) -> LaufenderRelay {
        let handle = self.handle();
        let lokale_adresse = self.socket.local_addr().ok();
        let mit_tunnel = tunnel.is_some();

        let (pakete_tx, pakete_rx) = mpsc::channel(self.config.queue_groesse.max(1));
        let empfang = tokio::spawn(empfangs_worker(
            Arc::clone(&self.socket),
            pakete_tx,
            self.config.puffer_groesse,
        ));

        let (stop_tx, stop_rx) = oneshot::channel();
        let nachlauf = self.config.nachlauf;
        let verteiler = Verteiler {
            sfu: SfuEngine::mit_config(self.config.sfu.clone()),
            config: self.config,
            socket: Arc::clone(&self.socket),
            register: self.register,
            teilnehmer: HashMap::new(),
            schluessel: HashMap::new(),
            krypto: HashMap::new(),
            tunnel,
            fabrik: self.fabrik,
            metriken: self.metriken,
        };
        let dispatch = tokio::spawn(verteiler.laufen(pakete_rx, self.befehle_rx, stop_rx));

        tracing::info!(
            addr = ?lokale_adresse,
            tunnel = mit_tunnel,
            "Media-Relay gestartet"
        );

        LaufenderRelay {
            handle,
            lokale_adresse,
            socket: Some(self.socket),
            stop_tx: Some(stop_tx),
            dispatch: Some(dispatch),
            empfang: Some(empfang),
            nachlauf,
        }
    }
}

// ---------------------------------------------------------------------------
// LaufenderRelay
// ---------------------------------------------------------------------------

/// Ein lauschender Relay mit laufenden Workern
pub struct LaufenderRelay {
    handle: RelayHandle,
    lokale_adresse: Option<SocketAddr>,
    socket: Option<Arc<UdpSocket>>,
    stop_tx: Option<oneshot::Sender<()>>,
    dispatch: Option<JoinHandle<()>>,
    empfang: Option<JoinHandle<()>>,
    nachlauf: Duration,
}

impl LaufenderRelay {
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        self.lokale_adresse
    }

    /// Stoppt den Relay
    ///
    /// Wartet bis der Dispatch-Worker die Beendigung bestaetigt, schliesst
    /// dann den Socket und wartet die Nachlaufzeit ab.
    pub async fn stoppen(mut self) {
        self.handle.gestoppt.store(true, Ordering::Release);

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(dispatch) = self.dispatch.take() {
            if let Err(e) = dispatch.await {
                tracing::warn!(fehler = %e, "Dispatch-Worker abgebrochen");
            }
        }
        if let Some(empfang) = self.empfang.take() {
            empfang.abort();
            let _ = empfang.await;
        }

        // letzte starke Referenz, Socket wird geschlossen
        self.socket.take();
        tokio::time::sleep(self.nachlauf).await;

        tracing::info!(addr = ?self.lokale_adresse, "Media-Relay gestoppt");
    }
}

impl Drop for LaufenderRelay {
    fn drop(&mut self) {
        self.handle.gestoppt.store(true, Ordering::Release);
        if let Some(empfang) = self.empfang.take() {
            empfang.abort();
        }
        // stop_tx wird mitgedroppt, der Dispatch-Worker endet beim naechsten Wecken
    }
}

// ---------------------------------------------------------------------------
// Empfangs-Worker
// ---------------------------------------------------------------------------

/// Liest Datagramme und reiht sie in Ankunftsreihenfolge ein
///
/// Ein Lesefehler beendet den Worker: der Socket gilt dann als unbrauchbar.
async fn empfangs_worker(
    socket: Arc<UdpSocket>,
    pakete: mpsc::Sender<EmpfangenesPaket>,
    puffer_groesse: usize,
) {
    let mut puffer = vec![0u8; puffer_groesse];

    loop {
        match socket.recv_from(&mut puffer).await {
            Ok((laenge, absender)) => {
                let paket = EmpfangenesPaket {
                    daten: puffer[..laenge].to_vec(),
                    absender,
                };
                if pakete.send(paket).await.is_err() {
                    tracing::debug!("Dispatch-Worker beendet, Empfang eingestellt");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(fehler = %e, "UDP-Empfangsfehler, Empfangs-Worker beendet");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch-Worker
// ---------------------------------------------------------------------------

/// SRTP-Kontexte eines Hops
struct HopKrypto {
    eingehend: Box<dyn SrtpSitzung>,
    ausgehend: Box<dyn SrtpSitzung>,
}

/// Zustand des Dispatch-Workers (einziger Mutator)
struct Verteiler {
    config: RelayConfig,
    socket: Arc<UdpSocket>,
    register: AssoziationsRegister,
    sfu: SfuEngine,
    /// Konferenz-Teilnehmer: SFU-Client -> Assoziation
    teilnehmer: HashMap<ClientId, AssoziationsId>,
    /// Hinterlegte Hop-Schluessel, auch ohne SRTP-Fabrik
    schluessel: HashMap<AssoziationsId, HbhSchluessel>,
    krypto: HashMap<AssoziationsId, HopKrypto>,
    tunnel: Option<Arc<dyn KmfTunnel>>,
    fabrik: Option<Arc<dyn SrtpFabrik>>,
    metriken: Option<RelayMetriken>,
}

impl Verteiler {
    async fn laufen(
        mut self,
        mut pakete: mpsc::Receiver<EmpfangenesPaket>,
        mut befehle: mpsc::Receiver<Steuerbefehl>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let weck_intervall = self.config.weck_intervall;
        let mut empfang_aktiv = true;

        loop {
            tokio::select! {
                biased;

                _ = &mut stop => break,

                Some(befehl) = befehle.recv() => self.befehl_ausfuehren(befehl),

                paket = pakete.recv(), if empfang_aktiv => match paket {
                    Some(paket) => self.paket_verarbeiten(paket).await,
                    None => {
                        tracing::warn!("Empfangs-Worker beendet, keine weiteren Pakete");
                        empfang_aktiv = false;
                    }
                },

                _ = tokio::time::sleep(weck_intervall) => {}
            }
        }

        tracing::debug!("Dispatch-Worker beendet");
    }

    // -----------------------------------------------------------------------
    // Steuerbefehle
    // -----------------------------------------------------------------------

    fn befehl_ausfuehren(&mut self, befehl: Steuerbefehl) {
        match befehl {
            Steuerbefehl::Beitreten {
                konferenz,
                assoziation,
                ack,
            } => {
                let client = ClientId::aus_assoziation(&assoziation);
                self.sfu.client_hinzufuegen(konferenz, client);
                self.teilnehmer.insert(client, assoziation);
                tracing::info!(
                    konferenz = %konferenz,
                    assoziation = %assoziation,
                    "Assoziation tritt Konferenz bei"
                );
                self.gauges_aktualisieren();
                let _ = ack.send(());
            }
            Steuerbefehl::Verlassen {
                konferenz,
                assoziation,
                ack,
            } => {
                self.sfu
                    .client_entfernen(konferenz, ClientId::aus_assoziation(&assoziation));
                self.assoziation_vergessen(&assoziation);
                tracing::info!(
                    konferenz = %konferenz,
                    assoziation = %assoziation,
                    "Assoziation verlaesst Konferenz"
                );
                self.gauges_aktualisieren();
                let _ = ack.send(());
            }
            Steuerbefehl::KonferenzBeenden { konferenz, ack } => {
                let assoziationen: Vec<AssoziationsId> = self
                    .sfu
                    .konferenz_beenden(konferenz)
                    .into_iter()
                    .filter_map(|client| self.teilnehmer.get(&client).copied())
                    .collect();
                for assoziation in &assoziationen {
                    self.assoziation_vergessen(assoziation);
                }
                tracing::info!(
                    konferenz = %konferenz,
                    teilnehmer = assoziationen.len(),
                    "Konferenz beendet"
                );
                self.gauges_aktualisieren();
                let _ = ack.send(assoziationen);
            }
            Steuerbefehl::Stummschalten {
                assoziation,
                stumm,
                ack,
            } => {
                self.sfu
                    .stummschalten(ClientId::aus_assoziation(&assoziation), stumm);
                tracing::debug!(assoziation = %assoziation, stumm, "Stummschaltung gesetzt");
                let _ = ack.send(());
            }
            Steuerbefehl::AktiveSprecher { konferenz, ack } => {
                let sprecher = self
                    .sfu
                    .aktive_sprecher(konferenz)
                    .into_iter()
                    .filter_map(|client| self.teilnehmer.get(&client).copied())
                    .collect();
                let _ = ack.send(sprecher);
            }
            Steuerbefehl::SchluesselSetzen {
                assoziation,
                schluessel,
                ack,
            } => {
                let _ = ack.send(self.schluessel_installieren(assoziation, schluessel));
            }
            Steuerbefehl::Schutzprofil { assoziation, ack } => {
                let _ = ack.send(self.schluessel.get(&assoziation).map(|hbh| hbh.profil));
            }
        }
    }

    /// Entfernt alle Spuren einer Assoziation
    fn assoziation_vergessen(&mut self, assoziation: &AssoziationsId) {
        self.teilnehmer.remove(&ClientId::aus_assoziation(assoziation));
        self.schluessel.remove(assoziation);
        self.krypto.remove(assoziation);
        self.register.entfernen(assoziation);
        if let Some(tunnel) = &self.tunnel {
            tunnel.trennen(*assoziation);
        }
    }

    /// Hinterlegt die Schluessel und erstellt die SRTP-Kontexte, falls eine
    /// Fabrik konfiguriert ist
    ///
    /// Ohne Fabrik bleibt der Hop unverschluesselt. Alte Kontexte werden in
    /// jedem Fall verworfen.
    fn schluessel_installieren(
        &mut self,
        assoziation: AssoziationsId,
        hbh: HbhSchluessel,
    ) -> RelayResult<()> {
        let profil = hbh.profil;
        self.krypto.remove(&assoziation);
        self.schluessel.insert(assoziation, hbh);

        let Some(fabrik) = &self.fabrik else {
            tracing::warn!(
                assoziation = %assoziation,
                profil = %profil,
                "Schluessel hinterlegt, keine SRTP-Fabrik: Medien bleiben unverschluesselt"
            );
            return Ok(());
        };

        let Some(hbh) = self.schluessel.get(&assoziation) else {
            return Ok(());
        };
        let eingehend = fabrik.sitzung_erstellen(profil, &hbh.schluessel.eingehend())?;
        let ausgehend = fabrik.sitzung_erstellen(profil, &hbh.schluessel.ausgehend())?;
        self.krypto.insert(
            assoziation,
            HopKrypto {
                eingehend,
                ausgehend,
            },
        );

        tracing::info!(
            assoziation = %assoziation,
            profil = %profil,
            "SRTP-Schluessel installiert"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Paketverarbeitung
    // -----------------------------------------------------------------------

    async fn paket_verarbeiten(&mut self, paket: EmpfangenesPaket) {
        let klasse = klassifizieren(&paket.daten);
        if let Some(m) = &self.metriken {
            m.pakete_empfangen.with_label_values(&[klasse.name()]).inc();
        }

        let assoziation = self.register.aufloesen(&paket.absender);
        if self.register.sicherstellen(assoziation, paket.absender) {
            tracing::debug!(
                assoziation = %assoziation,
                absender = %paket.absender,
                "Neue Assoziation"
            );
            self.gauges_aktualisieren();
        }

        tracing::trace!(
            assoziation = %assoziation,
            klasse = %klasse,
            bytes = paket.daten.len(),
            "Paket empfangen"
        );

        match klasse {
            PaketKlasse::Dtls => self.dtls_verarbeiten(assoziation, &paket.daten).await,
            PaketKlasse::Srtp => self.srtp_verarbeiten(assoziation, &paket.daten).await,
            PaketKlasse::Stun => self.stun_verarbeiten(paket.absender, &paket.daten).await,
            PaketKlasse::HbhSchluessel => self.hbh_verarbeiten(assoziation, &paket.daten),
            PaketKlasse::Unbekannt => {
                tracing::debug!(
                    absender = %paket.absender,
                    bytes = paket.daten.len(),
                    "Unbekannte Paketklasse, verworfen"
                );
                self.verworfen("unbekannt");
            }
        }
    }

    async fn dtls_verarbeiten(&mut self, quelle: AssoziationsId, daten: &[u8]) {
        let Some(tunnel) = self.tunnel.clone() else {
            if self.config.broadcast_rueckfall {
                self.rundsenden(quelle, daten, false).await;
            } else {
                tracing::debug!(assoziation = %quelle, "DTLS ohne Tunnel, verworfen");
                self.verworfen("kein_tunnel");
            }
            return;
        };

        let ergebnis = if ist_client_hello(daten) {
            tracing::debug!(assoziation = %quelle, "ClientHello an Key-Management");
            tunnel
                .senden_mit_profilen(quelle, daten, &self.config.schutzprofile)
                .await
        } else {
            tunnel.senden(quelle, daten).await
        };

        if let Err(e) = ergebnis {
            tracing::warn!(assoziation = %quelle, fehler = %e, "DTLS-Weiterleitung fehlgeschlagen");
        }
    }

    async fn srtp_verarbeiten(&mut self, quelle: AssoziationsId, daten: &[u8]) {
        let klartext = match self.krypto.get_mut(&quelle) {
            Some(krypto) => match krypto.eingehend.entschuetzen(daten) {
                Ok(klartext) => klartext,
                Err(e) => {
                    tracing::debug!(assoziation = %quelle, fehler = %e, "SRTP-Entschluesselung fehlgeschlagen");
                    self.verworfen("srtp");
                    return;
                }
            },
            None => daten.to_vec(),
        };

        let client = ClientId::aus_assoziation(&quelle);
        if self.sfu.konferenz_von(client).is_none() {
            if self.config.broadcast_rueckfall {
                self.rundsenden(quelle, &klartext, true).await;
            } else {
                self.verworfen("keine_konferenz");
            }
            return;
        }

        let paket = match RtpPaket::decode(&klartext) {
            Ok(paket) => paket,
            Err(e) => {
                tracing::debug!(assoziation = %quelle, fehler = %e, "Ungueltiges RTP-Paket");
                self.verworfen("rtp");
                return;
            }
        };

        self.sfu.energie_aktualisieren(
            client,
            paket.client_lautstaerke(self.config.audio_level_id),
        );

        let eintraege = self.sfu.fib_eintrag(client, paket.payload_typ);
        tracing::trace!(
            assoziation = %quelle,
            payload_typ = paket.payload_typ,
            ziele = eintraege.len(),
            "Medienpaket"
        );

        for eintrag in eintraege {
            let Some(ziel) = self.teilnehmer.get(&eintrag.ziel).copied() else {
                continue;
            };

            let mut kopie = paket.clone();
            if eintrag.payload_typ != PT_KLASSE_VIDEO {
                kopie.payload_typ_setzen(eintrag.payload_typ);
            }
            match kopie.encode() {
                Ok(bytes) => self.medien_zustellen(ziel, &bytes).await,
                Err(e) => {
                    tracing::warn!(ziel = %ziel, fehler = %e, "RTP-Kodierung fehlgeschlagen");
                }
            }
        }
    }

    async fn stun_verarbeiten(&mut self, absender: SocketAddr, daten: &[u8]) {
        let nachricht = match StunNachricht::parse(daten) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::debug!(absender = %absender, fehler = %e, "Ungueltige STUN-Nachricht");
                self.verworfen("stun");
                return;
            }
        };

        let Some(antwort) = stun::antwort_erstellen(&nachricht, absender, &self.config.ice_passwort)
        else {
            tracing::trace!(nachricht = %nachricht, "STUN-Nachricht ist keine Anfrage");
            return;
        };

        let bytes = match antwort.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(fehler = %e, "STUN-Antwort nicht serialisierbar");
                return;
            }
        };

        match self.socket.send_to(&bytes, absender).await {
            Ok(_) => {
                let klasse = if antwort.klasse == StunKlasse::Erfolg {
                    "erfolg"
                } else {
                    "fehler"
                };
                tracing::debug!(absender = %absender, antwort = %antwort, "STUN-Antwort gesendet");
                if let Some(m) = &self.metriken {
                    m.stun_antworten.with_label_values(&[klasse]).inc();
                }
            }
            Err(e) => {
                tracing::warn!(ziel = %absender, fehler = %e, "UDP-Sendefehler");
                if let Some(m) = &self.metriken {
                    m.sendefehler.inc();
                }
            }
        }
    }

    fn hbh_verarbeiten(&mut self, assoziation: AssoziationsId, daten: &[u8]) {
        let schluessel = match HbhSchluessel::decode(daten) {
            Ok(schluessel) => schluessel,
            Err(e) => {
                tracing::debug!(assoziation = %assoziation, fehler = %e, "Ungueltiger Schluesseldatensatz");
                self.verworfen("hbh");
                return;
            }
        };

        if let Err(e) = self.schluessel_installieren(assoziation, schluessel) {
            tracing::warn!(assoziation = %assoziation, fehler = %e, "Schluessel nicht installiert");
        }
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet an alle bekannten Assoziationen ausser der Quelle
    async fn rundsenden(&mut self, quelle: AssoziationsId, daten: &[u8], medien: bool) {
        for (ziel, _) in self.register.alle() {
            if ziel == quelle {
                continue;
            }
            if medien {
                self.medien_zustellen(ziel, daten).await;
            } else {
                self.senden_an(ziel, daten).await;
            }
        }
    }

    /// Schuetzt ein RTP-Paket fuer den Ziel-Hop (falls Schluessel vorhanden) und sendet es
    async fn medien_zustellen(&mut self, ziel: AssoziationsId, klartext: &[u8]) {
        let geschuetzt = match self.krypto.get_mut(&ziel) {
            Some(krypto) => match krypto.ausgehend.schuetzen(klartext) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(ziel = %ziel, fehler = %e, "SRTP-Verschluesselung fehlgeschlagen");
                    self.verworfen("srtp");
                    return;
                }
            },
            None => None,
        };

        self.senden_an(ziel, geschuetzt.as_deref().unwrap_or(klartext))
            .await;
    }

    /// Schreibt auf den Socket; Fehler werden geloggt, nie weitergereicht
    async fn senden_an(&self, ziel: AssoziationsId, daten: &[u8]) {
        let Some(adresse) = self.register.nachschlagen(&ziel) else {
            tracing::debug!(ziel = %ziel, "Ziel ohne bekannte Adresse");
            self.verworfen("ziel_unbekannt");
            return;
        };

        match self.socket.send_to(daten, adresse).await {
            Ok(_) => {
                if let Some(m) = &self.metriken {
                    m.pakete_weitergeleitet.inc();
                }
            }
            Err(e) => {
                tracing::warn!(ziel = %adresse, fehler = %e, "UDP-Sendefehler");
                if let Some(m) = &self.metriken {
                    m.sendefehler.inc();
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Metriken
    // -----------------------------------------------------------------------

    fn verworfen(&self, grund: &str) {
        if let Some(m) = &self.metriken {
            m.pakete_verworfen.with_label_values(&[grund]).inc();
        }
    }

    fn gauges_aktualisieren(&self) {
        if let Some(m) = &self.metriken {
            m.assoziationen.set(self.register.anzahl() as i64);
            m.konferenzen.set(self.sfu.konferenz_anzahl() as i64);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
