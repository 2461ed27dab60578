//! End-to-End-Tests des Relays ueber echte UDP-Sockets auf 127.0.0.1

use async_trait::async_trait;
use funkrelais_core::{AssoziationsId, KonferenzId};
use funkrelais_observability::RelayMetriken;
use funkrelais_protocol::stun::{self, StunKlasse, StunMethode};
use funkrelais_protocol::{HbhSchluessel, RtpPaket, SchutzProfil, SrtpSchluessel, StunNachricht};
use funkrelais_relay::config::STANDARD_ICE_PASSWORT;
use funkrelais_relay::{
    KmfTunnel, LaufenderRelay, MediaRelay, RelayConfig, RelayFehler, RelayResult,
    RelayZustellung, SrtpFabrik, SrtpSitzung,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const WARTEZEIT: Duration = Duration::from_secs(2);
const STILLE: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

fn test_config() -> RelayConfig {
    RelayConfig::neu("127.0.0.1:0".parse().unwrap())
}

async fn relay_starten(config: RelayConfig) -> (LaufenderRelay, SocketAddr) {
    let relay = MediaRelay::lauschen(config).await.unwrap();
    let addr = relay.lokale_adresse().unwrap();
    (relay, addr)
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn empfangen(socket: &UdpSocket) -> Vec<u8> {
    let mut puffer = [0u8; 2048];
    let laenge = tokio::time::timeout(WARTEZEIT, socket.recv(&mut puffer))
        .await
        .expect("Paket muss eintreffen")
        .unwrap();
    puffer[..laenge].to_vec()
}

async fn nichts_empfangen(socket: &UdpSocket) -> bool {
    let mut puffer = [0u8; 2048];
    tokio::time::timeout(STILLE, socket.recv(&mut puffer))
        .await
        .is_err()
}

fn binding_anfrage(tid: u8) -> Vec<u8> {
    StunNachricht::neu(StunMethode::BINDING, StunKlasse::Anfrage, [tid; 12])
        .serialize()
        .unwrap()
}

/// Registriert einen Client beim Relay per STUN-Binding und verwirft die Antwort
async fn anmelden(socket: &UdpSocket, relay_addr: SocketAddr) {
    socket.send_to(&binding_anfrage(0x42), relay_addr).await.unwrap();
    empfangen(socket).await;
}

fn rtp_mit_pegel(payload_typ: u8, sequenz: u16, dbov: f32) -> Vec<u8> {
    let mut paket = RtpPaket::neu(payload_typ, sequenz, 960 * sequenz as u32, 0xAB00 + sequenz as u32, vec![0x55; 40]);
    paket.client_lautstaerke_setzen(1, dbov, true);
    paket.encode().unwrap()
}

// ---------------------------------------------------------------------------
// STUN
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stun_binding_antwort() {
    let metriken = RelayMetriken::neu().unwrap();
    let relay = MediaRelay::binden(test_config())
        .await
        .unwrap()
        .mit_metriken(metriken.clone())
        .starten(None);
    let relay_addr = relay.lokale_adresse().unwrap();

    let socket = client().await;
    socket.send_to(&binding_anfrage(7), relay_addr).await.unwrap();

    let bytes = empfangen(&socket).await;
    let antwort = StunNachricht::parse(&bytes).unwrap();
    assert_eq!(antwort.methode, StunMethode::BINDING);
    assert_eq!(antwort.klasse, StunKlasse::Erfolg);
    assert_eq!(antwort.transaktions_id, [7; 12]);
    assert_eq!(
        antwort.xor_abgebildete_adresse(),
        Some(socket.local_addr().unwrap())
    );
    assert!(stun::integritaet_pruefen(&bytes, STANDARD_ICE_PASSWORT));
    assert!(stun::fingerabdruck_pruefen(&bytes));

    // Zaehler wird erst nach dem Senden erhoeht
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(metriken.stun_antworten.with_label_values(&["erfolg"]).get(), 1);
    assert_eq!(metriken.pakete_empfangen.with_label_values(&["stun"]).get(), 1);
    assert_eq!(metriken.assoziationen.get(), 1);

    relay.stoppen().await;
}

#[tokio::test]
async fn stun_nicht_unterstuetzte_methode() {
    let (relay, relay_addr) = relay_starten(test_config()).await;

    let socket = client().await;
    let anfrage = StunNachricht::neu(StunMethode::ALLOCATE, StunKlasse::Anfrage, [9; 12]);
    socket
        .send_to(&anfrage.serialize().unwrap(), relay_addr)
        .await
        .unwrap();

    let antwort = StunNachricht::parse(&empfangen(&socket).await).unwrap();
    assert_eq!(antwort.klasse, StunKlasse::Fehler);
    assert_eq!(antwort.methode, StunMethode::ALLOCATE);
    assert_eq!(antwort.fehlercode(), Some((500, "Unimplemented".to_string())));

    relay.stoppen().await;
}

#[tokio::test]
async fn stun_indikation_und_muell_ohne_antwort() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let socket = client().await;

    let indikation = StunNachricht::neu(StunMethode::BINDING, StunKlasse::Indikation, [1; 12]);
    socket
        .send_to(&indikation.serialize().unwrap(), relay_addr)
        .await
        .unwrap();
    // STUN-Klasse, aber falscher Cookie
    socket.send_to(&[0x00, 0x01, 0x00, 0x00, 1, 2, 3, 4], relay_addr).await.unwrap();
    // Unbekannte Klasse
    socket.send_to(&[0x70, 0x00], relay_addr).await.unwrap();
    assert!(nichts_empfangen(&socket).await);

    // Relay laeuft weiter
    socket.send_to(&binding_anfrage(3), relay_addr).await.unwrap();
    let antwort = StunNachricht::parse(&empfangen(&socket).await).unwrap();
    assert_eq!(antwort.transaktions_id, [3; 12]);

    relay.stoppen().await;
}

// ---------------------------------------------------------------------------
// Senden / Broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn senden_an_unbekannte_assoziation() {
    let (relay, _) = relay_starten(test_config()).await;
    let handle = relay.handle();

    let socket = client().await;
    let id = handle.aufloesen(&socket.local_addr().unwrap());

    let ergebnis = handle.senden(id, b"hallo").await;
    assert!(matches!(ergebnis, Err(RelayFehler::UnbekannteAssoziation(x)) if x == id));
    assert!(nichts_empfangen(&socket).await);

    relay.stoppen().await;
}

#[tokio::test]
async fn senden_an_bekannte_assoziation() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();

    let socket = client().await;
    anmelden(&socket, relay_addr).await;

    let id = handle.aufloesen(&socket.local_addr().unwrap());
    assert_eq!(handle.nachschlagen(&id), Some(socket.local_addr().unwrap()));
    handle.senden(id, b"hallo").await.unwrap();
    assert_eq!(empfangen(&socket).await, b"hallo");

    relay.stoppen().await;
}

#[tokio::test]
async fn broadcast_nie_an_absender() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let a = client().await;
    let b = client().await;
    let c = client().await;
    for s in [&a, &b, &c] {
        anmelden(s, relay_addr).await;
    }

    // SRTP-Bereich ohne Konferenz -> an alle anderen
    let srtp = [0x80, 0x6F, 0x00, 0x01, 0xDE, 0xAD];
    a.send_to(&srtp, relay_addr).await.unwrap();
    assert_eq!(empfangen(&b).await, srtp);
    assert_eq!(empfangen(&c).await, srtp);
    assert!(nichts_empfangen(&a).await);

    // DTLS ohne Tunnel ebenso
    let dtls = [0x17, 0xFE, 0xFD, 0x00];
    b.send_to(&dtls, relay_addr).await.unwrap();
    assert_eq!(empfangen(&a).await, dtls);
    assert_eq!(empfangen(&c).await, dtls);
    assert!(nichts_empfangen(&b).await);

    relay.stoppen().await;
}

#[tokio::test]
async fn ohne_broadcast_rueckfall_wird_verworfen() {
    let mut config = test_config();
    config.broadcast_rueckfall = false;
    let (relay, relay_addr) = relay_starten(config).await;

    let a = client().await;
    let b = client().await;
    anmelden(&a, relay_addr).await;
    anmelden(&b, relay_addr).await;

    a.send_to(&[0x80, 0x6F, 0x00, 0x01], relay_addr).await.unwrap();
    assert!(nichts_empfangen(&b).await);

    relay.stoppen().await;
}

// ---------------------------------------------------------------------------
// Selective Forwarding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sfu_verteilt_sprecher_audio() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();
    let konferenz = KonferenzId(1);

    let a = client().await;
    let b = client().await;
    let c = client().await;
    let mut ids = Vec::new();
    for s in [&a, &b, &c] {
        anmelden(s, relay_addr).await;
        let id = handle.aufloesen(&s.local_addr().unwrap());
        handle.beitreten(konferenz, id).await.unwrap();
        ids.push(id);
    }

    a.send_to(&rtp_mit_pegel(109, 1, -10.0), relay_addr).await.unwrap();

    for s in [&b, &c] {
        let paket = RtpPaket::decode(&empfangen(s).await).unwrap();
        assert_eq!(paket.payload_typ, 109);
        assert_eq!(paket.sequenz, 1);
        assert_eq!(paket.nutzdaten, vec![0x55; 40]);
    }
    assert!(nichts_empfangen(&a).await);
    assert_eq!(handle.aktive_sprecher(konferenz).await.unwrap(), vec![ids[0]]);

    // Video des aktiven Sprechers geht mit unveraendertem Payload-Typ an alle anderen
    a.send_to(&rtp_mit_pegel(96, 2, -10.0), relay_addr).await.unwrap();
    for s in [&b, &c] {
        let paket = RtpPaket::decode(&empfangen(s).await).unwrap();
        assert_eq!(paket.payload_typ, 96);
    }

    // Nicht-Sprecher unter der Schwelle: kein Fan-out
    b.send_to(&rtp_mit_pegel(109, 3, -60.0), relay_addr).await.unwrap();
    assert!(nichts_empfangen(&a).await);
    assert!(nichts_empfangen(&c).await);

    relay.stoppen().await;
}

#[tokio::test]
async fn stumme_teilnehmer_werden_nicht_sprecher() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();
    let konferenz = KonferenzId(2);

    let a = client().await;
    let b = client().await;
    for s in [&a, &b] {
        anmelden(s, relay_addr).await;
        handle
            .beitreten(konferenz, handle.aufloesen(&s.local_addr().unwrap()))
            .await
            .unwrap();
    }
    let id_a = handle.aufloesen(&a.local_addr().unwrap());
    handle.stummschalten(id_a, true).await.unwrap();

    a.send_to(&rtp_mit_pegel(109, 1, -5.0), relay_addr).await.unwrap();
    assert!(nichts_empfangen(&b).await);
    assert!(handle.aktive_sprecher(konferenz).await.unwrap().is_empty());

    relay.stoppen().await;
}

#[tokio::test]
async fn konferenz_beenden_vergisst_assoziationen() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();
    let konferenz = KonferenzId(3);

    let a = client().await;
    let b = client().await;
    let mut ids = Vec::new();
    for s in [&a, &b] {
        anmelden(s, relay_addr).await;
        let id = handle.aufloesen(&s.local_addr().unwrap());
        handle.beitreten(konferenz, id).await.unwrap();
        ids.push(id);
    }
    assert_eq!(handle.assoziationen(), 2);

    let mut entfernt = handle.konferenz_beenden(konferenz).await.unwrap();
    entfernt.sort();
    ids.sort();
    assert_eq!(entfernt, ids);
    assert_eq!(handle.assoziationen(), 0);
    assert!(handle.senden(ids[0], b"x").await.unwrap_err().ist_unbekannte_assoziation());

    relay.stoppen().await;
}

#[tokio::test]
async fn verlassen_entfernt_assoziation() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();
    let konferenz = KonferenzId(4);

    let a = client().await;
    anmelden(&a, relay_addr).await;
    let id = handle.aufloesen(&a.local_addr().unwrap());
    handle.beitreten(konferenz, id).await.unwrap();
    handle.verlassen(konferenz, id).await.unwrap();

    assert_eq!(handle.nachschlagen(&id), None);
    assert!(handle.aktive_sprecher(konferenz).await.unwrap().is_empty());

    relay.stoppen().await;
}

// ---------------------------------------------------------------------------
// Key-Management-Tunnel
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TunnelAufruf {
    assoziation: AssoziationsId,
    daten: Vec<u8>,
    profile: Option<Vec<SchutzProfil>>,
}

struct TestTunnel(mpsc::UnboundedSender<TunnelAufruf>);

#[async_trait]
impl KmfTunnel for TestTunnel {
    async fn senden(&self, assoziation: AssoziationsId, daten: &[u8]) -> RelayResult<()> {
        let _ = self.0.send(TunnelAufruf {
            assoziation,
            daten: daten.to_vec(),
            profile: None,
        });
        Ok(())
    }

    async fn senden_mit_profilen(
        &self,
        assoziation: AssoziationsId,
        daten: &[u8],
        profile: &[SchutzProfil],
    ) -> RelayResult<()> {
        let _ = self.0.send(TunnelAufruf {
            assoziation,
            daten: daten.to_vec(),
            profile: Some(profile.to_vec()),
        });
        Ok(())
    }
}

#[tokio::test]
async fn dtls_geht_an_tunnel() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let relay = MediaRelay::binden(test_config())
        .await
        .unwrap()
        .starten(Some(Arc::new(TestTunnel(tx))));
    let relay_addr = relay.lokale_adresse().unwrap();
    let handle = relay.handle();

    let a = client().await;
    let b = client().await;
    anmelden(&b, relay_addr).await;
    let id_a = handle.aufloesen(&a.local_addr().unwrap());

    let mut client_hello = vec![0u8; 32];
    client_hello[0] = 0x16;
    client_hello[13] = 0x01;
    a.send_to(&client_hello, relay_addr).await.unwrap();

    let aufruf = tokio::time::timeout(WARTEZEIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(aufruf.assoziation, id_a);
    assert_eq!(aufruf.daten, client_hello);
    assert_eq!(
        aufruf.profile,
        Some(vec![SchutzProfil::AES128_CM_SHA1_80, SchutzProfil::AES128_CM_SHA1_32])
    );

    let mut finished = client_hello.clone();
    finished[13] = 0x14;
    a.send_to(&finished, relay_addr).await.unwrap();
    let aufruf = tokio::time::timeout(WARTEZEIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(aufruf.profile, None);

    // Mit Tunnel kein Broadcast
    assert!(nichts_empfangen(&b).await);

    // Antwort des Tunnels ueber die Zustellung
    handle.senden(id_a, b"\x16server-hello").await.unwrap();
    assert_eq!(empfangen(&a).await, b"\x16server-hello");

    relay.stoppen().await;
}

#[tokio::test]
async fn dtls_mit_tunnel_kein_echo_an_absender() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let relay = MediaRelay::binden(test_config())
        .await
        .unwrap()
        .starten(Some(Arc::new(TestTunnel(tx))));
    let relay_addr = relay.lokale_adresse().unwrap();

    let a = client().await;
    let b = client().await;
    anmelden(&a, relay_addr).await;
    anmelden(&b, relay_addr).await;

    let mut record = vec![0u8; 24];
    record[0] = 0x16;
    record[13] = 0x10;
    a.send_to(&record, relay_addr).await.unwrap();

    let aufruf = tokio::time::timeout(WARTEZEIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(aufruf.daten, record);
    assert!(nichts_empfangen(&a).await);
    assert!(nichts_empfangen(&b).await);

    relay.stoppen().await;
}

/// Meldet getrennte Assoziationen
struct TrennTunnel(mpsc::UnboundedSender<AssoziationsId>);

#[async_trait]
impl KmfTunnel for TrennTunnel {
    async fn senden(&self, _assoziation: AssoziationsId, _daten: &[u8]) -> RelayResult<()> {
        Ok(())
    }

    async fn senden_mit_profilen(
        &self,
        _assoziation: AssoziationsId,
        _daten: &[u8],
        _profile: &[SchutzProfil],
    ) -> RelayResult<()> {
        Ok(())
    }

    fn trennen(&self, assoziation: AssoziationsId) {
        let _ = self.0.send(assoziation);
    }
}

#[tokio::test]
async fn verlassen_trennt_tunnel_verbindung() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let relay = MediaRelay::binden(test_config())
        .await
        .unwrap()
        .starten(Some(Arc::new(TrennTunnel(tx))));
    let relay_addr = relay.lokale_adresse().unwrap();
    let handle = relay.handle();
    let konferenz = KonferenzId(6);

    let a = client().await;
    let b = client().await;
    let mut ids = Vec::new();
    for s in [&a, &b] {
        anmelden(s, relay_addr).await;
        let id = handle.aufloesen(&s.local_addr().unwrap());
        handle.beitreten(konferenz, id).await.unwrap();
        ids.push(id);
    }

    handle.verlassen(konferenz, ids[0]).await.unwrap();
    assert_eq!(rx.try_recv().unwrap(), ids[0]);
    assert!(rx.try_recv().is_err());

    handle.konferenz_beenden(konferenz).await.unwrap();
    assert_eq!(rx.try_recv().unwrap(), ids[1]);

    relay.stoppen().await;
}

// ---------------------------------------------------------------------------
// SRTP-Schluessel
// ---------------------------------------------------------------------------

/// Markiert geschuetzte Pakete mit dem ersten Schluesselbyte am Ende
struct MarkierungsSitzung(u8);

impl SrtpSitzung for MarkierungsSitzung {
    fn schuetzen(&mut self, paket: &[u8]) -> RelayResult<Vec<u8>> {
        Ok([paket, &[self.0]].concat())
    }

    fn entschuetzen(&mut self, paket: &[u8]) -> RelayResult<Vec<u8>> {
        match paket.split_last() {
            Some((&marke, rest)) if marke == self.0 => Ok(rest.to_vec()),
            _ => Err(RelayFehler::Srtp("Authentifizierung fehlgeschlagen".into())),
        }
    }
}

struct MarkierungsFabrik;

impl SrtpFabrik for MarkierungsFabrik {
    fn sitzung_erstellen(
        &self,
        _profil: SchutzProfil,
        master: &[u8],
    ) -> RelayResult<Box<dyn SrtpSitzung>> {
        Ok(Box::new(MarkierungsSitzung(master[0])))
    }
}

fn hbh_datensatz() -> Vec<u8> {
    HbhSchluessel {
        profil: SchutzProfil::AES128_CM_SHA1_80,
        schluessel: SrtpSchluessel {
            client_write_key: vec![0x11; 16],
            server_write_key: vec![0x22; 16],
            master_salt: vec![0x33; 14],
        },
    }
    .encode()
    .unwrap()
}

#[tokio::test]
async fn hbh_schluessel_schuetzen_den_hop() {
    let relay = MediaRelay::binden(test_config())
        .await
        .unwrap()
        .mit_srtp_fabrik(Arc::new(MarkierungsFabrik))
        .starten(None);
    let relay_addr = relay.lokale_adresse().unwrap();

    let a = client().await;
    let b = client().await;
    anmelden(&a, relay_addr).await;
    anmelden(&b, relay_addr).await;

    a.send_to(&hbh_datensatz(), relay_addr).await.unwrap();

    // eingehend mit Client-Key, an B ohne Schluessel im Klartext
    a.send_to(&[0x80, 0x01, 0x02, 0x11], relay_addr).await.unwrap();
    assert_eq!(empfangen(&b).await, [0x80, 0x01, 0x02]);

    // ausgehend zu A mit Server-Key
    b.send_to(&[0x80, 0x03], relay_addr).await.unwrap();
    assert_eq!(empfangen(&a).await, [0x80, 0x03, 0x22]);

    // falsche Markierung wird verworfen
    a.send_to(&[0x80, 0x01, 0x02, 0x99], relay_addr).await.unwrap();
    assert!(nichts_empfangen(&b).await);

    relay.stoppen().await;
}

#[tokio::test]
async fn senden_mit_schluesseln_installiert_und_sendet() {
    let relay = MediaRelay::binden(test_config())
        .await
        .unwrap()
        .mit_srtp_fabrik(Arc::new(MarkierungsFabrik))
        .starten(None);
    let relay_addr = relay.lokale_adresse().unwrap();
    let handle = relay.handle();

    let a = client().await;
    let b = client().await;
    anmelden(&a, relay_addr).await;
    anmelden(&b, relay_addr).await;
    let id_a = handle.aufloesen(&a.local_addr().unwrap());

    let schluessel = SrtpSchluessel {
        client_write_key: vec![0x44; 16],
        server_write_key: vec![0x55; 16],
        master_salt: vec![0x66; 14],
    };
    handle
        .senden_mit_schluesseln(id_a, b"\x14finished", SchutzProfil::AES128_CM_SHA1_80, schluessel)
        .await
        .unwrap();
    assert_eq!(empfangen(&a).await, b"\x14finished");

    b.send_to(&[0x80, 0x07], relay_addr).await.unwrap();
    assert_eq!(empfangen(&a).await, [0x80, 0x07, 0x55]);

    relay.stoppen().await;
}

#[tokio::test]
async fn senden_mit_schluesseln_ohne_fabrik() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();

    let a = client().await;
    let b = client().await;
    anmelden(&a, relay_addr).await;
    anmelden(&b, relay_addr).await;
    let id_a = handle.aufloesen(&a.local_addr().unwrap());

    let schluessel = SrtpSchluessel {
        client_write_key: vec![0x44; 16],
        server_write_key: vec![0x55; 16],
        master_salt: vec![0x66; 14],
    };
    handle
        .senden_mit_schluesseln(id_a, b"\x14finished", SchutzProfil::AES128_CM_SHA1_80, schluessel)
        .await
        .expect("fehlende Fabrik darf das Senden nicht blockieren");
    assert_eq!(empfangen(&a).await, b"\x14finished");
    assert_eq!(
        handle.schutzprofil(id_a).await.unwrap(),
        Some(SchutzProfil::AES128_CM_SHA1_80)
    );

    // Medien laufen unverschluesselt weiter
    b.send_to(&[0x80, 0x07], relay_addr).await.unwrap();
    assert_eq!(empfangen(&a).await, [0x80, 0x07]);

    relay.stoppen().await;
}

// ---------------------------------------------------------------------------
// Stoppen
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stoppen_gibt_port_frei() {
    let (relay, relay_addr) = relay_starten(test_config()).await;
    let handle = relay.handle();

    let a = client().await;
    anmelden(&a, relay_addr).await;
    let id = handle.aufloesen(&a.local_addr().unwrap());

    relay.stoppen().await;

    assert!(matches!(handle.senden(id, b"x").await, Err(RelayFehler::Gestoppt)));
    UdpSocket::bind(relay_addr)
        .await
        .expect("Port muss nach dem Stoppen frei sein");
}
