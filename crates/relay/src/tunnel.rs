//! UDP-Weiterleitung zum Key-Management-Peer
//!
//! Pro Assoziation wird ein eigener UDP-Socket zum Key-Management-Peer
//! geoeffnet. Ein Monitor-Task pro Socket liest die Antworten und stellt
//! sie dem Relay zu: DTLS-Pakete gehen an den Endpunkt der Assoziation,
//! Hop-by-Hop-Schluesseldatensaetze werden als SRTP-Schluessel installiert.
//!
//! ```text
//! Relay --KmfTunnel::senden--> UdpWeiterleiter --UDP--> Key-Management
//!   ^                                                        |
//!   +---RelayZustellung::senden / schluessel_setzen <--Monitor
//! ```

use crate::error::{RelayFehler, RelayResult};
use crate::kollaborateure::{KmfTunnel, RelayZustellung};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use funkrelais_core::AssoziationsId;
use funkrelais_protocol::{klassifizieren, HbhSchluessel, PaketKlasse, SchutzProfil};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Empfangspuffer der Tunnel-Sockets
const TUNNEL_PUFFER_GROESSE: usize = 2048;

/// Socket und Monitor-Task einer Assoziation
struct TunnelVerbindung {
    socket: Arc<UdpSocket>,
    monitor: JoinHandle<()>,
}

/// Key-Management-Tunnel ueber UDP
pub struct UdpWeiterleiter {
    server: SocketAddr,
    zustellung: Arc<dyn RelayZustellung>,
    verbindungen: DashMap<AssoziationsId, TunnelVerbindung>,
}

impl UdpWeiterleiter {
    pub fn neu(server: SocketAddr, zustellung: Arc<dyn RelayZustellung>) -> Self {
        Self {
            server,
            zustellung,
            verbindungen: DashMap::new(),
        }
    }

    /// Aufloesung eines Hostnamens wie "kmf.example:4000"
    pub async fn verbinden(
        server: &str,
        zustellung: Arc<dyn RelayZustellung>,
    ) -> RelayResult<Self> {
        let adresse = tokio::net::lookup_host(server)
            .await?
            .next()
            .ok_or_else(|| RelayFehler::Tunnel(format!("Adresse nicht aufloesbar: {server}")))?;
        tracing::info!(server = %adresse, "Key-Management-Tunnel konfiguriert");
        Ok(Self::neu(adresse, zustellung))
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Anzahl offener Tunnel-Verbindungen
    pub fn verbindungen(&self) -> usize {
        self.verbindungen.len()
    }

    /// Schliesst alle Verbindungen und beendet die Monitor-Tasks
    pub fn schliessen(&self) {
        self.verbindungen.retain(|_, verbindung| {
            verbindung.monitor.abort();
            false
        });
    }

    /// Liefert den Socket der Assoziation, oeffnet ihn beim ersten Paket
    async fn socket_fuer(&self, assoziation: AssoziationsId) -> RelayResult<Arc<UdpSocket>> {
        if let Some(verbindung) = self.verbindungen.get(&assoziation) {
            return Ok(Arc::clone(&verbindung.socket));
        }

        let lokal = match self.server.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(lokal).await?;
        socket.connect(self.server).await?;
        let socket = Arc::new(socket);

        let monitor = tokio::spawn(monitor(
            assoziation,
            Arc::clone(&socket),
            Arc::clone(&self.zustellung),
        ));
        tracing::debug!(assoziation = %assoziation, server = %self.server, "Tunnel-Verbindung geoeffnet");

        // Ein paralleler Aufrufer kann schneller gewesen sein
        match self.verbindungen.entry(assoziation) {
            Entry::Occupied(vorhanden) => {
                monitor.abort();
                Ok(Arc::clone(&vorhanden.get().socket))
            }
            Entry::Vacant(frei) => {
                frei.insert(TunnelVerbindung {
                    socket: Arc::clone(&socket),
                    monitor,
                });
                Ok(socket)
            }
        }
    }
}

impl Drop for UdpWeiterleiter {
    fn drop(&mut self) {
        self.schliessen();
    }
}

#[async_trait]
impl KmfTunnel for UdpWeiterleiter {
    async fn senden(&self, assoziation: AssoziationsId, daten: &[u8]) -> RelayResult<()> {
        let socket = self.socket_fuer(assoziation).await?;
        socket.send(daten).await?;
        tracing::trace!(assoziation = %assoziation, bytes = daten.len(), "Relay -> Key-Management");
        Ok(())
    }

    async fn senden_mit_profilen(
        &self,
        assoziation: AssoziationsId,
        daten: &[u8],
        profile: &[SchutzProfil],
    ) -> RelayResult<()> {
        // Der Peer handelt die Profile im Handshake selbst aus
        tracing::debug!(
            assoziation = %assoziation,
            profile = ?profile,
            "ClientHello an Key-Management"
        );
        self.senden(assoziation, daten).await
    }

    fn trennen(&self, assoziation: AssoziationsId) {
        if let Some((_, verbindung)) = self.verbindungen.remove(&assoziation) {
            verbindung.monitor.abort();
            tracing::debug!(assoziation = %assoziation, "Tunnel-Verbindung geschlossen");
        }
    }
}

/// Liest Antworten des Key-Management-Peers fuer eine Assoziation
async fn monitor(
    assoziation: AssoziationsId,
    socket: Arc<UdpSocket>,
    zustellung: Arc<dyn RelayZustellung>,
) {
    let mut puffer = vec![0u8; TUNNEL_PUFFER_GROESSE];

    loop {
        let laenge = match socket.recv(&mut puffer).await {
            Ok(laenge) => laenge,
            Err(e) => {
                tracing::warn!(assoziation = %assoziation, fehler = %e, "Tunnel-Lesefehler, Monitor beendet");
                return;
            }
        };
        let daten = &puffer[..laenge];
        tracing::trace!(assoziation = %assoziation, bytes = laenge, "Key-Management -> Relay");

        match klassifizieren(daten) {
            PaketKlasse::Dtls => {
                if let Err(e) = zustellung.senden(assoziation, daten).await {
                    tracing::warn!(assoziation = %assoziation, fehler = %e, "DTLS-Zustellung fehlgeschlagen");
                }
            }
            PaketKlasse::HbhSchluessel => match HbhSchluessel::decode(daten) {
                Ok(schluessel) => {
                    if let Err(e) = zustellung.schluessel_setzen(assoziation, schluessel).await {
                        tracing::warn!(assoziation = %assoziation, fehler = %e, "Schluessel nicht uebernommen");
                    }
                }
                Err(e) => {
                    tracing::warn!(assoziation = %assoziation, fehler = %e, "Ungueltiger Schluesseldatensatz");
                }
            },
            andere => {
                tracing::debug!(assoziation = %assoziation, klasse = %andere, "Unerwartetes Paket vom Key-Management");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funkrelais_protocol::SrtpSchluessel;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    enum Zugestellt {
        Paket(AssoziationsId, Vec<u8>),
        Schluessel(AssoziationsId, HbhSchluessel),
    }

    struct KanalZustellung(mpsc::UnboundedSender<Zugestellt>);

    #[async_trait]
    impl RelayZustellung for KanalZustellung {
        async fn senden(&self, assoziation: AssoziationsId, daten: &[u8]) -> RelayResult<()> {
            let _ = self.0.send(Zugestellt::Paket(assoziation, daten.to_vec()));
            Ok(())
        }

        async fn senden_mit_schluesseln(
            &self,
            assoziation: AssoziationsId,
            daten: &[u8],
            _profil: SchutzProfil,
            _schluessel: SrtpSchluessel,
        ) -> RelayResult<()> {
            self.senden(assoziation, daten).await
        }

        async fn schluessel_setzen(
            &self,
            assoziation: AssoziationsId,
            schluessel: HbhSchluessel,
        ) -> RelayResult<()> {
            let _ = self.0.send(Zugestellt::Schluessel(assoziation, schluessel));
            Ok(())
        }
    }

    /// Key-Management-Attrappe: haengt "-ack" an DTLS-Pakete, beantwortet
    /// alles andere mit einem Schluesseldatensatz
    async fn kmf_attrappe() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let adresse = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut puffer = [0u8; 2048];
            while let Ok((laenge, absender)) = socket.recv_from(&mut puffer).await {
                let antwort = if laenge > 0 && puffer[0] == 0x16 {
                    [&puffer[..laenge], b"-ack"].concat()
                } else {
                    beispiel_schluessel().encode().unwrap()
                };
                let _ = socket.send_to(&antwort, absender).await;
            }
        });
        adresse
    }

    fn beispiel_schluessel() -> HbhSchluessel {
        HbhSchluessel {
            profil: SchutzProfil::AES128_CM_SHA1_80,
            schluessel: SrtpSchluessel {
                client_write_key: vec![0xA1; 16],
                server_write_key: vec![0xB2; 16],
                master_salt: vec![0xC3; 14],
            },
        }
    }

    fn assoziation(n: u8) -> AssoziationsId {
        AssoziationsId([n; 16])
    }

    async fn naechste(rx: &mut mpsc::UnboundedReceiver<Zugestellt>) -> Zugestellt {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Zustellung muss eintreffen")
            .expect("Kanal offen")
    }

    #[tokio::test]
    async fn dtls_antwort_wird_zugestellt() {
        let server = kmf_attrappe().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tunnel = UdpWeiterleiter::neu(server, Arc::new(KanalZustellung(tx)));

        tunnel.senden(assoziation(1), &[0x16, 0xFE, 0xFD]).await.unwrap();

        match naechste(&mut rx).await {
            Zugestellt::Paket(id, daten) => {
                assert_eq!(id, assoziation(1));
                assert_eq!(daten, [&[0x16, 0xFE, 0xFD][..], b"-ack"].concat());
            }
            andere => panic!("Unerwartete Zustellung: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn schluessel_werden_gesetzt() {
        let server = kmf_attrappe().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tunnel = UdpWeiterleiter::neu(server, Arc::new(KanalZustellung(tx)));

        tunnel.senden(assoziation(2), &[0x17, 0x00]).await.unwrap();
        // kein Handshake-Paket: die Attrappe antwortet mit Schluesseln
        match naechste(&mut rx).await {
            Zugestellt::Schluessel(id, schluessel) => {
                assert_eq!(id, assoziation(2));
                assert_eq!(schluessel, beispiel_schluessel());
            }
            andere => panic!("Unerwartete Zustellung: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn eine_verbindung_pro_assoziation() {
        let server = kmf_attrappe().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tunnel = UdpWeiterleiter::neu(server, Arc::new(KanalZustellung(tx)));

        tunnel.senden(assoziation(3), &[0x16, 0x01]).await.unwrap();
        tunnel
            .senden_mit_profilen(assoziation(3), &[0x16, 0x02], &[SchutzProfil::AES128_CM_SHA1_80])
            .await
            .unwrap();
        tunnel.senden(assoziation(4), &[0x16, 0x03]).await.unwrap();

        for _ in 0..3 {
            naechste(&mut rx).await;
        }
        assert_eq!(tunnel.verbindungen(), 2);

        tunnel.schliessen();
        assert_eq!(tunnel.verbindungen(), 0);
    }

    #[tokio::test]
    async fn trennen_schliesst_nur_die_eigene_verbindung() {
        let server = kmf_attrappe().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tunnel = UdpWeiterleiter::neu(server, Arc::new(KanalZustellung(tx)));

        tunnel.senden(assoziation(5), &[0x16, 0x01]).await.unwrap();
        tunnel.senden(assoziation(6), &[0x16, 0x02]).await.unwrap();
        naechste(&mut rx).await;
        naechste(&mut rx).await;
        assert_eq!(tunnel.verbindungen(), 2);

        tunnel.trennen(assoziation(5));
        assert_eq!(tunnel.verbindungen(), 1);
        // unbekannte Assoziation: nichts zu tun
        tunnel.trennen(assoziation(5));
        assert_eq!(tunnel.verbindungen(), 1);

        // erneutes Senden oeffnet eine frische Verbindung
        tunnel.senden(assoziation(5), &[0x16, 0x03]).await.unwrap();
        match naechste(&mut rx).await {
            Zugestellt::Paket(id, _) => assert_eq!(id, assoziation(5)),
            andere => panic!("Unerwartete Zustellung: {andere:?}"),
        }
        assert_eq!(tunnel.verbindungen(), 2);
    }
}
