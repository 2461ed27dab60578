//! Schnittstellen zu externen Kollaborateuren
//!
//! Der Relay und der Key-Management-Tunnel kennen sich nur ueber diese
//! Traits: der Relay haelt einen [`KmfTunnel`], der Tunnel eine
//! [`RelayZustellung`]. Beide werden von der Wurzel (Server) verdrahtet.
//!
//! DTLS- und SRTP-Implementierungen sind nicht Teil dieses Crates, der
//! Relay benutzt sie ueber [`DtlsSitzung`], [`SrtpSitzung`] und
//! [`SrtpFabrik`].

use crate::error::{RelayFehler, RelayResult};
use async_trait::async_trait;
use funkrelais_core::AssoziationsId;
use funkrelais_protocol::{HbhSchluessel, SchutzProfil, SrtpSchluessel};

/// Richtung Key-Management (vom Relay aufgerufen)
#[async_trait]
pub trait KmfTunnel: Send + Sync {
    /// Leitet ein DTLS-Paket einer Assoziation weiter
    async fn senden(&self, assoziation: AssoziationsId, daten: &[u8]) -> RelayResult<()>;

    /// Leitet den ersten Handshake-Flight mit den unterstuetzten Profilen weiter
    async fn senden_mit_profilen(
        &self,
        assoziation: AssoziationsId,
        daten: &[u8],
        profile: &[SchutzProfil],
    ) -> RelayResult<()>;

    /// Der Relay hat die Assoziation vergessen, zugehoerige Ressourcen freigeben
    fn trennen(&self, _assoziation: AssoziationsId) {}
}

/// Richtung Relay (vom Tunnel aufgerufen)
#[async_trait]
pub trait RelayZustellung: Send + Sync {
    /// Sendet Bytes an die Adresse einer bekannten Assoziation
    async fn senden(&self, assoziation: AssoziationsId, daten: &[u8]) -> RelayResult<()>;

    /// Hinterlegt Schluessel fuer die Assoziation und sendet ein DTLS-Paket
    async fn senden_mit_schluesseln(
        &self,
        assoziation: AssoziationsId,
        daten: &[u8],
        profil: SchutzProfil,
        schluessel: SrtpSchluessel,
    ) -> RelayResult<()>;

    /// Hinterlegt Hop-by-Hop-Schluessel fuer die Assoziation
    async fn schluessel_setzen(
        &self,
        assoziation: AssoziationsId,
        schluessel: HbhSchluessel,
    ) -> RelayResult<()>;
}

/// SRTP-Kontext einer Richtung
pub trait SrtpSitzung: Send + Sync {
    fn schuetzen(&mut self, paket: &[u8]) -> RelayResult<Vec<u8>>;
    fn entschuetzen(&mut self, paket: &[u8]) -> RelayResult<Vec<u8>>;
}

/// Erzeugt SRTP-Kontexte aus Profil und Master-Key (Key || Salt)
pub trait SrtpFabrik: Send + Sync {
    fn sitzung_erstellen(
        &self,
        profil: SchutzProfil,
        master: &[u8],
    ) -> RelayResult<Box<dyn SrtpSitzung>>;
}

/// DTLS-Endpunkt, aus dem nach dem Handshake SRTP-Schluessel exportiert werden
pub trait DtlsSitzung: Send + Sync {
    /// Startet bzw. treibt den Handshake voran
    fn kick(&mut self) -> RelayResult<()>;
    fn senden(&mut self, daten: &[u8]) -> RelayResult<()>;
    fn empfangen(&mut self) -> RelayResult<Vec<u8>>;
    /// Handshake abgeschlossen?
    fn fertig(&self) -> bool;
    fn ausgehandeltes_profil(&self) -> RelayResult<SchutzProfil>;
    /// Exporter-Label "EXTRACTOR-dtls_srtp" (RFC 5764 §4.2)
    fn schluesselmaterial_exportieren(&self, laenge: usize) -> RelayResult<Vec<u8>>;
}

/// Leitet die SRTP-Schluessel aus einer abgeschlossenen DTLS-Sitzung ab
///
/// Das exportierte Material ist aufgeteilt in
/// `client_key | server_key | client_salt | server_salt`.
/// Der Datensatz traegt nur ein Salt, verwendet wird das Client-Salt.
pub fn srtp_schluessel_ableiten(dtls: &dyn DtlsSitzung) -> RelayResult<HbhSchluessel> {
    if !dtls.fertig() {
        return Err(RelayFehler::Dtls("Handshake nicht abgeschlossen".into()));
    }

    let profil = dtls.ausgehandeltes_profil()?;
    let key_laenge = profil.schluessel_laenge()?;
    let salt_laenge = profil.salt_laenge()?;
    let gesamt = 2 * (key_laenge + salt_laenge);

    let material = dtls.schluesselmaterial_exportieren(gesamt)?;
    if material.len() != gesamt {
        return Err(RelayFehler::Dtls(format!(
            "Schluesselmaterial hat {} statt {} Bytes",
            material.len(),
            gesamt
        )));
    }

    let (client_key, rest) = material.split_at(key_laenge);
    let (server_key, rest) = rest.split_at(key_laenge);
    let (client_salt, _server_salt) = rest.split_at(salt_laenge);

    Ok(HbhSchluessel {
        profil,
        schluessel: SrtpSchluessel {
            client_write_key: client_key.to_vec(),
            server_write_key: server_key.to_vec(),
            master_salt: client_salt.to_vec(),
        },
    })
}
