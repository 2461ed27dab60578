//! STUN-Nachrichten (RFC 5389)
//!
//! Binaere Kodierung und Dekodierung von STUN-Nachrichten fuer die
//! Konnektivitaetspruefungen der Endpunkte.
//!
//! ## Nachrichtenformat (Network Byte Order)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   Nachrichtentyp (Methode + Klassen-Bits 0x0110)
//!  2       2   Laenge (Bytes nach dem Header)
//!  4       4   Magic Cookie 0x2112A442
//!  8      12   Transaktions-ID
//! 20+      N   Attribute: Typ (2), Laenge (2), Wert, Padding auf 4 Bytes
//! ```
//!
//! MESSAGE-INTEGRITY und FINGERPRINT werden beim Serialisieren berechnet
//! und muessen (in dieser Reihenfolge) die letzten Attribute sein.

use crate::error::{ProtokollFehler, ProtokollResult};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

type HmacSha1 = Hmac<Sha1>;

/// Magic Cookie (RFC 5389)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Header-Groesse in Bytes
pub const HEADER_LAENGE: usize = 20;

/// XOR-Konstante fuer FINGERPRINT
pub const FINGERPRINT_XOR: u32 = 0x5354_554e;

/// Laenge eines HMAC-SHA1-Werts
const INTEGRITAET_WERT_LAENGE: usize = 20;

/// Attribut-Header (Typ + Laenge)
const ATTRIBUT_KOPF_LAENGE: usize = 4;

/// Bits im Nachrichtentyp, die die Klasse kodieren
const KLASSEN_MASKE: u16 = 0x0110;

/// Transaktions-ID (12 Bytes)
pub type TransaktionsId = [u8; 12];

// ---------------------------------------------------------------------------
// CRC-32 (IEEE 802.3) fuer FINGERPRINT
// ---------------------------------------------------------------------------

/// CRC-32 Lookup-Tabelle (IEEE-Polynom 0xEDB88320, reflektiert)
const CRC32_TABELLE: [u32; 256] = {
    let mut tabelle = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        tabelle[i as usize] = crc;
        i += 1;
    }
    tabelle
};

/// CRC-32 (IEEE) ueber die gegebenen Bytes
pub fn crc32(daten: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in daten {
        let idx = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABELLE[idx];
    }
    crc ^ 0xFFFF_FFFF
}

// ---------------------------------------------------------------------------
// Methoden, Klassen, Attribut-Typen
// ---------------------------------------------------------------------------

/// STUN-Methode (Nachrichtentyp ohne Klassen-Bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StunMethode(pub u16);

impl StunMethode {
    pub const BINDING: Self = Self(0x001);
    pub const ALLOCATE: Self = Self(0x003);
    pub const REFRESH: Self = Self(0x004);
    pub const SEND: Self = Self(0x006);
    pub const DATA: Self = Self(0x007);
    pub const CREATE_PERMISSION: Self = Self(0x008);
    pub const CHANNEL_BIND: Self = Self(0x009);
    pub const CONNECT: Self = Self(0x00A);
    pub const CONNECTION_BIND: Self = Self(0x00B);
    pub const CONNECTION_ATTEMPT: Self = Self(0x00C);

    /// Lesbarer Name fuer bekannte Methoden
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::BINDING => "Binding",
            Self::ALLOCATE => "Allocate",
            Self::REFRESH => "Refresh",
            Self::SEND => "Send",
            Self::DATA => "Data",
            Self::CREATE_PERMISSION => "CreatePermission",
            Self::CHANNEL_BIND => "ChannelBind",
            Self::CONNECT => "Connect",
            Self::CONNECTION_BIND => "ConnectionBind",
            Self::CONNECTION_ATTEMPT => "ConnectionAttempt",
            _ => return None,
        })
    }
}

impl std::fmt::Display for StunMethode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "<{:#x}>", self.0),
        }
    }
}

/// Klasse einer STUN-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StunKlasse {
    Anfrage,
    Indikation,
    Erfolg,
    Fehler,
}

impl StunKlasse {
    /// Extrahiert die Klasse aus einem Nachrichtentyp
    pub fn aus_typ(typ: u16) -> Self {
        match typ & KLASSEN_MASKE {
            0x0000 => Self::Anfrage,
            0x0010 => Self::Indikation,
            0x0100 => Self::Erfolg,
            _ => Self::Fehler,
        }
    }

    /// Klassen-Bits fuer den Nachrichtentyp
    pub fn bits(&self) -> u16 {
        match self {
            Self::Anfrage => 0x0000,
            Self::Indikation => 0x0010,
            Self::Erfolg => 0x0100,
            Self::Fehler => 0x0110,
        }
    }
}

impl std::fmt::Display for StunKlasse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Anfrage => "Request",
            Self::Indikation => "Indication",
            Self::Erfolg => "Success",
            Self::Fehler => "Error",
        })
    }
}

/// Typ eines STUN-Attributs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributTyp(pub u16);

impl AttributTyp {
    pub const MAPPED_ADDRESS: Self = Self(0x0001);
    pub const CHANGE_REQUEST: Self = Self(0x0003);
    pub const USERNAME: Self = Self(0x0006);
    pub const MESSAGE_INTEGRITY: Self = Self(0x0008);
    pub const ERROR_CODE: Self = Self(0x0009);
    pub const UNKNOWN_ATTRIBUTES: Self = Self(0x000A);
    pub const CHANNEL_NUMBER: Self = Self(0x000C);
    pub const LIFETIME: Self = Self(0x000D);
    pub const XOR_PEER_ADDRESS: Self = Self(0x0012);
    pub const DATA: Self = Self(0x0013);
    pub const REALM: Self = Self(0x0014);
    pub const NONCE: Self = Self(0x0015);
    pub const XOR_RELAYED_ADDRESS: Self = Self(0x0016);
    pub const REQUESTED_ADDRESS_FAMILY: Self = Self(0x0017);
    pub const EVEN_PORT: Self = Self(0x0018);
    pub const REQUESTED_TRANSPORT: Self = Self(0x0019);
    pub const DONT_FRAGMENT: Self = Self(0x001A);
    pub const ACCESS_TOKEN: Self = Self(0x001B);
    pub const XOR_MAPPED_ADDRESS: Self = Self(0x0020);
    pub const RESERVATION_TOKEN: Self = Self(0x0022);
    pub const PRIORITY: Self = Self(0x0024);
    pub const USE_CANDIDATE: Self = Self(0x0025);
    pub const PADDING: Self = Self(0x0026);
    pub const RESPONSE_PORT: Self = Self(0x0027);
    pub const CONNECTION_ID: Self = Self(0x002A);
    pub const SOFTWARE: Self = Self(0x8022);
    pub const ALTERNATE_SERVER: Self = Self(0x8023);
    pub const TRANSACTION_TRANSMIT_COUNTER: Self = Self(0x8025);
    pub const CACHE_TIMEOUT: Self = Self(0x8027);
    pub const FINGERPRINT: Self = Self(0x8028);
    pub const ICE_CONTROLLED: Self = Self(0x8029);
    pub const ICE_CONTROLLING: Self = Self(0x802A);
    pub const RESPONSE_ORIGIN: Self = Self(0x802B);
    pub const OTHER_ADDRESS: Self = Self(0x802C);
    pub const ECN_CHECK: Self = Self(0x802D);
    pub const THIRD_PARTY_AUTHORIZATION: Self = Self(0x802E);
    pub const MOBILITY_TICKET: Self = Self(0x8030);

    /// Lesbarer Name fuer bekannte Attribut-Typen
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::MAPPED_ADDRESS => "MAPPED-ADDRESS",
            Self::CHANGE_REQUEST => "CHANGE-REQUEST",
            Self::USERNAME => "USERNAME",
            Self::MESSAGE_INTEGRITY => "MESSAGE-INTEGRITY",
            Self::ERROR_CODE => "ERROR-CODE",
            Self::UNKNOWN_ATTRIBUTES => "UNKNOWN-ATTRIBUTES",
            Self::CHANNEL_NUMBER => "CHANNEL-NUMBER",
            Self::LIFETIME => "LIFETIME",
            Self::XOR_PEER_ADDRESS => "XOR-PEER-ADDRESS",
            Self::DATA => "DATA",
            Self::REALM => "REALM",
            Self::NONCE => "NONCE",
            Self::XOR_RELAYED_ADDRESS => "XOR-RELAYED-ADDRESS",
            Self::REQUESTED_ADDRESS_FAMILY => "REQUESTED-ADDRESS-FAMILY",
            Self::EVEN_PORT => "EVEN-PORT",
            Self::REQUESTED_TRANSPORT => "REQUESTED-TRANSPORT",
            Self::DONT_FRAGMENT => "DONT-FRAGMENT",
            Self::ACCESS_TOKEN => "ACCESS-TOKEN",
            Self::XOR_MAPPED_ADDRESS => "XOR-MAPPED-ADDRESS",
            Self::RESERVATION_TOKEN => "RESERVATION-TOKEN",
            Self::PRIORITY => "PRIORITY",
            Self::USE_CANDIDATE => "USE-CANDIDATE",
            Self::PADDING => "PADDING",
            Self::RESPONSE_PORT => "RESPONSE-PORT",
            Self::CONNECTION_ID => "CONNECTION-ID",
            Self::SOFTWARE => "SOFTWARE",
            Self::ALTERNATE_SERVER => "ALTERNATE-SERVER",
            Self::TRANSACTION_TRANSMIT_COUNTER => "TRANSACTION-TRANSMIT-COUNTER",
            Self::CACHE_TIMEOUT => "CACHE-TIMEOUT",
            Self::FINGERPRINT => "FINGERPRINT",
            Self::ICE_CONTROLLED => "ICE-CONTROLLED",
            Self::ICE_CONTROLLING => "ICE-CONTROLLING",
            Self::RESPONSE_ORIGIN => "RESPONSE-ORIGIN",
            Self::OTHER_ADDRESS => "OTHER-ADDRESS",
            Self::ECN_CHECK => "ECN-CHECK",
            Self::THIRD_PARTY_AUTHORIZATION => "THIRD-PARTY-AUTHORIZATION",
            Self::MOBILITY_TICKET => "MOBILITY-TICKET",
            _ => return None,
        })
    }
}

impl std::fmt::Display for AttributTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "<{:#06x}>", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// StunAttribut
// ---------------------------------------------------------------------------

/// Ein einzelnes TLV-Attribut (Wert ohne Padding)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunAttribut {
    pub typ: AttributTyp,
    pub wert: Vec<u8>,
}

impl std::fmt::Display for StunAttribut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = ", self.typ)?;
        match self.typ {
            AttributTyp::ERROR_CODE if self.wert.len() >= 4 => write!(
                f,
                "{}{:02} {}",
                self.wert[2] & 0x07,
                self.wert[3],
                String::from_utf8_lossy(&self.wert[4..])
            ),
            AttributTyp::USERNAME | AttributTyp::SOFTWARE | AttributTyp::REALM => {
                f.write_str(&String::from_utf8_lossy(&self.wert))
            }
            _ => hex_schreiben(f, &self.wert),
        }
    }
}

fn hex_schreiben(f: &mut std::fmt::Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StunNachricht
// ---------------------------------------------------------------------------

/// Dekodierte STUN-Nachricht
///
/// `ice_passwort` wird nur zur Berechnung von MESSAGE-INTEGRITY beim
/// Serialisieren verwendet und nie auf die Leitung geschrieben.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunNachricht {
    pub methode: StunMethode,
    pub klasse: StunKlasse,
    pub transaktions_id: TransaktionsId,
    pub attribute: Vec<StunAttribut>,
    pub ice_passwort: Option<String>,
}

impl StunNachricht {
    /// Erstellt eine leere Nachricht
    pub fn neu(methode: StunMethode, klasse: StunKlasse, transaktions_id: TransaktionsId) -> Self {
        Self {
            methode,
            klasse,
            transaktions_id,
            attribute: Vec::new(),
            ice_passwort: None,
        }
    }

    /// Vollstaendiger 16-Bit-Nachrichtentyp (Methode + Klasse)
    pub fn nachrichtentyp(&self) -> u16 {
        (self.methode.0 & !KLASSEN_MASKE) | self.klasse.bits()
    }

    /// Dekodiert eine Nachricht
    ///
    /// # Fehler
    /// - Nachricht kuerzer als der Header oder als das Laengenfeld angibt
    /// - falsches Magic Cookie
    /// - abgeschnittenes Attribut
    ///
    /// Unbekannte Attribut-Typen werden unveraendert uebernommen.
    pub fn parse(daten: &[u8]) -> ProtokollResult<Self> {
        if daten.len() < HEADER_LAENGE {
            return Err(ProtokollFehler::StunZuKurz(daten.len()));
        }

        let typ = u16::from_be_bytes([daten[0], daten[1]]);
        let laenge = u16::from_be_bytes([daten[2], daten[3]]) as usize;
        let cookie = u32::from_be_bytes([daten[4], daten[5], daten[6], daten[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(ProtokollFehler::StunCookie(cookie));
        }
        if HEADER_LAENGE + laenge > daten.len() {
            return Err(ProtokollFehler::StunLaenge {
                angegeben: laenge,
                vorhanden: daten.len() - HEADER_LAENGE,
            });
        }

        let mut transaktions_id = [0u8; 12];
        transaktions_id.copy_from_slice(&daten[8..HEADER_LAENGE]);

        let mut attribute = Vec::new();
        let mut rest = &daten[HEADER_LAENGE..HEADER_LAENGE + laenge];
        while !rest.is_empty() {
            let (attribut, verbraucht) = attribut_lesen(rest)?;
            attribute.push(attribut);
            rest = &rest[verbraucht..];
        }

        Ok(Self {
            methode: StunMethode(typ & !KLASSEN_MASKE),
            klasse: StunKlasse::aus_typ(typ),
            transaktions_id,
            attribute,
            ice_passwort: None,
        })
    }

    /// Serialisiert die Nachricht
    ///
    /// Laengenfelder werden nach dem Zusammenbau berechnet. Fuer
    /// MESSAGE-INTEGRITY wird HMAC-SHA1 (Schluessel: `ice_passwort`) ueber alle
    /// vorherigen Bytes berechnet, wobei das Laengenfeld vorlaeufig die 24 Bytes
    /// des Attributs selbst enthaelt. FINGERPRINT ist CRC-32 ueber alle
    /// vorherigen Bytes (vorlaeufige Laenge inkl. 8 Bytes) XOR `0x5354554e`.
    pub fn serialize(&self) -> ProtokollResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_LAENGE + self.attribute.len() * 16);
        buf.extend_from_slice(&self.nachrichtentyp().to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buf.extend_from_slice(&self.transaktions_id);

        let mut integritaet_gesehen = false;
        let mut fingerabdruck_gesehen = false;

        for attribut in &self.attribute {
            if fingerabdruck_gesehen
                || (integritaet_gesehen && attribut.typ != AttributTyp::FINGERPRINT)
            {
                return Err(ProtokollFehler::StunReihenfolge(attribut.typ.0));
            }

            match attribut.typ {
                AttributTyp::MESSAGE_INTEGRITY => {
                    let passwort = self
                        .ice_passwort
                        .as_deref()
                        .ok_or(ProtokollFehler::StunKeinPasswort)?;
                    let vorlaeufig = buf.len() - HEADER_LAENGE
                        + ATTRIBUT_KOPF_LAENGE
                        + INTEGRITAET_WERT_LAENGE;
                    laenge_setzen(&mut buf, vorlaeufig)?;
                    let wert = hmac_sha1(passwort.as_bytes(), &buf)?;
                    attribut_schreiben(&mut buf, attribut.typ, &wert)?;
                    integritaet_gesehen = true;
                }
                AttributTyp::FINGERPRINT => {
                    let vorlaeufig = buf.len() - HEADER_LAENGE + ATTRIBUT_KOPF_LAENGE + 4;
                    laenge_setzen(&mut buf, vorlaeufig)?;
                    let wert = crc32(&buf) ^ FINGERPRINT_XOR;
                    attribut_schreiben(&mut buf, attribut.typ, &wert.to_be_bytes())?;
                    fingerabdruck_gesehen = true;
                }
                _ => attribut_schreiben(&mut buf, attribut.typ, &attribut.wert)?,
            }
        }

        let gesamt = buf.len() - HEADER_LAENGE;
        laenge_setzen(&mut buf, gesamt)?;
        Ok(buf)
    }

    // -----------------------------------------------------------------------
    // Attribute
    // -----------------------------------------------------------------------

    /// Haengt ein Attribut an
    pub fn attribut_hinzufuegen(&mut self, typ: AttributTyp, wert: Vec<u8>) {
        self.attribute.push(StunAttribut { typ, wert });
    }

    /// Erstes Attribut des gegebenen Typs
    pub fn attribut(&self, typ: AttributTyp) -> Option<&StunAttribut> {
        self.attribute.iter().find(|a| a.typ == typ)
    }

    /// ERROR-CODE: `[0, 0, Klasse, Nummer]` gefolgt vom Grund (UTF-8)
    pub fn fehlercode_hinzufuegen(&mut self, code: u16, grund: &str) {
        let mut wert = vec![0, 0, (code / 100) as u8, (code % 100) as u8];
        wert.extend_from_slice(grund.as_bytes());
        self.attribut_hinzufuegen(AttributTyp::ERROR_CODE, wert);
    }

    /// Liest ERROR-CODE als (Code, Grund)
    pub fn fehlercode(&self) -> Option<(u16, String)> {
        let wert = &self.attribut(AttributTyp::ERROR_CODE)?.wert;
        if wert.len() < 4 {
            return None;
        }
        let code = (wert[2] & 0x07) as u16 * 100 + wert[3] as u16;
        Some((code, String::from_utf8_lossy(&wert[4..]).into_owned()))
    }

    /// MAPPED-ADDRESS
    pub fn abgebildete_adresse_hinzufuegen(&mut self, adresse: SocketAddr) {
        self.attribut_hinzufuegen(AttributTyp::MAPPED_ADDRESS, adresse_kodieren(adresse));
    }

    /// XOR-MAPPED-ADDRESS
    ///
    /// Port wird mit den oberen 16 Bit des Cookies verknuepft, die Adresse mit
    /// Cookie und (bei IPv6) der Transaktions-ID.
    pub fn xor_abgebildete_adresse_hinzufuegen(&mut self, adresse: SocketAddr) {
        let mut wert = adresse_kodieren(adresse);
        let maske = self.xor_maske();
        wert[2] ^= maske[0];
        wert[3] ^= maske[1];
        for (i, byte) in wert[4..].iter_mut().enumerate() {
            *byte ^= maske[i];
        }
        self.attribut_hinzufuegen(AttributTyp::XOR_MAPPED_ADDRESS, wert);
    }

    /// Dekodiert XOR-MAPPED-ADDRESS, falls vorhanden und gueltig
    pub fn xor_abgebildete_adresse(&self) -> Option<SocketAddr> {
        let wert = &self.attribut(AttributTyp::XOR_MAPPED_ADDRESS)?.wert;
        let maske = self.xor_maske();
        let mut entschluesselt = wert.clone();
        if entschluesselt.len() < 4 {
            return None;
        }
        entschluesselt[2] ^= maske[0];
        entschluesselt[3] ^= maske[1];
        for (i, byte) in entschluesselt[4..].iter_mut().enumerate().take(maske.len()) {
            *byte ^= maske[i];
        }
        adresse_dekodieren(&entschluesselt)
    }

    /// Platzhalter fuer MESSAGE-INTEGRITY (Wert wird beim Serialisieren berechnet)
    pub fn integritaet_hinzufuegen(&mut self) {
        self.attribut_hinzufuegen(AttributTyp::MESSAGE_INTEGRITY, Vec::new());
    }

    /// Platzhalter fuer FINGERPRINT (Wert wird beim Serialisieren berechnet)
    pub fn fingerabdruck_hinzufuegen(&mut self) {
        self.attribut_hinzufuegen(AttributTyp::FINGERPRINT, Vec::new());
    }

    /// Cookie gefolgt von der Transaktions-ID (Header-Bytes 4..20)
    fn xor_maske(&self) -> [u8; 16] {
        let mut maske = [0u8; 16];
        maske[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        maske[4..].copy_from_slice(&self.transaktions_id);
        maske
    }
}

impl std::fmt::Display for StunNachricht {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: STUN {}, TXN ID = ", self.klasse, self.methode)?;
        hex_schreiben(f, &self.transaktions_id)?;
        for attribut in &self.attribute {
            write!(f, "\n  {}", attribut)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Antworten
// ---------------------------------------------------------------------------

/// Erfolgsantwort auf eine Binding-Anfrage
///
/// Enthaelt XOR-MAPPED-ADDRESS, MESSAGE-INTEGRITY und FINGERPRINT.
pub fn binding_erfolg(
    anfrage: &StunNachricht,
    absender: SocketAddr,
    ice_passwort: &str,
) -> StunNachricht {
    let mut antwort = StunNachricht::neu(
        StunMethode::BINDING,
        StunKlasse::Erfolg,
        anfrage.transaktions_id,
    );
    antwort.ice_passwort = Some(ice_passwort.to_string());
    antwort.xor_abgebildete_adresse_hinzufuegen(absender);
    antwort.integritaet_hinzufuegen();
    antwort.fingerabdruck_hinzufuegen();
    antwort
}

/// Erstellt die Antwort auf eine empfangene Nachricht
///
/// Nur Anfragen werden beantwortet: Binding mit einer Erfolgsantwort, alle
/// anderen Methoden mit ERROR-CODE 500. Indikationen und Antworten ergeben
/// `None`.
pub fn antwort_erstellen(
    nachricht: &StunNachricht,
    absender: SocketAddr,
    ice_passwort: &str,
) -> Option<StunNachricht> {
    if nachricht.klasse != StunKlasse::Anfrage {
        return None;
    }

    if nachricht.methode == StunMethode::BINDING {
        return Some(binding_erfolg(nachricht, absender, ice_passwort));
    }

    let mut antwort = StunNachricht::neu(
        nachricht.methode,
        StunKlasse::Fehler,
        nachricht.transaktions_id,
    );
    antwort.fehlercode_hinzufuegen(500, "Unimplemented");
    Some(antwort)
}

// ---------------------------------------------------------------------------
// Pruefung empfangener Nachrichten
// ---------------------------------------------------------------------------

/// Prueft MESSAGE-INTEGRITY einer rohen Nachricht mit dem ICE-Passwort
pub fn integritaet_pruefen(daten: &[u8], ice_passwort: &str) -> bool {
    let Some((offset, wert)) = attribut_roh_finden(daten, AttributTyp::MESSAGE_INTEGRITY) else {
        return false;
    };
    if wert.len() != INTEGRITAET_WERT_LAENGE {
        return false;
    }

    let mut kopie = daten[..offset].to_vec();
    let vorlaeufig = offset - HEADER_LAENGE + ATTRIBUT_KOPF_LAENGE + INTEGRITAET_WERT_LAENGE;
    if laenge_setzen(&mut kopie, vorlaeufig).is_err() {
        return false;
    }

    let Ok(mut mac) = HmacSha1::new_from_slice(ice_passwort.as_bytes()) else {
        return false;
    };
    mac.update(&kopie);
    mac.verify_slice(wert).is_ok()
}

/// Prueft FINGERPRINT einer rohen Nachricht
pub fn fingerabdruck_pruefen(daten: &[u8]) -> bool {
    let Some((offset, wert)) = attribut_roh_finden(daten, AttributTyp::FINGERPRINT) else {
        return false;
    };
    if wert.len() != 4 {
        return false;
    }

    let mut kopie = daten[..offset].to_vec();
    let vorlaeufig = offset - HEADER_LAENGE + ATTRIBUT_KOPF_LAENGE + 4;
    if laenge_setzen(&mut kopie, vorlaeufig).is_err() {
        return false;
    }

    let erwartet = crc32(&kopie) ^ FINGERPRINT_XOR;
    wert == erwartet.to_be_bytes()
}

// ---------------------------------------------------------------------------
// Interne Hilfsfunktionen
// ---------------------------------------------------------------------------

fn hmac_sha1(schluessel: &[u8], daten: &[u8]) -> ProtokollResult<Vec<u8>> {
    let mut mac =
        HmacSha1::new_from_slice(schluessel).map_err(|_| ProtokollFehler::StunKeinPasswort)?;
    mac.update(daten);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn laenge_setzen(buf: &mut [u8], laenge: usize) -> ProtokollResult<()> {
    let laenge = u16::try_from(laenge).map_err(|_| ProtokollFehler::StunZuGross)?;
    buf[2..4].copy_from_slice(&laenge.to_be_bytes());
    Ok(())
}

fn attribut_schreiben(buf: &mut Vec<u8>, typ: AttributTyp, wert: &[u8]) -> ProtokollResult<()> {
    let laenge = u16::try_from(wert.len()).map_err(|_| ProtokollFehler::StunZuGross)?;
    buf.extend_from_slice(&typ.0.to_be_bytes());
    buf.extend_from_slice(&laenge.to_be_bytes());
    buf.extend_from_slice(wert);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    Ok(())
}

/// Liest ein Attribut und gibt es mit der Anzahl verbrauchter Bytes zurueck
///
/// Fehlendes Padding am Ende der Nachricht wird toleriert.
fn attribut_lesen(daten: &[u8]) -> ProtokollResult<(StunAttribut, usize)> {
    if daten.len() < ATTRIBUT_KOPF_LAENGE {
        let typ = if daten.len() >= 2 {
            u16::from_be_bytes([daten[0], daten[1]])
        } else {
            0
        };
        return Err(ProtokollFehler::StunAttributAbgeschnitten { typ });
    }

    let typ = u16::from_be_bytes([daten[0], daten[1]]);
    let laenge = u16::from_be_bytes([daten[2], daten[3]]) as usize;
    let ende = ATTRIBUT_KOPF_LAENGE + laenge;
    if ende > daten.len() {
        return Err(ProtokollFehler::StunAttributAbgeschnitten { typ });
    }

    let mit_padding = (ende + 3) & !3;
    Ok((
        StunAttribut {
            typ: AttributTyp(typ),
            wert: daten[ATTRIBUT_KOPF_LAENGE..ende].to_vec(),
        },
        mit_padding.min(daten.len()),
    ))
}

/// Sucht ein Attribut in einer rohen Nachricht: (Offset des Attributs, Wert)
fn attribut_roh_finden(daten: &[u8], gesucht: AttributTyp) -> Option<(usize, &[u8])> {
    if daten.len() < HEADER_LAENGE {
        return None;
    }
    let laenge = u16::from_be_bytes([daten[2], daten[3]]) as usize;
    let ende = (HEADER_LAENGE + laenge).min(daten.len());

    let mut offset = HEADER_LAENGE;
    while offset < ende {
        let (attribut, verbraucht) = attribut_lesen(&daten[offset..ende]).ok()?;
        if attribut.typ == gesucht {
            let wert_start = offset + ATTRIBUT_KOPF_LAENGE;
            return Some((offset, &daten[wert_start..wert_start + attribut.wert.len()]));
        }
        offset += verbraucht;
    }
    None
}

fn adresse_kodieren(adresse: SocketAddr) -> Vec<u8> {
    let port = adresse.port().to_be_bytes();
    match adresse.ip() {
        IpAddr::V4(ip) => {
            let mut wert = vec![0, 0x01, port[0], port[1]];
            wert.extend_from_slice(&ip.octets());
            wert
        }
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => adresse_kodieren(SocketAddr::new(IpAddr::V4(v4), adresse.port())),
            None => {
                let mut wert = vec![0, 0x02, port[0], port[1]];
                wert.extend_from_slice(&ip.octets());
                wert
            }
        },
    }
}

fn adresse_dekodieren(wert: &[u8]) -> Option<SocketAddr> {
    if wert.len() < 4 {
        return None;
    }
    let port = u16::from_be_bytes([wert[2], wert[3]]);
    match (wert[1], wert.len()) {
        (0x01, 8) => {
            let ip = Ipv4Addr::new(wert[4], wert[5], wert[6], wert[7]);
            Some(SocketAddr::new(IpAddr::V4(ip), port))
        }
        (0x02, 20) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&wert[4..20]);
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
