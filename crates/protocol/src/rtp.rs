//! RTP-Paketformat (RFC 3550) mit Audio-Level-Erweiterung (RFC 6464)
//!
//! Der Relay dekodiert nur so viel, wie die selektive Weiterleitung braucht:
//! Payload-Typ umschreiben und den vom Client gemeldeten Pegel lesen.
//!
//! ## Header (12 Bytes + CSRC + Erweiterung)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   V(2) P(1) X(1) CC(4)
//!  1       1   M(1) PT(7)
//!  2       2   Sequenznummer (big-endian)
//!  4       4   Zeitstempel (big-endian)
//!  8       4   SSRC (big-endian)
//! 12    4*CC   CSRC-Liste
//!  .       4   Erweiterungs-Profil (2) + Laenge in 32-Bit-Worten (2), falls X
//!  .       N   Nutzdaten (+ Padding, falls P; letztes Byte = Anzahl)
//! ```

use crate::error::{ProtokollFehler, ProtokollResult};

/// RTP-Version 2
pub const RTP_VERSION: u8 = 2;

/// Feste Header-Groesse ohne CSRC und Erweiterung
pub const RTP_HEADER_LAENGE: usize = 12;

/// Profil der One-Byte-Header-Erweiterung (RFC 8285)
pub const PROFIL_EIN_BYTE: u16 = 0xBEDE;

/// Profil-Praefix der Two-Byte-Header-Erweiterung (RFC 8285)
const PROFIL_ZWEI_BYTE_MASKE: u16 = 0xFFF0;
const PROFIL_ZWEI_BYTE: u16 = 0x1000;

// ---------------------------------------------------------------------------
// RtpErweiterung
// ---------------------------------------------------------------------------

/// Header-Erweiterung (Rohdaten, Laenge ist Vielfaches von 4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpErweiterung {
    pub profil: u16,
    pub daten: Vec<u8>,
}

impl RtpErweiterung {
    /// Sucht ein Element mit der gegebenen ID (One-Byte- oder Two-Byte-Form)
    pub fn element(&self, id: u8) -> Option<&[u8]> {
        if self.profil == PROFIL_EIN_BYTE {
            ein_byte_element(&self.daten, id)
        } else if self.profil & PROFIL_ZWEI_BYTE_MASKE == PROFIL_ZWEI_BYTE {
            zwei_byte_element(&self.daten, id)
        } else {
            None
        }
    }
}

fn ein_byte_element(daten: &[u8], gesucht: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < daten.len() {
        let kopf = daten[i];
        let id = kopf >> 4;
        if id == 0 {
            // Padding-Byte
            i += 1;
            continue;
        }
        if id == 15 {
            return None;
        }
        let laenge = (kopf & 0x0F) as usize + 1;
        let start = i + 1;
        if start + laenge > daten.len() {
            return None;
        }
        if id == gesucht {
            return Some(&daten[start..start + laenge]);
        }
        i = start + laenge;
    }
    None
}

fn zwei_byte_element(daten: &[u8], gesucht: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < daten.len() {
        let id = daten[i];
        if id == 0 {
            i += 1;
            continue;
        }
        if i + 1 >= daten.len() {
            return None;
        }
        let laenge = daten[i + 1] as usize;
        let start = i + 2;
        if start + laenge > daten.len() {
            return None;
        }
        if id == gesucht {
            return Some(&daten[start..start + laenge]);
        }
        i = start + laenge;
    }
    None
}

// ---------------------------------------------------------------------------
// RtpPaket
// ---------------------------------------------------------------------------

/// Dekodiertes RTP-Paket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPaket {
    pub marker: bool,
    pub payload_typ: u8,
    pub sequenz: u16,
    pub zeitstempel: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub erweiterung: Option<RtpErweiterung>,
    pub nutzdaten: Vec<u8>,
    /// Anzahl Padding-Bytes am Ende (0 = kein P-Bit)
    pub padding: u8,
}

impl RtpPaket {
    /// Erstellt ein einfaches Paket ohne CSRC und Erweiterung
    pub fn neu(payload_typ: u8, sequenz: u16, zeitstempel: u32, ssrc: u32, nutzdaten: Vec<u8>) -> Self {
        Self {
            marker: false,
            payload_typ: payload_typ & 0x7F,
            sequenz,
            zeitstempel,
            ssrc,
            csrc: Vec::new(),
            erweiterung: None,
            nutzdaten,
            padding: 0,
        }
    }

    /// Deserialisiert ein Paket
    ///
    /// # Fehler
    /// - Paket kuerzer als der Header (inkl. CSRC/Erweiterung)
    /// - Version != 2
    /// - ungueltige Padding-Angabe
    pub fn decode(daten: &[u8]) -> ProtokollResult<Self> {
        if daten.len() < RTP_HEADER_LAENGE {
            return Err(ProtokollFehler::Rtp(format!(
                "Header zu kurz: {} Bytes (erwartet {})",
                daten.len(),
                RTP_HEADER_LAENGE
            )));
        }

        let version = daten[0] >> 6;
        if version != RTP_VERSION {
            return Err(ProtokollFehler::Rtp(format!(
                "Ungueltige Version: {} (erwartet {})",
                version, RTP_VERSION
            )));
        }

        let hat_padding = daten[0] & 0x20 != 0;
        let hat_erweiterung = daten[0] & 0x10 != 0;
        let csrc_anzahl = (daten[0] & 0x0F) as usize;
        let marker = daten[1] & 0x80 != 0;
        let payload_typ = daten[1] & 0x7F;
        let sequenz = u16::from_be_bytes([daten[2], daten[3]]);
        let zeitstempel = u32::from_be_bytes([daten[4], daten[5], daten[6], daten[7]]);
        let ssrc = u32::from_be_bytes([daten[8], daten[9], daten[10], daten[11]]);

        let mut offset = RTP_HEADER_LAENGE;
        if daten.len() < offset + csrc_anzahl * 4 {
            return Err(ProtokollFehler::Rtp("CSRC-Liste abgeschnitten".to_string()));
        }
        let csrc = (0..csrc_anzahl)
            .map(|i| {
                let s = offset + i * 4;
                u32::from_be_bytes([daten[s], daten[s + 1], daten[s + 2], daten[s + 3]])
            })
            .collect();
        offset += csrc_anzahl * 4;

        let erweiterung = if hat_erweiterung {
            if daten.len() < offset + 4 {
                return Err(ProtokollFehler::Rtp("Erweiterungs-Header abgeschnitten".to_string()));
            }
            let profil = u16::from_be_bytes([daten[offset], daten[offset + 1]]);
            let worte = u16::from_be_bytes([daten[offset + 2], daten[offset + 3]]) as usize;
            offset += 4;
            if daten.len() < offset + worte * 4 {
                return Err(ProtokollFehler::Rtp("Erweiterung abgeschnitten".to_string()));
            }
            let ext = RtpErweiterung {
                profil,
                daten: daten[offset..offset + worte * 4].to_vec(),
            };
            offset += worte * 4;
            Some(ext)
        } else {
            None
        };

        let mut ende = daten.len();
        let padding = if hat_padding {
            let anzahl = daten[ende - 1];
            if anzahl == 0 || (anzahl as usize) > ende - offset {
                return Err(ProtokollFehler::Rtp(format!(
                    "Ungueltiges Padding: {} Bytes",
                    anzahl
                )));
            }
            ende -= anzahl as usize;
            anzahl
        } else {
            0
        };

        Ok(Self {
            marker,
            payload_typ,
            sequenz,
            zeitstempel,
            ssrc,
            csrc,
            erweiterung,
            nutzdaten: daten[offset..ende].to_vec(),
            padding,
        })
    }

    /// Serialisiert das Paket
    ///
    /// # Fehler
    /// - mehr als 15 CSRC-Eintraege
    /// - Erweiterungsdaten nicht auf 32 Bit ausgerichtet oder zu lang
    pub fn encode(&self) -> ProtokollResult<Vec<u8>> {
        if self.csrc.len() > 15 {
            return Err(ProtokollFehler::Rtp(format!(
                "Zu viele CSRC-Eintraege: {}",
                self.csrc.len()
            )));
        }

        let mut buf = Vec::with_capacity(
            RTP_HEADER_LAENGE + self.csrc.len() * 4 + self.nutzdaten.len() + 16,
        );
        let mut erstes = RTP_VERSION << 6 | self.csrc.len() as u8;
        if self.padding > 0 {
            erstes |= 0x20;
        }
        if self.erweiterung.is_some() {
            erstes |= 0x10;
        }
        buf.push(erstes);
        buf.push(((self.marker as u8) << 7) | (self.payload_typ & 0x7F));
        buf.extend_from_slice(&self.sequenz.to_be_bytes());
        buf.extend_from_slice(&self.zeitstempel.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        for csrc in &self.csrc {
            buf.extend_from_slice(&csrc.to_be_bytes());
        }

        if let Some(ext) = &self.erweiterung {
            if ext.daten.len() % 4 != 0 {
                return Err(ProtokollFehler::Rtp(
                    "Erweiterung nicht auf 32 Bit ausgerichtet".to_string(),
                ));
            }
            let worte = u16::try_from(ext.daten.len() / 4)
                .map_err(|_| ProtokollFehler::Rtp("Erweiterung zu lang".to_string()))?;
            buf.extend_from_slice(&ext.profil.to_be_bytes());
            buf.extend_from_slice(&worte.to_be_bytes());
            buf.extend_from_slice(&ext.daten);
        }

        buf.extend_from_slice(&self.nutzdaten);
        if self.padding > 0 {
            buf.extend(std::iter::repeat(0u8).take(self.padding as usize - 1));
            buf.push(self.padding);
        }
        Ok(buf)
    }

    /// Payload-Typ setzen (7 Bit)
    pub fn payload_typ_setzen(&mut self, payload_typ: u8) {
        self.payload_typ = payload_typ & 0x7F;
    }

    /// Vom Client gemeldeter Audio-Pegel in dBov (RFC 6464)
    ///
    /// Liefert `-level` (0..=-127) aus dem Element `erweiterungs_id`, oder
    /// `0.0` wenn das Paket keinen Pegel traegt.
    pub fn client_lautstaerke(&self, erweiterungs_id: u8) -> f32 {
        self.erweiterung
            .as_ref()
            .and_then(|ext| ext.element(erweiterungs_id))
            .and_then(|wert| wert.first())
            .map(|&byte| -((byte & 0x7F) as f32))
            .unwrap_or(0.0)
    }

    /// Setzt den Audio-Pegel als One-Byte-Erweiterung (ersetzt eine vorhandene)
    pub fn client_lautstaerke_setzen(&mut self, erweiterungs_id: u8, dbov: f32, sprache: bool) {
        let level = (-dbov).clamp(0.0, 127.0) as u8;
        let wert = ((sprache as u8) << 7) | level;
        self.erweiterung = Some(RtpErweiterung {
            profil: PROFIL_EIN_BYTE,
            daten: vec![(erweiterungs_id & 0x0F) << 4, wert, 0, 0],
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
