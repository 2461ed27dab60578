//! Hop-by-Hop-Schluesseldatensatz
//!
//! Der Key-Management-Peer liefert dem Relay nach dem DTLS-Handshake die
//! SRTP-Schluessel fuer den Hop zwischen Endpunkt und Relay.
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Marker 0xFF
//!  1       2   Schutzprofil (big-endian, RFC 5764 §4.1.2)
//!  3       1   Laenge L1
//!  4      L1   Client-Write-Key
//!  .       1   Laenge L2
//!  .      L2   Server-Write-Key
//!  .       1   Laenge L3
//!  .      L3   Master-Salt
//! ```

use crate::error::{ProtokollFehler, ProtokollResult};
use crate::klassifizierung::HBH_MARKER;

// ---------------------------------------------------------------------------
// SchutzProfil
// ---------------------------------------------------------------------------

/// DTLS-SRTP-Schutzprofil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchutzProfil(pub u16);

impl SchutzProfil {
    pub const AES128_CM_SHA1_80: Self = Self(0x0001);
    pub const AES128_CM_SHA1_32: Self = Self(0x0002);
    pub const AEAD_AES_128_GCM: Self = Self(0x0007);
    pub const AEAD_AES_256_GCM: Self = Self(0x0008);

    /// Master-Key-Laenge in Bytes
    pub fn schluessel_laenge(&self) -> ProtokollResult<usize> {
        match *self {
            Self::AES128_CM_SHA1_80 | Self::AES128_CM_SHA1_32 | Self::AEAD_AES_128_GCM => Ok(16),
            Self::AEAD_AES_256_GCM => Ok(32),
            _ => Err(ProtokollFehler::UnbekanntesProfil(self.0)),
        }
    }

    /// Master-Salt-Laenge in Bytes
    pub fn salt_laenge(&self) -> ProtokollResult<usize> {
        match *self {
            Self::AES128_CM_SHA1_80 | Self::AES128_CM_SHA1_32 => Ok(14),
            Self::AEAD_AES_128_GCM | Self::AEAD_AES_256_GCM => Ok(12),
            _ => Err(ProtokollFehler::UnbekanntesProfil(self.0)),
        }
    }
}

impl std::fmt::Display for SchutzProfil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::AES128_CM_SHA1_80 => f.write_str("SRTP_AES128_CM_HMAC_SHA1_80"),
            Self::AES128_CM_SHA1_32 => f.write_str("SRTP_AES128_CM_HMAC_SHA1_32"),
            Self::AEAD_AES_128_GCM => f.write_str("SRTP_AEAD_AES_128_GCM"),
            Self::AEAD_AES_256_GCM => f.write_str("SRTP_AEAD_AES_256_GCM"),
            _ => write!(f, "<{:#06x}>", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// SrtpSchluessel / HbhSchluessel
// ---------------------------------------------------------------------------

/// Schluesselmaterial eines Hops
#[derive(Clone, PartialEq, Eq)]
pub struct SrtpSchluessel {
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub master_salt: Vec<u8>,
}

impl SrtpSchluessel {
    /// Schluessel fuer eingehende Pakete (vom Endpunkt): Client-Key + Salt
    pub fn eingehend(&self) -> Vec<u8> {
        [self.client_write_key.as_slice(), &self.master_salt].concat()
    }

    /// Schluessel fuer ausgehende Pakete (zum Endpunkt): Server-Key + Salt
    pub fn ausgehend(&self) -> Vec<u8> {
        [self.server_write_key.as_slice(), &self.master_salt].concat()
    }
}

// Schluesselmaterial nie in Logs ausgeben
impl std::fmt::Debug for SrtpSchluessel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrtpSchluessel")
            .field("client_write_key", &self.client_write_key.len())
            .field("server_write_key", &self.server_write_key.len())
            .field("master_salt", &self.master_salt.len())
            .finish()
    }
}

/// Dekodierter Hop-by-Hop-Schluesseldatensatz
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbhSchluessel {
    pub profil: SchutzProfil,
    pub schluessel: SrtpSchluessel,
}

impl HbhSchluessel {
    /// Deserialisiert einen Datensatz
    ///
    /// # Fehler
    /// - falsches Marker-Byte
    /// - Datensatz kuerzer als angegeben
    pub fn decode(daten: &[u8]) -> ProtokollResult<Self> {
        if daten.len() < 3 {
            return Err(ProtokollFehler::HbhSchluessel(format!(
                "zu kurz: {} Bytes",
                daten.len()
            )));
        }
        if daten[0] != HBH_MARKER {
            return Err(ProtokollFehler::HbhSchluessel(format!(
                "falscher Marker: {:#04x}",
                daten[0]
            )));
        }

        let profil = SchutzProfil(u16::from_be_bytes([daten[1], daten[2]]));
        let mut rest = &daten[3..];
        let client_write_key = feld_lesen(&mut rest, "client_write_key")?;
        let server_write_key = feld_lesen(&mut rest, "server_write_key")?;
        let master_salt = feld_lesen(&mut rest, "master_salt")?;

        Ok(Self {
            profil,
            schluessel: SrtpSchluessel {
                client_write_key,
                server_write_key,
                master_salt,
            },
        })
    }

    /// Serialisiert den Datensatz
    pub fn encode(&self) -> ProtokollResult<Vec<u8>> {
        let s = &self.schluessel;
        let mut buf = Vec::with_capacity(
            6 + s.client_write_key.len() + s.server_write_key.len() + s.master_salt.len(),
        );
        buf.push(HBH_MARKER);
        buf.extend_from_slice(&self.profil.0.to_be_bytes());
        for feld in [&s.client_write_key, &s.server_write_key, &s.master_salt] {
            let laenge = u8::try_from(feld.len()).map_err(|_| {
                ProtokollFehler::HbhSchluessel(format!("Feld zu lang: {} Bytes", feld.len()))
            })?;
            buf.push(laenge);
            buf.extend_from_slice(feld);
        }
        Ok(buf)
    }
}

fn feld_lesen(rest: &mut &[u8], name: &str) -> ProtokollResult<Vec<u8>> {
    let (&laenge, daten) = rest
        .split_first()
        .ok_or_else(|| ProtokollFehler::HbhSchluessel(format!("{} fehlt", name)))?;
    let laenge = laenge as usize;
    if daten.len() < laenge {
        return Err(ProtokollFehler::HbhSchluessel(format!(
            "{} abgeschnitten: {} von {} Bytes",
            name,
            daten.len(),
            laenge
        )));
    }
    let feld = daten[..laenge].to_vec();
    *rest = &daten[laenge..];
    Ok(feld)
}
