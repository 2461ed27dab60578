//! Gemeinsame Identifikationstypen fuer Funkrelais
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Transport-Ebene (Assoziation) und Konferenz-Ebene (Client, Konferenz)
//! zur Compilezeit auszuschliessen.

use crate::error::KernFehler;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::str::FromStr;

/// Breite einer Assoziations-ID in Bytes (128 Bit)
pub const ASSOZIATIONS_ID_LAENGE: usize = 16;

// ---------------------------------------------------------------------------
// AssoziationsId
// ---------------------------------------------------------------------------

/// Identifiziert eine Transport-Beziehung (Remote-Endpunkt <-> Relay)
///
/// Wird deterministisch aus der Remote-Adresse abgeleitet: SHA-256 ueber die
/// Textform der Adresse, gekuerzt auf 16 Bytes. Kollisionen werden weder
/// erkannt noch aufgeloest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssoziationsId(pub [u8; ASSOZIATIONS_ID_LAENGE]);

impl AssoziationsId {
    /// Leitet die ID aus einer Socket-Adresse ab
    pub fn aus_adresse(adresse: &SocketAddr) -> Self {
        let digest = Sha256::digest(adresse.to_string().as_bytes());
        let mut id = [0u8; ASSOZIATIONS_ID_LAENGE];
        id.copy_from_slice(&digest[..ASSOZIATIONS_ID_LAENGE]);
        Self(id)
    }

    /// Gibt die rohen Bytes zurueck
    pub fn als_bytes(&self) -> &[u8; ASSOZIATIONS_ID_LAENGE] {
        &self.0
    }
}

impl std::fmt::Display for AssoziationsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for AssoziationsId {
    type Err = KernFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ASSOZIATIONS_ID_LAENGE * 2 || !s.is_ascii() {
            return Err(KernFehler::UngueltigeAssoziationsId(s.to_string()));
        }
        let mut id = [0u8; ASSOZIATIONS_ID_LAENGE];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| KernFehler::UngueltigeAssoziationsId(s.to_string()))?;
        }
        Ok(Self(id))
    }
}

// ---------------------------------------------------------------------------
// ClientId / KonferenzId
// ---------------------------------------------------------------------------

/// Teilnahme eines Endpunkts an einer Konferenz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u128);

impl ClientId {
    /// Bindung 1:1 an die Assoziation: alle 16 Bytes der ID (Big Endian)
    pub fn aus_assoziation(assoziation: &AssoziationsId) -> Self {
        Self(u128::from_be_bytes(assoziation.0))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

/// Eindeutige Konferenz-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KonferenzId(pub u32);

impl std::fmt::Display for KonferenzId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "konferenz:{}", self.0)
    }
}
