//! Paket-Klassifizierung nach dem ersten Byte (RFC 5764 §5.1.2)
//!
//! ```text
//! Erstes Byte   Klasse
//! -----------   ------
//!   0 ..=   1   STUN
//!  20 ..=  63   DTLS
//! 128 ..= 191   SRTP / SRTCP
//!         255   Hop-by-Hop-Schluessel (private Erweiterung)
//!       sonst   Unbekannt
//! ```

/// Marker-Byte fuer Hop-by-Hop-Schluesseldatensaetze
pub const HBH_MARKER: u8 = 0xFF;

/// Ergebnis der Klassifizierung eines UDP-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaketKlasse {
    Dtls,
    Srtp,
    Stun,
    HbhSchluessel,
    Unbekannt,
}

impl PaketKlasse {
    /// Kurzname fuer Logs und Metrik-Labels
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dtls => "dtls",
            Self::Srtp => "srtp",
            Self::Stun => "stun",
            Self::HbhSchluessel => "hbh",
            Self::Unbekannt => "unbekannt",
        }
    }
}

impl std::fmt::Display for PaketKlasse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordnet ein Paket anhand seines ersten Bytes einer Klasse zu
///
/// Reine Funktion, O(1), ohne Allokation. Leere Pakete sind `Unbekannt`.
pub fn klassifizieren(daten: &[u8]) -> PaketKlasse {
    match daten.first() {
        None => PaketKlasse::Unbekannt,
        Some(&b) if b > 19 && b < 64 => PaketKlasse::Dtls,
        Some(&b) if b > 127 && b < 192 => PaketKlasse::Srtp,
        Some(&b) if b < 2 => PaketKlasse::Stun,
        Some(&HBH_MARKER) => PaketKlasse::HbhSchluessel,
        Some(_) => PaketKlasse::Unbekannt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leeres_paket_unbekannt() {
        assert_eq!(klassifizieren(&[]), PaketKlasse::Unbekannt);
    }

    #[test]
    fn grenzwerte() {
        let erwartet = [
            (0u8, PaketKlasse::Stun),
            (1, PaketKlasse::Stun),
            (2, PaketKlasse::Unbekannt),
            (19, PaketKlasse::Unbekannt),
            (20, PaketKlasse::Dtls),
            (63, PaketKlasse::Dtls),
            (64, PaketKlasse::Unbekannt),
            (127, PaketKlasse::Unbekannt),
            (128, PaketKlasse::Srtp),
            (191, PaketKlasse::Srtp),
            (192, PaketKlasse::Unbekannt),
            (254, PaketKlasse::Unbekannt),
            (255, PaketKlasse::HbhSchluessel),
        ];
        for (byte, klasse) in erwartet {
            assert_eq!(klassifizieren(&[byte]), klasse, "Byte {}", byte);
        }
    }

    #[test]
    fn alle_bytes_entsprechen_tabelle() {
        for b in 0..=255u8 {
            let erwartet = if b > 19 && b < 64 {
                PaketKlasse::Dtls
            } else if b > 127 && b < 192 {
                PaketKlasse::Srtp
            } else if b < 2 {
                PaketKlasse::Stun
            } else if b == 0xFF {
                PaketKlasse::HbhSchluessel
            } else {
                PaketKlasse::Unbekannt
            };
            assert_eq!(klassifizieren(&[b, 0, 0]), erwartet, "Byte {}", b);
        }
    }
}
