//! funkrelais-protocol – Wire-Formate des Media-Relays
//!
//! Dieses Crate definiert alle Paketformate, die der Relay auf dem
//! UDP-Socket sieht oder erzeugt.
//!
//! ## Module
//! - [`klassifizierung`] – Zuordnung eines Pakets zu DTLS/SRTP/STUN/HBH
//! - [`stun`] – STUN-Codec mit MESSAGE-INTEGRITY und FINGERPRINT
//! - [`rtp`] – RTP-Header und Audio-Level-Erweiterung
//! - [`hbh`] – Hop-by-Hop-Schluesseldatensatz und Schutzprofile
//! - [`dtls`] – Erkennung des ersten Handshake-Flights

pub mod dtls;
pub mod error;
pub mod hbh;
pub mod klassifizierung;
pub mod rtp;
pub mod stun;

pub use error::{ProtokollFehler, ProtokollResult};
pub use hbh::{HbhSchluessel, SchutzProfil, SrtpSchluessel};
pub use klassifizierung::{klassifizieren, PaketKlasse};
pub use rtp::RtpPaket;
pub use stun::StunNachricht;
