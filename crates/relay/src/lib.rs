//! funkrelais-relay – Media-Relay
//!
//! Besitzt den UDP-Socket, klassifiziert jedes Datagramm und verteilt es:
//! DTLS an den Key-Management-Tunnel, SRTP ueber die
//! Selective-Forwarding-Engine, STUN als lokale Antwort,
//! Hop-by-Hop-Schluessel in die SRTP-Kontexte.
//!
//! ## Module
//! - [`register`] – Assoziations-Register (Adresse <-> Id)
//! - [`relay`] – Dispatch-Kern mit Empfangs- und Dispatch-Worker
//! - [`kollaborateure`] – Traits fuer Tunnel, DTLS und SRTP
//! - [`tunnel`] – UDP-Weiterleitung zum Key-Management-Peer
//! - [`config`] – Relay-Konfiguration

pub mod config;
pub mod error;
pub mod kollaborateure;
pub mod register;
pub mod relay;
pub mod tunnel;

pub use config::RelayConfig;
pub use error::{RelayFehler, RelayResult};
pub use kollaborateure::{
    srtp_schluessel_ableiten, DtlsSitzung, KmfTunnel, RelayZustellung, SrtpFabrik, SrtpSitzung,
};
pub use register::AssoziationsRegister;
pub use relay::{LaufenderRelay, MediaRelay, RelayHandle};
pub use tunnel::UdpWeiterleiter;
