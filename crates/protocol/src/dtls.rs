//! DTLS-Record-Erkennung
//!
//! Der Relay interpretiert DTLS nicht selbst; er muss nur den ersten
//! Handshake-Flight (ClientHello) erkennen, damit der Tunnel die
//! unterstuetzten Schutzprofile anhaengen kann.

/// Content-Type eines DTLS-Handshake-Records
pub const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

/// Handshake-Typ ClientHello
pub const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

/// Offset des Handshake-Typs (13 Byte Record-Header)
const HANDSHAKE_TYP_OFFSET: usize = 13;

/// Prueft ob das Paket ein DTLS-ClientHello ist
pub fn ist_client_hello(daten: &[u8]) -> bool {
    daten.len() > HANDSHAKE_TYP_OFFSET
        && daten[0] == CONTENT_TYPE_HANDSHAKE
        && daten[HANDSHAKE_TYP_OFFSET] == HANDSHAKE_CLIENT_HELLO
}
