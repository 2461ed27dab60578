//! funkrelais-sfu – Selective-Forwarding-Engine
//!
//! Verfolgt pro Konferenz die Sprachaktivitaet der Teilnehmer, waehlt
//! aktive Sprecher mit Hysterese und berechnet daraus die
//! Forwarding-Tabelle, die der Relay fuer jedes Medienpaket abfragt.
//!
//! ## Module
//! - [`config`] – Schwellen, Zeitkonstanten und Payload-Typen
//! - [`engine`] – Sprecher-Auswahl und FIB-Berechnung

pub mod config;
pub mod engine;

pub use config::SfuConfig;
pub use engine::{FibEintrag, SfuEngine, NEUTRALE_ENERGIE, PT_KLASSE_VIDEO};
