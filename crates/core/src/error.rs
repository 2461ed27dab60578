//! Fehlertypen fuer die gemeinsamen Funkrelais-Typen

use thiserror::Error;

/// Fehler beim Umgang mit den Kern-Typen
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernFehler {
    #[error("Ungueltige Assoziations-ID: {0}")]
    UngueltigeAssoziationsId(String),
}
