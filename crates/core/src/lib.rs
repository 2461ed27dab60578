//! funkrelais-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Identifikationstypen bereit, die von allen
//! anderen Funkrelais-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::KernFehler;
pub use types::{AssoziationsId, ClientId, KonferenzId};
