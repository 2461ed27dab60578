//! Prometheus-kompatible Metriken fuer Funkrelais
//!
//! Registrierte Metriken:
//! - `funkrelais_pakete_empfangen_total` – Counter: Empfangene Pakete (klasse)
//! - `funkrelais_pakete_weitergeleitet_total` – Counter: Weitergeleitete Pakete
//! - `funkrelais_pakete_verworfen_total` – Counter: Verworfene Pakete (grund)
//! - `funkrelais_stun_antworten_total` – Counter: Gesendete STUN-Antworten (klasse)
//! - `funkrelais_sendefehler_total` – Counter: Fehlgeschlagene UDP-Sendungen
//! - `funkrelais_assoziationen` – Gauge: Bekannte Assoziationen
//! - `funkrelais_konferenzen` – Gauge: Bekannte Konferenzen

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;

/// Alle Relay-Prometheus-Metriken einer Instanz
#[derive(Clone)]
pub struct RelayMetriken {
    pub registry: Arc<Registry>,

    pub pakete_empfangen: IntCounterVec,
    pub pakete_weitergeleitet: IntCounter,
    pub pakete_verworfen: IntCounterVec,
    pub stun_antworten: IntCounterVec,
    pub sendefehler: IntCounter,
    pub assoziationen: IntGauge,
    pub konferenzen: IntGauge,
}

impl RelayMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let pakete_empfangen = IntCounterVec::new(
            Opts::new(
                "funkrelais_pakete_empfangen_total",
                "Empfangene UDP-Pakete nach Klasse",
            ),
            &["klasse"],
        )?;
        registry.register(Box::new(pakete_empfangen.clone()))?;

        let pakete_weitergeleitet = IntCounter::with_opts(Opts::new(
            "funkrelais_pakete_weitergeleitet_total",
            "An andere Assoziationen weitergeleitete Pakete",
        ))?;
        registry.register(Box::new(pakete_weitergeleitet.clone()))?;

        let pakete_verworfen = IntCounterVec::new(
            Opts::new(
                "funkrelais_pakete_verworfen_total",
                "Verworfene Pakete nach Grund",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(pakete_verworfen.clone()))?;

        let stun_antworten = IntCounterVec::new(
            Opts::new(
                "funkrelais_stun_antworten_total",
                "Gesendete STUN-Antworten nach Klasse",
            ),
            &["klasse"],
        )?;
        registry.register(Box::new(stun_antworten.clone()))?;

        let sendefehler = IntCounter::with_opts(Opts::new(
            "funkrelais_sendefehler_total",
            "Fehlgeschlagene UDP-Sendungen",
        ))?;
        registry.register(Box::new(sendefehler.clone()))?;

        let assoziationen = IntGauge::with_opts(Opts::new(
            "funkrelais_assoziationen",
            "Anzahl bekannter Assoziationen",
        ))?;
        registry.register(Box::new(assoziationen.clone()))?;

        let konferenzen = IntGauge::with_opts(Opts::new(
            "funkrelais_konferenzen",
            "Anzahl bekannter Konferenzen",
        ))?;
        registry.register(Box::new(konferenzen.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            pakete_empfangen,
            pakete_weitergeleitet,
            pakete_verworfen,
            stun_antworten,
            sendefehler,
            assoziationen,
            konferenzen,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<RelayMetriken>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Startet den Metriken-HTTP-Server (`GET /metrics`)
pub async fn metrics_server_starten(bind_addr: SocketAddr, metriken: RelayMetriken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Metriken-Server gestartet");

    axum::serve(listener, metrics_router(metriken)).await?;
    Ok(())
}
