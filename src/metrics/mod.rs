//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Recolección de métricas del servidor:
//! - Contadores de requests por status y método
//! - Latencias (p50, p95, p99)
//! - Conexiones activas
//! - Timeouts y respuestas huérfanas

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
