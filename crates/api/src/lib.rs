//! # Apex Gateway API
//!
//! HTTP service exposing the Apex Gateway API surface. Request handling is
//! wired through the observability pipeline from `apex-gateway-core`:
//! correlation-scoped logging, per-request spans, and identifier echo
//! headers on every response.

pub mod routes;
