//! Purpose: Library crate behind the `brokerkit` CLI: an Open Service Broker v2 dispatch engine.
//! Exports: `core` (errors), `json` (bounded parser, binding, serializer), `model` (typed
//! protocol objects), `api` (negotiation, routing, dispatch).
//! Role: Transport-agnostic; a host adapts its HTTP stack to `api::IncomingRequest`.
//! Invariants: No module performs I/O beyond reading the request body it is handed.
pub mod api;
pub mod core;
pub mod json;
pub mod model;
