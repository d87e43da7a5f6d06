//! NFL wins-pool engine and service.
//!
//! Friends draft NFL teams into a shared pool; a team's regular-season
//! wins score for whoever picked it. This crate holds the draft turn
//! engine, pick legality rules, the client/server state merge, the
//! provider-backed win reconciler, and the HTTP/SSE surface over them.

pub mod code;
pub mod config;
pub mod db;
pub mod draft;
pub mod events;
pub mod merge;
pub mod server;
pub mod sync;
pub mod teams;
