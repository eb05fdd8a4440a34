//! # Berth Shared Library
//!
//! Types and storage used by the chat API and its tests.
//!
//! ## Module Organization
//!
//! - `models`: profiles, rooms, messages, notifications
//! - `auth`: bearer token verification against the identity provider
//! - `db`: PostgreSQL pool and migrations
//! - `redis`: Redis client wrapper and key schema
//! - `store`: profile and chat storage traits with Postgres, Redis and in-memory backends
//! - `events`: websocket and pub/sub event envelopes

pub mod auth;
pub mod db;
pub mod events;
pub mod models;
pub mod redis;
pub mod store;

/// Current version of the Berth shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
