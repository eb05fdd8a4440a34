//! # berth API Server Library
//!
//! Profiles, chat rooms and live fan-out for the berth platform.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `chat`: Connection hub, event bus and message posting
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: API route handlers
//! - `translate`: LibreTranslate client

pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod translate;
