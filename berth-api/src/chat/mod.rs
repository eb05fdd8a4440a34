/// Live delivery of chat events
///
/// # Flow
///
/// ```text
/// handler ──publish──> EventBus ──(Redis pub/sub | direct)──> ConnectionHub
///                                                               │
///                                 room / user broadcast channels
///                                                               ▼
///                                                    websocket tasks
/// ```
///
/// - `hub`: per-room and per-user bounded broadcast channels
/// - `bus`: [`bus::LocalBus`] for a single process, [`bus::RedisBus`] plus the
///   relay task when several API instances share Redis
/// - `service`: the message posting flow shared by REST and websockets

pub mod bus;
pub mod hub;
pub mod service;

pub use bus::{spawn_relay, BusError, EventBus, LocalBus, RedisBus};
pub use hub::ConnectionHub;
