//! Assistant Proxy
//!
//! A thin HTTP proxy between a web chat widget and a hosted assistant
//! service. Each browser session is pinned to one assistant thread; the
//! session→thread mapping, per-session flags and a chat log live in a
//! hosted Postgres database.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server exposing `POST /chat`
//! - **Chat**: one turn = validate, pick assistant, resolve thread, run, reply, log
//! - **Gateway**: `OpenAI` Assistants v2 client with bounded run polling
//! - **Store**: session, property and chat log tables (Postgres or in-memory)
//!
//! # Modules
//!
//! - [`chat`]: turn orchestration and contact-solicitation policy
//! - [`config`]: layered configuration (defaults, file, env, CLI)
//! - [`gateway`]: assistant service trait and client
//! - [`server`]: HTTP routes, error mapping and startup
//! - [`session`]: session→thread resolution
//! - [`store`]: session store trait and implementations

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod chat;
pub mod config;
pub mod gateway;
pub mod server;
pub mod session;
pub mod store;

use std::sync::Arc;

use chat::ChatService;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Chat turn orchestration.
    pub chat: Arc<ChatService>,
}
