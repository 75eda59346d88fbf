//! Session → conversation thread resolution.
//!
//! Every client session is backed by exactly one gateway thread. The
//! [`ThreadResolver`] returns the stored thread for a known session and
//! creates one for a new session.
//!
//! # Architecture
//!
//! - [`ThreadResolver`]: check-then-create against the session store
//! - [`KeyedLocks`]: per-session async locks serialising creation in-process
//!
//! Across processes the store's uniqueness constraint decides the winner
//! (see [`SessionStore::insert_session_if_absent`]).
//!
//! [`SessionStore::insert_session_if_absent`]: crate::store::SessionStore::insert_session_if_absent

mod locks;
mod resolver;

pub use locks::{KeyedGuard, KeyedLocks};
pub use resolver::{ResolveError, ThreadResolver};
