//! Conversation gateway: the hosted assistant service.
//!
//! The gateway owns all of the assistant's reasoning. The proxy only drives
//! its thread/message/run lifecycle:
//!
//! 1. create a thread per session,
//! 2. append the user's message,
//! 3. start a run of an assistant against the thread,
//! 4. poll the run until it reaches a terminal status,
//! 5. read the newest message back.
//!
//! # Implementations
//!
//! - [`AssistantsClient`]: `OpenAI` Assistants v2 REST API (`/v1/threads`)

pub mod assistants;
pub mod run;

pub use assistants::AssistantsClient;
pub use run::{PollPolicy, Run, RunStatus, wait_for_run};

use thiserror::Error;

/// Errors raised while talking to the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport failure or timeout on a single HTTP call.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the gateway.
        message: String,
    },

    /// A run stopped in a terminal status other than `completed`.
    #[error("run {run_id} ended with status {status}: {reason}")]
    RunNotCompleted {
        run_id: String,
        status: RunStatus,
        /// `last_error` reported by the gateway, or the status itself.
        reason: String,
    },

    /// A run did not reach a terminal status within the poll budget.
    #[error("run {run_id} did not finish within {waited_secs}s (last status {status})")]
    RunTimedOut {
        run_id: String,
        status: RunStatus,
        waited_secs: u64,
    },

    /// The thread has no message carrying text.
    #[error("thread {0} has no text reply")]
    EmptyReply(String),
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The hosted assistant service.
#[async_trait::async_trait]
pub trait ConversationGateway: Send + Sync + std::fmt::Debug {
    /// Create an empty conversation thread and return its id.
    async fn create_thread(&self) -> GatewayResult<String>;

    /// Append a user message to a thread.
    async fn add_user_message(&self, thread_id: &str, content: &str) -> GatewayResult<()>;

    /// Start an assistant run against a thread.
    ///
    /// `additional_instructions` is appended to the assistant's own
    /// instructions for this run only.
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> GatewayResult<Run>;

    /// Fetch the current state of a run.
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run>;

    /// Ask the gateway to cancel a run.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run>;

    /// Text of the newest message in a thread, if it has any text content.
    async fn latest_message_text(&self, thread_id: &str) -> GatewayResult<Option<String>>;
}
