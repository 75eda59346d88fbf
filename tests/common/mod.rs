//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use assistant_proxy::AppState;
use assistant_proxy::chat::{ChatService, ContactPolicy};
use assistant_proxy::gateway::{
    ConversationGateway, GatewayError, GatewayResult, PollPolicy, Run, RunStatus,
};
use assistant_proxy::store::{
    ChatLogEntry, MemorySessionStore, SessionRecord, SessionStore, StoreError, StoreResult,
};
use async_trait::async_trait;

/// A recorded `create_run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCall {
    pub thread_id: String,
    pub assistant_id: String,
    pub instructions: Option<String>,
}

/// Scripted in-process gateway.
#[derive(Debug, Default)]
pub struct FakeGateway {
    threads_created: AtomicUsize,
    create_thread_delay: Mutex<Option<Duration>>,
    messages: Mutex<Vec<(String, String)>>,
    runs: Mutex<Vec<RunCall>>,
    /// Statuses handed out by `create_run` then `retrieve_run`, in order.
    statuses: Mutex<VecDeque<RunStatus>>,
    cancelled: Mutex<Vec<String>>,
    reply: Mutex<Option<String>>,
    retrievals: AtomicUsize,
    fail_retrievals: AtomicBool,
}

impl FakeGateway {
    pub fn replying(reply: &str) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.reply.lock().unwrap() = Some(reply.to_string());
        Arc::new(gateway)
    }

    pub fn set_reply(&self, reply: Option<&str>) {
        *self.reply.lock().unwrap() = reply.map(str::to_string);
    }

    pub fn script(&self, statuses: &[RunStatus]) {
        *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
    }

    pub fn slow_thread_creation(&self, delay: Duration) {
        *self.create_thread_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_retrievals(&self) {
        self.fail_retrievals.store(true, Ordering::SeqCst);
    }

    pub fn threads_created(&self) -> usize {
        self.threads_created.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn runs(&self) -> Vec<RunCall> {
        self.runs.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }

    fn next_status(&self) -> RunStatus {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::Completed)
    }
}

#[async_trait]
impl ConversationGateway for FakeGateway {
    async fn create_thread(&self) -> GatewayResult<String> {
        let delay = *self.create_thread_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{n}"))
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> GatewayResult<()> {
        self.messages
            .lock()
            .unwrap()
            .push((thread_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> GatewayResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        runs.push(RunCall {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
            instructions: additional_instructions.map(str::to_string),
        });
        Ok(Run {
            id: format!("run_{}", runs.len()),
            status: self.next_status(),
            last_error: None,
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        if self.fail_retrievals.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(Run {
            id: run_id.to_string(),
            status: self.next_status(),
            last_error: None,
        })
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        self.cancelled.lock().unwrap().push(run_id.to_string());
        Ok(Run {
            id: run_id.to_string(),
            status: RunStatus::Cancelling,
            last_error: None,
        })
    }

    async fn latest_message_text(&self, _thread_id: &str) -> GatewayResult<Option<String>> {
        Ok(self.reply.lock().unwrap().clone())
    }
}

/// Memory store that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct ProbeStore {
    pub inner: MemorySessionStore,
    calls: AtomicUsize,
    contact_updates: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_chat_log: AtomicBool,
}

impl ProbeStore {
    pub fn with_property(slug: &str, assistant_id: &str) -> Arc<Self> {
        let store = Self::default();
        store.inner.insert_property(slug, assistant_id);
        Arc::new(store)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contact_updates(&self) -> usize {
        self.contact_updates.load(Ordering::SeqCst)
    }

    pub fn fail_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }

    pub fn fail_chat_log(&self) {
        self.fail_chat_log.store(true, Ordering::SeqCst);
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for ProbeStore {
    async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        self.touch();
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.find_session(session_id).await
    }

    async fn insert_session_if_absent(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> StoreResult<SessionRecord> {
        self.touch();
        self.inner
            .insert_session_if_absent(session_id, thread_id)
            .await
    }

    async fn mark_contact_requested(&self, session_id: &str) -> StoreResult<()> {
        self.touch();
        self.contact_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_contact_requested(session_id).await
    }

    async fn find_assistant_id(&self, property_slug: &str) -> StoreResult<Option<String>> {
        self.touch();
        self.inner.find_assistant_id(property_slug).await
    }

    async fn append_chat_log(&self, entry: &ChatLogEntry) -> StoreResult<()> {
        self.touch();
        if self.fail_chat_log.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("chat_logs insert rejected".to_string()));
        }
        self.inner.append_chat_log(entry).await
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }
}

pub fn contact_policy() -> ContactPolicy {
    ContactPolicy::new(
        true,
        "Ask for the user's email address.",
        &["email address".to_string()],
    )
}

pub fn chat_service(store: &Arc<ProbeStore>, gateway: &Arc<FakeGateway>) -> ChatService {
    ChatService::new(
        Arc::clone(store) as Arc<dyn SessionStore>,
        Arc::clone(gateway) as Arc<dyn ConversationGateway>,
        fast_poll(),
        contact_policy(),
    )
}

pub fn app_state(store: &Arc<ProbeStore>, gateway: &Arc<FakeGateway>) -> AppState {
    AppState {
        chat: Arc::new(chat_service(store, gateway)),
    }
}
