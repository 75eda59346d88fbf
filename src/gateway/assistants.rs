//! `OpenAI` Assistants v2 API client.
//!
//! Talks to `/v1/threads`, `/v1/threads/{id}/messages` and
//! `/v1/threads/{id}/runs`. Every request carries the `OpenAI-Beta:
//! assistants=v2` header and bearer authentication.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::GatewayConfig;

use super::{ConversationGateway, GatewayError, GatewayResult, Run};

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// Client for the Assistants API.
#[derive(Clone)]
pub struct AssistantsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for AssistantsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl AssistantsClient {
    /// Build a client from gateway configuration.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base_url)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)).json(body))
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.bearer_auth(&self.api_key).header(BETA_HEADER, BETA_VALUE)
    }

    async fn send<T: DeserializeOwned>(rb: RequestBuilder) -> GatewayResult<T> {
        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait::async_trait]
impl ConversationGateway for AssistantsClient {
    async fn create_thread(&self) -> GatewayResult<String> {
        let thread: ThreadObject = Self::send(self.post("/threads", &serde_json::json!({}))).await?;
        tracing::debug!(thread_id = %thread.id, "Created thread");
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> GatewayResult<()> {
        let body = serde_json::json!({
            "role": "user",
            "content": content,
        });
        let _: serde_json::Value =
            Self::send(self.post(&format!("/threads/{thread_id}/messages"), &body)).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        additional_instructions: Option<&str>,
    ) -> GatewayResult<Run> {
        let mut body = serde_json::json!({ "assistant_id": assistant_id });
        if let Some(extra) = additional_instructions {
            body["additional_instructions"] = serde_json::Value::String(extra.to_string());
        }
        let run: Run = Self::send(self.post(&format!("/threads/{thread_id}/runs"), &body)).await?;
        tracing::debug!(
            thread_id = %thread_id,
            run_id = %run.id,
            status = %run.status,
            "Created run"
        );
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        Self::send(self.get(&format!("/threads/{thread_id}/runs/{run_id}"))).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        Self::send(self.post(
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
            &serde_json::json!({}),
        ))
        .await
    }

    async fn latest_message_text(&self, thread_id: &str) -> GatewayResult<Option<String>> {
        let list: MessageList = Self::send(
            self.get(&format!("/threads/{thread_id}/messages"))
                .query(&[("order", "desc"), ("limit", "1")]),
        )
        .await?;

        Ok(list.data.into_iter().next().and_then(|message| {
            message.content.into_iter().find_map(|part| match part {
                MessageContent::Text { text } => Some(text.value),
                MessageContent::Other => None,
            })
        }))
    }
}
