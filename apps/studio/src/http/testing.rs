//! In-memory transport for unit tests: replays scripted responses in order and
//! records every request it sees.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde_json::{json, Value};

use super::auth::AuthSession;
use super::notices::Notices;
use super::transport::{ApiRequest, RawResponse, Transport};
use super::ApiClient;
use crate::errors::ClientError;

enum Scripted {
    Respond(RawResponse),
    Fail(String),
    Delayed(Duration, RawResponse),
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn raw(status: u16, body: Bytes, content_disposition: Option<&str>) -> RawResponse {
    RawResponse {
        status,
        content_disposition: content_disposition.map(str::to_string),
        body,
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        let bytes = Bytes::from(body.to_string());
        self.push(Scripted::Respond(raw(status, bytes, None)))
    }

    pub fn push_status(&self, status: u16) -> &Self {
        self.push(Scripted::Respond(raw(status, Bytes::new(), None)))
    }

    pub fn push_bytes(&self, body: &'static [u8], content_disposition: Option<&str>) -> &Self {
        self.push(Scripted::Respond(raw(
            200,
            Bytes::from_static(body),
            content_disposition,
        )))
    }

    pub fn push_network_error(&self) -> &Self {
        self.push(Scripted::Fail("connection reset".into()))
    }

    pub fn push_delayed_json(&self, delay: Duration, status: u16, body: Value) -> &Self {
        let bytes = Bytes::from(body.to_string());
        self.push(Scripted::Delayed(delay, raw(status, bytes, None)))
    }

    fn push(&self, item: Scripted) -> &Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::line).collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
        });
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(msg)) => Err(ClientError::Network(msg)),
            Some(Scripted::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(ClientError::Network(format!(
                "unscripted request {} {}",
                request.method, request.path
            ))),
        }
    }
}

pub fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::new(transport.clone(), AuthSession::new(), Notices::new())
}

pub fn version_json(id: i64, document_id: i64, kind: &str, content: &str, label: &str) -> Value {
    json!({
        "id": id,
        "markdown": content,
        "version_name": label,
        "document": {"id": document_id, "type": kind},
        "updated_at": format!("2026-02-05T05:{:02}:00Z", id % 60),
    })
}
