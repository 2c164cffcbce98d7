//! In-memory runtime that replays a fixed list of events.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};

use crate::agent::message::{InvocationRequest, StreamEvent};

use super::{AgentRuntime, EventStream};

pub enum Scripted {
    Event(StreamEvent),
    TransportError(&'static str),
}

pub struct ScriptedRuntime {
    script: Mutex<Option<Vec<Scripted>>>,
    pub requests: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedRuntime {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self::with_script(events.into_iter().map(Scripted::Event).collect())
    }

    pub fn with_script(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Decodes events from `serde_json::json!` values.
    pub fn from_json(values: Vec<serde_json::Value>) -> Self {
        let events = values
            .into_iter()
            .map(|value| serde_json::from_value(value).expect("scripted event must decode"))
            .collect();
        Self::new(events)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .script
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("script already consumed"))?;
        let items = script.into_iter().map(|item| match item {
            Scripted::Event(event) => Ok(event),
            Scripted::TransportError(message) => Err(anyhow!(message)),
        });
        Ok(stream::iter(items.collect::<Vec<_>>()).boxed())
    }
}
