use std::collections::HashMap;

use anyhow::Result;
use futures_util::StreamExt;
use log::{debug, info, warn};

use crate::agent::message::{StreamEvent, TraceBody, TracePart};
use crate::agent::providers::{AgentDirectory, EventStream};
use crate::agent::session::{ConversationId, SessionStore, TokenTally};

use super::escape_markup;
use super::interpreter::TraceInterpreter;
use super::notes::TraceSink;

/// 依序比對的資料表標記，第一個出現在文字中的標記優先。
const TABLE_MARKERS: [&str; 4] = ["table name:", "table:", "dynamodb table:", "using table"];
/// 從資料表名稱兩端去除的標點符號。
const TABLE_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', '(', ')', '[', ']', '{', '}', '\'', '"', '`',
];

/// 串流中產生的一段回答文字。
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseChunk {
    /// 已跳脫 `$` 的文字。
    pub text: String,
    /// 從這段文字中擷取到的資料表名稱。
    pub table_name: Option<String>,
    /// 到目前為止累計的 token 用量。
    pub tokens: TokenTally,
}

/// 從回答文字中擷取 working memory 的資料表名稱。
///
/// 比對不分大小寫，回傳值為小寫；找不到時回傳 `None`。
pub fn extract_table_name(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let (start, marker) = TABLE_MARKERS
        .iter()
        .find_map(|marker| lowered.find(marker).map(|start| (start, *marker)))?;
    let token = lowered[start + marker.len()..].split_whitespace().next()?;
    let trimmed = token.trim_matches(TABLE_PUNCTUATION);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 一次代理呼叫的串流組裝器。
///
/// 依序消化執行環境送來的事件：追蹤事件交給 `TraceInterpreter`，
/// 回答文字則透過 `next_chunk` 逐段交給呼叫端。整個回合期間持有
/// `SessionStore` 的可變借用，串流結束時才寫回 token 總數與資料表名稱。
pub struct Invocation<'a> {
    events: EventStream,
    directory: &'a dyn AgentDirectory,
    store: &'a mut SessionStore,
    conversation: ConversationId,
    sink: &'a mut dyn TraceSink,
    interpreter: TraceInterpreter,
    tally: TokenTally,
    /// 代理 ID 到顯示名稱的快取，只在這次呼叫內有效。
    agent_names: HashMap<String, String>,
    answer: String,
    final_response: Option<String>,
    table_name: Option<String>,
    finished: bool,
}

impl<'a> Invocation<'a> {
    pub fn new(
        events: EventStream,
        directory: &'a dyn AgentDirectory,
        store: &'a mut SessionStore,
        conversation: ConversationId,
        sink: &'a mut dyn TraceSink,
    ) -> Self {
        Self {
            events,
            directory,
            store,
            conversation,
            sink,
            interpreter: TraceInterpreter::new(),
            tally: TokenTally::default(),
            agent_names: HashMap::new(),
            answer: String::new(),
            final_response: None,
            table_name: None,
            finished: false,
        }
    }

    /// 取得下一段回答文字。
    ///
    /// 中間的追蹤事件會在這裡被處理並輸出到 sink。串流結束時回傳
    /// `Ok(None)`；傳輸錯誤會直接回傳，此時不會寫回 token 總數。
    pub async fn next_chunk(&mut self) -> Result<Option<ResponseChunk>> {
        if self.finished {
            return Ok(None);
        }

        while let Some(event) = self.events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    self.finished = true;
                    return Err(err.context("代理事件串流中斷"));
                }
            };

            match event {
                StreamEvent::Chunk(payload) => {
                    // 先跳脫再擷取資料表名稱。
                    let text = escape_markup(&payload.bytes);
                    let table_name = extract_table_name(&text);
                    if let Some(table) = &table_name {
                        info!("Found table name in response: {}", table);
                        self.table_name = Some(table.clone());
                    }
                    self.answer.push_str(&text);
                    return Ok(Some(ResponseChunk {
                        text,
                        table_name,
                        tokens: self.tally,
                    }));
                }
                StreamEvent::Trace(part) => self.handle_trace(part).await,
                StreamEvent::Files(_) => debug!("Ignoring files event"),
            }
        }

        self.finish();
        Ok(None)
    }

    async fn handle_trace(&mut self, part: TracePart) {
        let depth = part.depth();
        match part.trace {
            TraceBody::RoutingClassifierTrace(route) => {
                if let Some(usage) = self.interpreter.routing(&route, &mut *self.sink) {
                    self.tally.accumulate(usage.input, usage.output);
                }
            }
            TraceBody::OrchestrationTrace(orchestration) => {
                let agent = match part.agent_id.as_deref() {
                    Some(agent_id) => self.agent_name(agent_id).await,
                    None => None,
                };
                let conversation = self.store.conversation_mut(self.conversation);
                let outcome = self.interpreter.orchestration(
                    &orchestration,
                    depth,
                    agent.as_deref(),
                    conversation,
                    &mut *self.sink,
                );
                if let Some(usage) = outcome.usage {
                    self.tally.accumulate(usage.input, usage.output);
                }
                if let Some(table) = outcome.table_name {
                    self.store.remember_table_name(table);
                }
                if outcome.final_response.is_some() {
                    self.final_response = outcome.final_response;
                }
            }
            TraceBody::FailureTrace(failure) => self.interpreter.failure(&failure, &mut *self.sink),
            TraceBody::PreProcessingTrace(_) => debug!("Skipping pre-processing trace"),
            TraceBody::PostProcessingTrace(_) => debug!("Skipping post-processing trace"),
            TraceBody::GuardrailTrace(_) => debug!("Skipping guardrail trace"),
            TraceBody::CustomOrchestrationTrace(_) => debug!("Skipping custom orchestration trace"),
        }
    }

    /// 以代理目錄查詢顯示名稱；查詢失敗時記錄警告並回傳 `None`。
    async fn agent_name(&mut self, agent_id: &str) -> Option<String> {
        if let Some(name) = self.agent_names.get(agent_id) {
            return Some(name.clone());
        }
        match self.directory.get_agent(agent_id).await {
            Ok(metadata) => {
                self.agent_names
                    .insert(agent_id.to_string(), metadata.agent_name.clone());
                Some(metadata.agent_name)
            }
            Err(err) => {
                warn!("Error getting agent info for {}: {}", agent_id, err);
                None
            }
        }
    }

    /// 寫回 token 總數，並記住回答中最後出現的資料表名稱。
    fn finish(&mut self) {
        self.finished = true;
        self.store.finalize_tokens(self.conversation, self.tally);
        if let Some(table) = self.table_name.clone() {
            self.store.remember_table_name(table);
        }
    }

    /// 組裝完成的回答；若沒有收到任何文字，改用最終回應觀察值。
    pub fn answer(&self) -> String {
        if self.answer.is_empty() {
            self.final_response
                .as_deref()
                .map(escape_markup)
                .unwrap_or_default()
        } else {
            self.answer.clone()
        }
    }

    pub fn tokens(&self) -> TokenTally {
        self.tally
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
