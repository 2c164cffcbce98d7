//! Request and response bodies of the agent HTTP APIs.
//!
//! 此模組包含代理 HTTP API 的請求與回應結構。

use crate::agent::message::SessionState;

// --- Runtime ---
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeAgentPayload<'a> {
    pub input_text: &'a str,
    pub enable_trace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<&'a SessionState>,
}

// --- Directory ---
#[derive(serde::Deserialize)]
pub struct GetAgentResponse {
    pub agent: AgentDetail,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetail {
    pub agent_id: Option<String>,
    pub agent_name: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAgentsResponse {
    #[serde(default)]
    pub agent_summaries: Vec<AgentSummary>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub agent_name: String,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAliasesResponse {
    #[serde(default)]
    pub agent_alias_summaries: Vec<AliasSummary>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasSummary {
    pub agent_alias_id: String,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}
