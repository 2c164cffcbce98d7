//! Wire model for the agent runtime.
//!
//! The runtime emits a closed set of loosely-typed nested records. Every shape
//! is modelled as an explicit struct or tagged enum; fields the runtime may
//! omit are `Option` so that a partially filled event still decodes and the
//! interpreter can skip only the missing portion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A request sent to the agent runtime for one user turn.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub agent_id: String,
    pub agent_alias_id: String,
    pub session_id: String,
    pub input_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<SessionState>,
    pub enable_trace: bool,
}

/// Static attributes forwarded with every invocation of a bot.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub session_attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_session_attributes: Option<BTreeMap<String, String>>,
}

/// One element of the invocation stream.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum StreamEvent {
    /// A piece of the visible answer.
    Chunk(ChunkPayload),
    /// A trace record describing the agents' decision process.
    Trace(TracePart),
    /// Files produced during the turn; not rendered.
    Files(serde_json::Value),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChunkPayload {
    #[serde(default)]
    pub bytes: String,
}

/// The envelope around a single trace record.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TracePart {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_alias_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Chain of agents that led to this record; the supervisor alone has depth 1.
    #[serde(default)]
    pub caller_chain: Vec<CallerLink>,
    pub trace: TraceBody,
}

impl TracePart {
    pub fn depth(&self) -> usize {
        self.caller_chain.len()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CallerLink {
    #[serde(default)]
    pub agent_alias_arn: Option<String>,
}

/// Every trace kind the runtime is known to emit.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum TraceBody {
    RoutingClassifierTrace(RoutingTrace),
    OrchestrationTrace(OrchestrationTrace),
    PreProcessingTrace(serde_json::Value),
    PostProcessingTrace(serde_json::Value),
    GuardrailTrace(serde_json::Value),
    CustomOrchestrationTrace(serde_json::Value),
    FailureTrace(FailureTrace),
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoutingTrace {
    #[serde(default)]
    pub model_invocation_input: Option<serde_json::Value>,
    #[serde(default)]
    pub model_invocation_output: Option<ModelInvocationOutput>,
    #[serde(default)]
    pub invocation_input: Option<serde_json::Value>,
    #[serde(default)]
    pub observation: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelInvocationOutput {
    #[serde(default)]
    pub metadata: Option<InvocationMetadata>,
    #[serde(default)]
    pub raw_response: Option<RawResponse>,
}

impl ModelInvocationOutput {
    /// Token counts reported for this model call, if the runtime sent any.
    pub fn usage(&self) -> Option<TokenUsage> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.usage.as_ref())
            .map(Usage::counts)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct InvocationMetadata {
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

impl Usage {
    /// An absent input count reads as zero; an absent output count stays absent.
    pub fn counts(&self) -> TokenUsage {
        TokenUsage {
            input: Some(self.input_tokens.unwrap_or(0)),
            output: self.output_tokens,
        }
    }
}

/// Token counts extracted from a single model invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: Option<u64>,
    pub output: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RawResponse {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationTrace {
    #[serde(default)]
    pub invocation_input: Option<InvocationInput>,
    #[serde(default)]
    pub model_invocation_input: Option<serde_json::Value>,
    #[serde(default)]
    pub model_invocation_output: Option<ModelInvocationOutput>,
    #[serde(default)]
    pub rationale: Option<TextBlock>,
    #[serde(default)]
    pub observation: Option<Observation>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TextBlock {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvocationInput {
    #[serde(default)]
    pub knowledge_base_lookup_input: Option<KnowledgeBaseLookupInput>,
    #[serde(default)]
    pub action_group_invocation_input: Option<ActionGroupInvocationInput>,
    #[serde(default)]
    pub code_interpreter_invocation_input: Option<CodeInterpreterInvocationInput>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseLookupInput {
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionGroupInvocationInput {
    #[serde(default)]
    pub action_group_name: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub execution_type: Option<String>,
    #[serde(default)]
    pub parameters: Option<Vec<Parameter>>,
}

impl ActionGroupInvocationInput {
    /// Looks up a parameter value by name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .as_deref()?
            .iter()
            .find(|param| param.name == name)
            .map(|param| param.value.as_str())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct CodeInterpreterInvocationInput {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default)]
    pub knowledge_base_lookup_output: Option<KnowledgeBaseLookupOutput>,
    #[serde(default)]
    pub action_group_invocation_output: Option<TextBlock>,
    #[serde(default)]
    pub code_interpreter_invocation_output: Option<CodeInterpreterInvocationOutput>,
    #[serde(default)]
    pub final_response: Option<TextBlock>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseLookupOutput {
    #[serde(default)]
    pub retrieved_references: Vec<RetrievedReference>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct RetrievedReference {
    #[serde(default)]
    pub content: Option<TextBlock>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CodeInterpreterInvocationOutput {
    #[serde(default)]
    pub execution_output: Option<String>,
    #[serde(default)]
    pub execution_error: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FailureTrace {
    #[serde(default)]
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_routing_output_with_usage() {
        let raw = json!({
            "trace": {
                "agentId": "SUPERVISOR1",
                "callerChain": [{"agentAliasArn": "arn:alias/SUPERVISOR1/A"}],
                "trace": {
                    "routingClassifierTrace": {
                        "modelInvocationOutput": {
                            "metadata": {"usage": {"inputTokens": 12, "outputTokens": 3}},
                            "rawResponse": {
                                "content": "{\"content\":[{\"text\":\"<a>billing</a>\"}]}"
                            }
                        }
                    }
                }
            }
        });
        let event: StreamEvent = serde_json::from_value(raw).unwrap();
        let StreamEvent::Trace(part) = event else {
            panic!("expected a trace event");
        };
        assert_eq!(part.depth(), 1);
        let TraceBody::RoutingClassifierTrace(route) = part.trace else {
            panic!("expected a routing trace");
        };
        let usage = route.model_invocation_output.unwrap().usage().unwrap();
        assert_eq!(usage, TokenUsage { input: Some(12), output: Some(3) });
    }

    #[test]
    fn missing_input_tokens_read_as_zero() {
        let usage = Usage {
            input_tokens: None,
            output_tokens: Some(7),
        };
        assert_eq!(usage.counts(), TokenUsage { input: Some(0), output: Some(7) });
    }

    #[test]
    fn partial_orchestration_event_still_decodes() {
        let raw = json!({
            "trace": {
                "trace": {
                    "orchestrationTrace": {
                        "invocationInput": {
                            "actionGroupInvocationInput": {
                                "function": "get_key_value",
                                "parameters": [
                                    {"name": "key", "value": "plan"},
                                    {
                                        "name": "table_name",
                                        "value": "startup-advisor",
                                        "type": "string"
                                    }
                                ]
                            }
                        }
                    }
                }
            }
        });
        let event: StreamEvent = serde_json::from_value(raw).unwrap();
        let StreamEvent::Trace(part) = event else {
            panic!("expected a trace event");
        };
        assert!(part.agent_id.is_none());
        assert_eq!(part.depth(), 0);
        let TraceBody::OrchestrationTrace(orch) = part.trace else {
            panic!("expected an orchestration trace");
        };
        let action = orch
            .invocation_input
            .and_then(|input| input.action_group_invocation_input)
            .unwrap();
        assert_eq!(action.parameter("table_name"), Some("startup-advisor"));
        assert_eq!(action.parameter("missing"), None);
        assert!(action.execution_type.is_none());
    }

    #[test]
    fn chunk_event_carries_text() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"chunk":{"bytes":"Hello there"}}"#).unwrap();
        match event {
            StreamEvent::Chunk(chunk) => assert_eq!(chunk.bytes, "Hello there"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_trace_kind_is_rejected() {
        let result = serde_json::from_str::<StreamEvent>(
            r#"{"trace":{"trace":{"somethingNew":{}}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn request_serializes_without_empty_session_state() {
        let request = InvocationRequest {
            agent_id: "A".into(),
            agent_alias_id: "B".into(),
            session_id: "S".into(),
            input_text: "hi".into(),
            session_state: None,
            enable_trace: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["inputText"], "hi");
        assert_eq!(value["enableTrace"], true);
        assert!(value.get("sessionState").is_none());
    }
}
