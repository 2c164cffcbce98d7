use std::time::Instant;

use log::{debug, warn};

use crate::agent::message::{
    FailureTrace, InvocationInput, Observation, OrchestrationTrace, RawResponse, RoutingTrace,
    TokenUsage,
};
use crate::agent::session::{Conversation, Step};

use super::escape_markup;
use super::notes::{RoutingOutcome, TraceNote, TraceSink};

/// Label the classifier returns when no collaborator fits.
const UNDECIDABLE: &str = "undecidable";
/// Label the classifier returns to keep the current collaborator.
const KEEP_PREVIOUS_AGENT: &str = "keep_previous_agent";
/// Working-memory accessors whose `table_name` parameter is remembered.
const WORKING_MEMORY_FUNCTIONS: [&str; 2] = ["set_value_for_key", "get_key_value"];
const TABLE_NAME_PARAMETER: &str = "table_name";

const KNOWLEDGE_BASE_TOOL: &str = "Knowledge Base";
const CODE_INTERPRETER_TOOL: &str = "Code Interpreter";

/// Characters of each retrieved reference shown in a preview.
const PREVIEW_CHARS: usize = 200;

/// State carried across the trace records of one invocation.
#[derive(Debug, Clone, Default)]
pub struct RoutingState {
    pub step: Step,
    pub active_sub_agent: Option<String>,
    pub time_before_routing: Option<Instant>,
}

/// What one orchestration record contributed besides rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestrationOutcome {
    pub usage: Option<TokenUsage>,
    /// Working-memory table named by a tool invocation.
    pub table_name: Option<String>,
    /// Unescaped final response text.
    pub final_response: Option<String>,
}

/// Folds trace records into the routing state and the current conversation,
/// rendering progress notes as a side effect.
#[derive(Debug, Default)]
pub struct TraceInterpreter {
    state: RoutingState,
}

impl TraceInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    pub fn step(&self) -> Step {
        self.state.step
    }

    pub fn routing(
        &mut self,
        trace: &RoutingTrace,
        sink: &mut dyn TraceSink,
    ) -> Option<TokenUsage> {
        self.routing_at(trace, Instant::now(), sink)
    }

    /// Handles a routing-classifier record observed at `now`.
    ///
    /// The input phase starts the routing clock; the output phase decides the
    /// collaborator and returns the classifier's token usage. An output phase
    /// without a preceding input phase is ignored.
    pub fn routing_at(
        &mut self,
        trace: &RoutingTrace,
        now: Instant,
        sink: &mut dyn TraceSink,
    ) -> Option<TokenUsage> {
        if trace.model_invocation_input.is_some() {
            self.state.time_before_routing = Some(now);
            sink.render(TraceNote::SelectingCollaborator);
            return None;
        }

        let output = trace.model_invocation_output.as_ref()?;
        let Some(started) = self.state.time_before_routing else {
            debug!("Routing output without a preceding input phase, ignoring");
            return None;
        };
        let elapsed = now.saturating_duration_since(started);
        let usage = output.usage();

        let Some(label) = output.raw_response.as_ref().and_then(classification) else {
            warn!("Routing output carried no classification");
            return usage;
        };

        let outcome = if label == UNDECIDABLE {
            RoutingOutcome::NoMatch
        } else if label == KEEP_PREVIOUS_AGENT
            || self.state.active_sub_agent.as_deref() == Some(label.as_str())
        {
            self.state.step = self.state.step.next_top_level();
            RoutingOutcome::Continue
        } else {
            self.state.step = self.state.step.next_top_level();
            self.state.active_sub_agent = Some(label.clone());
            RoutingOutcome::Switched(escape_markup(&label))
        };
        debug!("Intent classifier chose {:?} in {:?}", outcome, elapsed);
        sink.render(TraceNote::RoutingDecision { outcome, elapsed });
        usage
    }

    /// Handles an orchestration record.
    ///
    /// `depth` is the length of the record's caller chain and `agent` the
    /// resolved display name of the emitting agent, if it could be resolved.
    /// Agent bookkeeping and step rendering need both an agent and a
    /// conversation; the rest of the record is rendered regardless.
    pub fn orchestration(
        &mut self,
        trace: &OrchestrationTrace,
        depth: usize,
        agent: Option<&str>,
        conversation: Option<&mut Conversation>,
        sink: &mut dyn TraceSink,
    ) -> OrchestrationOutcome {
        let mut outcome = OrchestrationOutcome::default();

        if let Some(input) = &trace.invocation_input {
            outcome.table_name = render_invocation_input(input, sink);
        }

        if let Some(output) = &trace.model_invocation_output {
            outcome.usage = output.usage();
        }

        if let (Some(name), Some(conversation)) = (agent, conversation) {
            self.track_agent(trace, depth, name, conversation, sink);
        }

        if let Some(observation) = &trace.observation {
            outcome.final_response = render_observation(observation, sink);
        }

        outcome
    }

    fn track_agent(
        &mut self,
        trace: &OrchestrationTrace,
        depth: usize,
        name: &str,
        conversation: &mut Conversation,
        sink: &mut dyn TraceSink,
    ) {
        let activity = conversation.agent_mut(name, self.state.step);

        if let Some(input) = &trace.invocation_input {
            if input.knowledge_base_lookup_input.is_some() {
                debug!("Agent {} using Knowledge Base", name);
                activity.record_tool(KNOWLEDGE_BASE_TOOL);
            }
            if let Some(function) = input
                .action_group_invocation_input
                .as_ref()
                .and_then(|action| action.function.as_deref())
            {
                debug!("Agent {} using Tool: {}", name, function);
                activity.record_tool(function);
            }
            if input.code_interpreter_invocation_input.is_some() {
                debug!("Agent {} using Code Interpreter", name);
                activity.record_tool(CODE_INTERPRETER_TOOL);
            }
        }

        if let Some(observation) = &trace.observation {
            if observation.knowledge_base_lookup_output.is_some() {
                activity.record_tool(KNOWLEDGE_BASE_TOOL);
            }
            if observation.action_group_invocation_output.is_some() {
                debug!("Agent {} completed Tool invocation", name);
            }
            if observation.code_interpreter_invocation_output.is_some() {
                activity.record_tool(CODE_INTERPRETER_TOOL);
            }
        }

        if let Some(rationale) = &trace.rationale {
            let nested = depth > 1;
            self.state.step = if nested {
                self.state.step.next_nested()
            } else {
                self.state.step.next_top_level()
            };
            activity.step = self.state.step;

            if nested {
                sink.render(TraceNote::SubAgentStep {
                    step: self.state.step,
                    agent: escape_markup(name),
                });
            } else {
                sink.render(TraceNote::StepHeading {
                    step: self.state.step,
                });
            }
            if let Some(text) = rationale.text.as_deref() {
                sink.render(TraceNote::Rationale {
                    text: escape_markup(text),
                    nested,
                });
            }
        }
    }

    pub fn failure(&self, trace: &FailureTrace, sink: &mut dyn TraceSink) {
        let reason = trace
            .failure_reason
            .as_deref()
            .unwrap_or("unknown failure");
        warn!("Agent runtime reported a failure: {}", reason);
        sink.render(TraceNote::Failure {
            reason: escape_markup(reason),
        });
    }
}

/// Extracts the classifier label from the raw model response, which is a
/// JSON document whose first content block holds `<a>label</a>`.
fn classification(raw: &RawResponse) -> Option<String> {
    let content = raw.content.as_deref()?;
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            warn!("Classifier response is not JSON: {}", err);
            return None;
        }
    };
    let text = value.get("content")?.get(0)?.get("text")?.as_str()?;
    Some(text.replace("<a>", "").replace("</a>", "").trim().to_string())
}

/// Renders invocation inputs and returns the working-memory table they name.
fn render_invocation_input(input: &InvocationInput, sink: &mut dyn TraceSink) -> Option<String> {
    let mut table_name = None;

    if let Some(lookup) = &input.knowledge_base_lookup_input {
        sink.render(TraceNote::KnowledgeBaseLookup {
            knowledge_base_id: escape_markup(
                lookup.knowledge_base_id.as_deref().unwrap_or_default(),
            ),
            query: escape_markup(lookup.text.as_deref().unwrap_or_default()),
        });
    }

    if let Some(action) = &input.action_group_invocation_input {
        match action.function.as_deref() {
            Some(function) => {
                let parameters = action
                    .parameters
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|param| (escape_markup(&param.name), escape_markup(&param.value)))
                    .collect();
                sink.render(TraceNote::ToolInvocation {
                    function: escape_markup(function),
                    execution_type: escape_markup(
                        action.execution_type.as_deref().unwrap_or_default(),
                    ),
                    parameters,
                });
                if WORKING_MEMORY_FUNCTIONS.contains(&function)
                    && let Some(table) = action.parameter(TABLE_NAME_PARAMETER)
                {
                    debug!("Working memory operation {} on table {}", function, table);
                    table_name = Some(table.to_string());
                }
            }
            None => debug!("Tool invocation without a function name, skipping"),
        }
    }

    if let Some(code) = &input.code_interpreter_invocation_input {
        match code.code.as_deref() {
            Some(source) => sink.render(TraceNote::CodeInvocation {
                code: escape_markup(source),
            }),
            None => debug!("Code interpreter invocation without source, skipping"),
        }
    }

    table_name
}

/// Renders observations and returns the final response text, if any.
fn render_observation(observation: &Observation, sink: &mut dyn TraceSink) -> Option<String> {
    if let Some(lookup) = &observation.knowledge_base_lookup_output {
        let previews = lookup
            .retrieved_references
            .iter()
            .map(|reference| {
                let text = reference
                    .content
                    .as_ref()
                    .and_then(|content| content.text.as_deref())
                    .unwrap_or_default();
                let preview: String = text.chars().take(PREVIEW_CHARS).collect();
                escape_markup(&preview)
            })
            .collect::<Vec<_>>();
        sink.render(TraceNote::KnowledgeBaseResults {
            reference_count: previews.len(),
            previews,
        });
    }

    if let Some(text) = observation
        .action_group_invocation_output
        .as_ref()
        .and_then(|output| output.text.as_deref())
    {
        sink.render(TraceNote::ToolResponse {
            text: escape_markup(text),
        });
    }

    if let Some(code) = &observation.code_interpreter_invocation_output {
        sink.render(TraceNote::CodeOutput {
            output: code.execution_output.as_deref().map(escape_markup),
            error: code.execution_error.as_deref().map(escape_markup),
            files: code
                .files
                .as_ref()
                .map(|files| files.iter().map(|file| escape_markup(file)).collect()),
        });
    }

    let final_response = observation
        .final_response
        .as_ref()
        .and_then(|response| response.text.clone());
    if let Some(text) = &final_response {
        sink.render(TraceNote::FinalResponse {
            text: escape_markup(text),
        });
    }
    final_response
}
