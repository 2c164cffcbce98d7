use std::io::{self, Write};

use log::warn;

use crate::trace::{RoutingOutcome, TraceNote, TraceSink};

use super::{Line, Tone, write_lines};

/// 將追蹤註記輸出到終端機的 `TraceSink`。
pub struct TerminalSink<W: Write + Send> {
    out: W,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> TraceSink for TerminalSink<W> {
    fn render(&mut self, note: TraceNote) {
        if let Err(err) = write_lines(&mut self.out, &describe(&note)) {
            warn!("無法輸出追蹤註記: {}", err);
        }
    }
}

/// 把一則註記轉成要顯示的文字行。
pub fn describe(note: &TraceNote) -> Vec<Line> {
    match note {
        TraceNote::SelectingCollaborator => vec![Line::new(
            Tone::Dim,
            "Selecting the best collaborator for this request...",
        )],
        TraceNote::RoutingDecision { outcome, elapsed } => {
            let decision = match outcome {
                RoutingOutcome::NoMatch => Line::new(
                    Tone::Warning,
                    "No matching collaborator. Falling back to SUPERVISOR mode.",
                ),
                RoutingOutcome::Continue => {
                    Line::new(Tone::Accent, "Continuing with the previous collaborator.")
                }
                RoutingOutcome::Switched(name) => {
                    Line::new(Tone::Success, format!("Collaborator: {name}"))
                }
            };
            vec![
                decision,
                Line::new(
                    Tone::Dim,
                    format!("- Intent classifier took {:.1}s", elapsed.as_secs_f64()),
                ),
            ]
        }
        TraceNote::StepHeading { step } => vec![Line::new(Tone::Heading, format!("Step {step}"))],
        TraceNote::SubAgentStep { step, agent } => {
            vec![Line::new(Tone::SubAgent, format!("Step {step} Sub-Agent {agent}")).indented(1)]
        }
        TraceNote::Rationale { text, nested } => {
            let indent = if *nested { 2 } else { 1 };
            vec![Line::new(Tone::Plain, text.clone()).indented(indent)]
        }
        TraceNote::KnowledgeBaseLookup {
            knowledge_base_id,
            query,
        } => vec![
            Line::new(Tone::Accent, "Using knowledge base").indented(1),
            Line::new(Tone::Plain, format!("knowledge base id: {knowledge_base_id}")).indented(2),
            Line::new(Tone::Plain, format!("query: {query}")).indented(2),
        ],
        TraceNote::ToolInvocation {
            function,
            execution_type,
            parameters,
        } => {
            let mut lines = vec![
                Line::new(Tone::Accent, format!("Invoking tool {function}")).indented(1),
                Line::new(Tone::Plain, format!("- Function: {function}")).indented(2),
                Line::new(Tone::Plain, format!("- Type: {execution_type}")).indented(2),
            ];
            if !parameters.is_empty() {
                lines.push(Line::new(Tone::Plain, "- Parameters").indented(2));
                lines.extend(parameters.iter().map(|(name, value)| {
                    Line::new(Tone::Code, format!("{name} = {value}")).indented(3)
                }));
            }
            lines
        }
        TraceNote::CodeInvocation { code } => {
            let mut lines =
                vec![Line::new(Tone::Accent, "Code interpreter tool usage").indented(1)];
            lines.extend(code.lines().map(|line| Line::new(Tone::Code, line).indented(2)));
            lines
        }
        TraceNote::KnowledgeBaseResults {
            reference_count,
            previews,
        } => {
            let mut lines = vec![
                Line::new(Tone::Success, "Knowledge Base Results").indented(1),
                Line::new(Tone::Plain, format!("{reference_count} references")).indented(2),
            ];
            lines.extend(previews.iter().enumerate().map(|(i, preview)| {
                Line::new(Tone::Dim, format!("({}) {}...", i + 1, preview)).indented(2)
            }));
            lines
        }
        TraceNote::ToolResponse { text } => vec![
            Line::new(Tone::Success, "Tool Response").indented(1),
            Line::new(Tone::Plain, text.clone()).indented(2),
        ],
        TraceNote::CodeOutput {
            output,
            error,
            files,
        } => {
            let mut lines = vec![Line::new(Tone::Success, "Code interpreter").indented(1)];
            if let Some(output) = output {
                lines.extend(output.lines().map(|line| Line::new(Tone::Code, line).indented(2)));
            }
            if let Some(error) = error {
                let message = format!("Code interpretation error: {error}");
                lines.push(Line::new(Tone::Warning, message).indented(2));
            }
            if let Some(files) = files {
                lines.push(
                    Line::new(
                        Tone::Plain,
                        format!("Code interpretation files generated: {}", files.join(", ")),
                    )
                    .indented(2),
                );
            }
            lines
        }
        TraceNote::FinalResponse { text } => vec![
            Line::new(Tone::Heading, "Agent Response").indented(1),
            Line::new(Tone::Plain, text.clone()).indented(2),
        ],
        TraceNote::Failure { reason } => {
            vec![Line::new(Tone::Warning, format!("Agent failure: {reason}"))]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::session::Step;
    use std::time::Duration;

    fn texts(note: TraceNote) -> Vec<String> {
        describe(&note).into_iter().map(|line| line.text).collect()
    }

    #[test]
    fn routing_decision_reports_seconds_with_one_decimal() {
        let lines = texts(TraceNote::RoutingDecision {
            outcome: RoutingOutcome::Switched("billing".into()),
            elapsed: Duration::from_millis(1260),
        });
        assert_eq!(lines, vec!["Collaborator: billing", "- Intent classifier took 1.3s"]);
    }

    #[test]
    fn sub_agent_heading_names_agent() {
        let lines = describe(&TraceNote::SubAgentStep {
            step: Step::new(2, 1),
            agent: "researcher".into(),
        });
        assert_eq!(lines[0].text, "Step 2.1 Sub-Agent researcher");
        assert_eq!(lines[0].tone, Tone::SubAgent);
    }

    #[test]
    fn tool_parameters_are_listed() {
        let lines = texts(TraceNote::ToolInvocation {
            function: "web_search".into(),
            execution_type: "LAMBDA".into(),
            parameters: vec![("search_query".into(), "EV charging".into())],
        });
        assert_eq!(lines.last().map(String::as_str), Some("search_query = EV charging"));
    }

    #[test]
    fn knowledge_base_previews_are_numbered() {
        let lines = texts(TraceNote::KnowledgeBaseResults {
            reference_count: 2,
            previews: vec!["first".into(), "second".into()],
        });
        assert_eq!(lines[1], "2 references");
        assert_eq!(lines[2], "(1) first...");
        assert_eq!(lines[3], "(2) second...");
    }

    #[test]
    fn sink_writes_styled_text() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.render(TraceNote::StepHeading { step: Step::new(3, 0) });
        let written = String::from_utf8(sink.out).unwrap();
        assert!(written.contains("Step 3"));
        assert!(written.ends_with('\n'));
    }
}
