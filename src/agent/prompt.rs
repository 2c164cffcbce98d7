//! Builds the single prompt sent for bots that run a fixed task list.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

const SEQUENTIAL_PREAMBLE: &str = "Perform the following tasks sequentially. Do not run any \
task in parallel. If a task needs information produced by a previous task, include the full \
text details as comprehensive input to that task.";

const PARALLEL_PREAMBLE: &str = "Perform as many of the following tasks in parallel as \
possible. When a dependency between tasks is clear, run those tasks sequentially. If a task \
needs information produced by a previous task, be sure to include comprehensive text details \
as input to that task.";

const REVIEW_LINE: &str = "Before submitting your final answer, review whether each task \
achieved its expected outcome.";

/// How the agent is told to schedule the tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Sequential,
    #[default]
    AllowParallel,
}

/// One entry of a task file, already rendered to a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    pub text: String,
}

impl fmt::Display for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    description: String,
    #[serde(default)]
    expected_output: Option<String>,
}

/// Reads a YAML task file (`name: {description, expected_output}`) in
/// document order, substituting `{key}` placeholders from `inputs`.
pub fn load_tasks(path: &Path, inputs: &BTreeMap<String, String>) -> Result<Vec<TaskDefinition>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read task file {}", path.display()))?;
    parse_tasks(&raw, inputs)
        .with_context(|| format!("failed to parse task file {}", path.display()))
}

pub fn parse_tasks(raw: &str, inputs: &BTreeMap<String, String>) -> Result<Vec<TaskDefinition>> {
    let mapping: serde_yaml::Mapping = serde_yaml::from_str(raw)?;
    let mut tasks = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| anyhow!("task names must be strings"))?
            .to_string();
        let entry: TaskEntry = serde_yaml::from_value(value)
            .with_context(|| format!("task {name} is malformed"))?;
        let mut text = fill_placeholders(&entry.description, inputs);
        if let Some(expected) = entry.expected_output {
            text.push_str(" Expected output: ");
            text.push_str(&fill_placeholders(&expected, inputs));
        }
        tasks.push(TaskDefinition {
            name,
            text: single_line(&text),
        });
    }
    Ok(tasks)
}

fn fill_placeholders(template: &str, inputs: &BTreeMap<String, String>) -> String {
    inputs.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Joins tasks into one prompt with a scheduling preamble and a closing
/// review instruction.
pub fn build_prompt<T: fmt::Display>(
    tasks: &[T],
    additional_instructions: Option<&str>,
    mode: ProcessingMode,
) -> String {
    let preamble = match mode {
        ProcessingMode::Sequential => SEQUENTIAL_PREAMBLE,
        ProcessingMode::AllowParallel => PARALLEL_PREAMBLE,
    };
    let mut prompt = format!("{preamble}\n\n");
    for (index, task) in tasks.iter().enumerate() {
        prompt.push_str(&format!("Task {}. {}\n", index + 1, task));
    }
    prompt.push('\n');
    prompt.push_str(REVIEW_LINE);
    if let Some(extra) = additional_instructions
        && !extra.is_empty()
    {
        prompt.push('\n');
        prompt.push_str(extra);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_lines(prompt: &str) -> Vec<&str> {
        prompt.lines().filter(|line| line.starts_with("Task ")).collect()
    }

    #[test]
    fn tasks_are_numbered_in_input_order() {
        let tasks = ["collect data", "summarise findings", "draft report"];
        for mode in [ProcessingMode::Sequential, ProcessingMode::AllowParallel] {
            let prompt = build_prompt(&tasks, None, mode);
            assert_eq!(
                task_lines(&prompt),
                vec![
                    "Task 1. collect data",
                    "Task 2. summarise findings",
                    "Task 3. draft report"
                ]
            );
            assert!(prompt.contains(REVIEW_LINE));
        }
    }

    #[test]
    fn preamble_depends_on_mode() {
        let sequential = build_prompt(&["a"], None, ProcessingMode::Sequential);
        let parallel = build_prompt(&["a"], None, ProcessingMode::AllowParallel);
        assert!(sequential.starts_with(SEQUENTIAL_PREAMBLE));
        assert!(parallel.starts_with(PARALLEL_PREAMBLE));
    }

    #[test]
    fn additional_instructions_are_the_last_line() {
        let prompt = build_prompt(
            &["a"],
            Some("Use table name: advisor."),
            ProcessingMode::AllowParallel,
        );
        assert_eq!(prompt.lines().last(), Some("Use table name: advisor."));

        let without = build_prompt(&["a"], Some(""), ProcessingMode::AllowParallel);
        assert_eq!(without.lines().last(), Some(REVIEW_LINE));
    }

    #[test]
    fn empty_task_list_still_has_framing() {
        let tasks: [&str; 0] = [];
        let prompt = build_prompt(&tasks, None, ProcessingMode::Sequential);
        assert!(task_lines(&prompt).is_empty());
        assert!(prompt.ends_with(REVIEW_LINE));
    }

    #[test]
    fn yaml_tasks_keep_document_order_and_fill_inputs() {
        let raw = r#"
market_research:
  description: >
    Research the market for {web_domain}.
    Focus on competitors.
  expected_output: A list of competitors.
video_ad:
  description: Draft a video ad for {web_domain}.
"#;
        let mut inputs = BTreeMap::new();
        inputs.insert("web_domain".to_string(), "flyingCars.com".to_string());
        let tasks = parse_tasks(raw, &inputs).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "market_research");
        assert_eq!(
            tasks[0].text,
            "Research the market for flyingCars.com. Focus on competitors. \
             Expected output: A list of competitors."
        );
        assert_eq!(tasks[1].text, "Draft a video ad for flyingCars.com.");

        let prompt = build_prompt(&tasks, None, ProcessingMode::AllowParallel);
        assert_eq!(task_lines(&prompt).len(), 2);
    }

    #[test]
    fn malformed_task_reports_error() {
        let raw = "broken:\n  expected_output: nothing\n";
        assert!(parse_tasks(raw, &BTreeMap::new()).is_err());
    }
}
