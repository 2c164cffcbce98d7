use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::config::BotConfig;
use super::prompt::TaskDefinition;

/// Reasoning progress counter.
///
/// Stored as tenths so that nested sub-agent steps accumulate exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Step(u32);

impl Step {
    pub const ZERO: Step = Step(0);

    /// Builds a step from a whole number and a number of tenths, e.g. `(2, 1)` is 2.1.
    pub fn new(whole: u32, tenths: u32) -> Self {
        Step(whole * 10 + tenths)
    }

    /// Advances to the next whole number; 2.3 becomes 3.
    pub fn next_top_level(self) -> Self {
        Step((self.0 / 10 + 1) * 10)
    }

    /// Advances by one tenth for nested sub-agent activity.
    pub fn next_nested(self) -> Self {
        Step(self.0 + 1)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 10 == 0 {
            write!(f, "{}", self.0 / 10)
        } else {
            write!(f, "{}.{}", self.0 / 10, self.0 % 10)
        }
    }
}

/// Token totals attributed to one conversation turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTally {
    pub input: u64,
    pub output: u64,
    pub llm_calls: u64,
}

impl TokenTally {
    /// Adds one model call to the tally.
    ///
    /// Usage is counted only when both counts are present and non-zero; a
    /// partial report leaves the tally untouched.
    pub fn accumulate(&mut self, input: Option<u64>, output: Option<u64>) {
        match (input, output) {
            (Some(input), Some(output)) if input > 0 && output > 0 => {
                self.input += input;
                self.output += output;
                self.llm_calls += 1;
            }
            _ => {}
        }
    }
}

/// One sub-agent's participation in a conversation.
#[derive(Debug, Clone)]
pub struct AgentActivity {
    pub name: String,
    pub start_time: DateTime<Local>,
    pub step: Step,
    pub tools_used: BTreeSet<String>,
}

impl AgentActivity {
    pub fn new(name: impl Into<String>, step: Step) -> Self {
        Self {
            name: name.into(),
            start_time: Local::now(),
            step,
            tools_used: BTreeSet::new(),
        }
    }

    /// Records a tool label; repeated labels are kept once.
    pub fn record_tool(&mut self, label: impl Into<String>) {
        self.tools_used.insert(label.into());
    }
}

/// One user question and everything the agents did to answer it.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub question: String,
    pub agents: Vec<AgentActivity>,
    pub tokens: TokenTally,
}

impl Conversation {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            agents: Vec::new(),
            tokens: TokenTally::default(),
        }
    }

    /// Returns the activity record for `name`, creating it on first sight.
    pub fn agent_mut(&mut self, name: &str, step: Step) -> &mut AgentActivity {
        let index = match self.agents.iter().position(|agent| agent.name == name) {
            Some(index) => index,
            None => {
                self.agents.push(AgentActivity::new(name, step));
                self.agents.len() - 1
            }
        };
        &mut self.agents[index]
    }
}

/// Handle to a conversation inside a [`SessionStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// State of one chat session: the message history and an append-only log of
/// conversations.
pub struct SessionStore {
    session_id: String,
    bot: BotConfig,
    tasks: Vec<TaskDefinition>,
    messages: Vec<ChatMessage>,
    conversations: Vec<Conversation>,
    current: Option<ConversationId>,
    current_table_name: Option<String>,
}

impl SessionStore {
    /// Opens a session with a freshly generated id.
    pub fn new(bot: BotConfig, tasks: Vec<TaskDefinition>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), bot, tasks)
    }

    pub fn with_id(
        session_id: impl Into<String>,
        bot: BotConfig,
        tasks: Vec<TaskDefinition>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            bot,
            tasks,
            messages: Vec::new(),
            conversations: Vec::new(),
            current: None,
            current_table_name: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn bot(&self) -> &BotConfig {
        &self.bot
    }

    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    /// Appends a new conversation and makes it the current one.
    pub fn begin_conversation(&mut self, question: impl Into<String>) -> ConversationId {
        self.conversations.push(Conversation::new(question));
        let id = ConversationId(self.conversations.len() - 1);
        self.current = Some(id);
        id
    }

    pub fn current(&self) -> Option<ConversationId> {
        self.current
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(id.0)
    }

    pub fn conversation_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(id.0)
    }

    /// Overwrites the token totals of a conversation. Calling it again with the
    /// same tally changes nothing.
    pub fn finalize_tokens(&mut self, id: ConversationId, tally: TokenTally) {
        if let Some(conversation) = self.conversations.get_mut(id.0) {
            conversation.tokens = tally;
        }
    }

    /// Conversations in the order they were asked.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Conversations newest first, the order the status panel shows them in.
    pub fn recent(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter().rev()
    }

    pub fn push_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Working-memory table the agents were last seen using.
    pub fn current_table_name(&self) -> Option<&str> {
        self.current_table_name.as_deref()
    }

    pub fn remember_table_name(&mut self, table_name: impl Into<String>) {
        self.current_table_name = Some(table_name.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::with_id("session-1", BotConfig::named("Energy Agent"), Vec::new())
    }

    #[test]
    fn top_level_step_moves_to_next_whole_number() {
        assert_eq!(Step::ZERO.next_top_level(), Step::new(1, 0));
        assert_eq!(Step::new(2, 3).next_top_level(), Step::new(3, 0));
    }

    #[test]
    fn nested_steps_accumulate_in_tenths() {
        let step = Step::new(2, 0).next_nested().next_nested();
        assert_eq!(step, Step::new(2, 2));
        assert_eq!(step.to_string(), "2.2");
        assert!((step.as_f64() - 2.2).abs() < f64::EPSILON);
        assert_eq!(Step::new(3, 0).to_string(), "3");
    }

    #[test]
    fn partial_usage_leaves_tally_untouched() {
        let mut tally = TokenTally {
            input: 4,
            output: 2,
            llm_calls: 1,
        };
        let before = tally;
        tally.accumulate(None, Some(5));
        assert_eq!(tally, before);
        tally.accumulate(Some(5), None);
        assert_eq!(tally, before);
        tally.accumulate(Some(10), Some(5));
        assert_eq!(
            tally,
            TokenTally {
                input: 14,
                output: 7,
                llm_calls: 2
            }
        );
    }

    #[test]
    fn zero_counts_are_not_a_model_call() {
        let mut tally = TokenTally::default();
        tally.accumulate(Some(0), Some(9));
        assert_eq!(tally, TokenTally::default());
    }

    #[test]
    fn tools_used_has_set_semantics() {
        let mut activity = AgentActivity::new("researcher", Step::ZERO);
        activity.record_tool("Knowledge Base");
        activity.record_tool("Knowledge Base");
        assert_eq!(activity.tools_used.len(), 1);
    }

    #[test]
    fn agent_records_are_created_once_per_name() {
        let mut conversation = Conversation::new("question");
        conversation.agent_mut("researcher", Step::new(1, 0)).record_tool("web_search");
        conversation.agent_mut("researcher", Step::new(2, 0)).record_tool("Code Interpreter");
        assert_eq!(conversation.agents.len(), 1);
        assert_eq!(conversation.agents[0].step, Step::new(1, 0));
        assert_eq!(conversation.agents[0].tools_used.len(), 2);
    }

    #[test]
    fn begin_conversation_appends_and_sets_current() {
        let mut store = store();
        let first = store.begin_conversation("first");
        let second = store.begin_conversation("second");
        assert_eq!(store.current(), Some(second));
        assert_eq!(store.conversations().len(), 2);
        assert_eq!(store.conversation(first).unwrap().question, "first");
        let recent: Vec<_> = store.recent().map(|c| c.question.as_str()).collect();
        assert_eq!(recent, vec!["second", "first"]);
    }

    #[test]
    fn finalize_tokens_is_last_write_wins() {
        let mut store = store();
        let id = store.begin_conversation("q");
        let tally = TokenTally {
            input: 10,
            output: 5,
            llm_calls: 1,
        };
        store.finalize_tokens(id, TokenTally::default());
        store.finalize_tokens(id, tally);
        store.finalize_tokens(id, tally);
        assert_eq!(store.conversation(id).unwrap().tokens, tally);
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionStore::new(BotConfig::named("a"), Vec::new());
        let b = SessionStore::new(BotConfig::named("a"), Vec::new());
        assert_ne!(a.session_id(), b.session_id());
    }
}
