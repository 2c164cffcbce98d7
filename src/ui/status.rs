use std::io::{self, Write};

use crate::agent::session::{ChatRole, Conversation, SessionStore};

use super::{Line, Tone, write_lines};

/// Summary of every conversation in the session, newest first.
pub fn status_lines(store: &SessionStore) -> Vec<Line> {
    let mut lines = vec![Line::new(Tone::Title, "Conversations")];
    for (index, conversation) in store.recent().enumerate() {
        lines.extend(conversation_lines(index + 1, conversation));
    }
    if let Some(table) = store.current_table_name() {
        lines.push(Line::new(Tone::Dim, format!("Working memory table: {table}")));
    }
    lines
}

fn conversation_lines(number: usize, conversation: &Conversation) -> Vec<Line> {
    let mut lines = vec![Line::new(
        Tone::Heading,
        format!("{number}. {}", conversation.question),
    )];
    for agent in &conversation.agents {
        lines.push(
            Line::new(
                Tone::Accent,
                format!("{} ({})", agent.name, agent.start_time.format("%H:%M:%S")),
            )
            .indented(1),
        );
        lines.extend(
            agent
                .tools_used
                .iter()
                .map(|tool| Line::new(Tone::Plain, format!("- {tool}")).indented(2)),
        );
    }
    let tokens = &conversation.tokens;
    lines.push(Line::new(Tone::Dim, format!("Input Tokens: {}", tokens.input)).indented(1));
    lines.push(Line::new(Tone::Dim, format!("Output Tokens: {}", tokens.output)).indented(1));
    lines.push(Line::new(Tone::Dim, format!("LLM Calls: {}", tokens.llm_calls)).indented(1));
    lines
}

pub fn render_status<W: Write + ?Sized>(out: &mut W, store: &SessionStore) -> io::Result<()> {
    write_lines(out, &status_lines(store))
}

/// 依時間順序列出本次工作階段的聊天記錄。
pub fn history_lines(store: &SessionStore) -> Vec<Line> {
    let mut lines = vec![Line::new(Tone::Title, "History")];
    if store.messages().is_empty() {
        lines.push(Line::new(Tone::Dim, "No messages yet").indented(1));
    }
    for message in store.messages() {
        let (tone, speaker) = match message.role {
            ChatRole::User => (Tone::Heading, "You"),
            ChatRole::Assistant => (Tone::Accent, store.bot().bot_name.as_str()),
        };
        lines.push(Line::new(tone, format!("{speaker}:")).indented(1));
        lines.extend(
            message
                .content
                .lines()
                .map(|line| Line::new(Tone::Plain, line).indented(2)),
        );
    }
    lines
}

pub fn render_history<W: Write + ?Sized>(out: &mut W, store: &SessionStore) -> io::Result<()> {
    write_lines(out, &history_lines(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::BotConfig;
    use crate::agent::session::{Step, TokenTally};

    #[test]
    fn newest_conversation_is_listed_first_with_totals() {
        let mut store = SessionStore::with_id("s", BotConfig::named("Energy Agent"), Vec::new());
        store.begin_conversation("first question");
        let second = store.begin_conversation("second question");
        let conversation = store.conversation_mut(second).unwrap();
        let agent = conversation.agent_mut("forecaster", Step::new(1, 0));
        agent.record_tool("Knowledge Base");
        agent.record_tool("forecast");
        store.finalize_tokens(
            second,
            TokenTally {
                input: 120,
                output: 45,
                llm_calls: 3,
            },
        );

        let texts: Vec<String> = status_lines(&store).into_iter().map(|line| line.text).collect();
        assert_eq!(texts[0], "Conversations");
        assert_eq!(texts[1], "1. second question");
        assert!(texts[2].starts_with("forecaster ("));
        assert_eq!(texts[3], "- Knowledge Base");
        assert_eq!(texts[4], "- forecast");
        assert_eq!(texts[5], "Input Tokens: 120");
        assert_eq!(texts[7], "LLM Calls: 3");
        assert_eq!(texts[8], "2. first question");
        assert_eq!(texts.last().map(String::as_str), Some("LLM Calls: 0"));
    }

    #[test]
    fn remembered_table_is_shown() {
        let bot = BotConfig::named("Marketing Advisor");
        let mut store = SessionStore::with_id("s", bot, Vec::new());
        store.remember_table_name("startup-advisor");
        let lines = status_lines(&store);
        assert_eq!(lines.last().unwrap().text, "Working memory table: startup-advisor");
    }

    #[test]
    fn history_lists_messages_in_order() {
        let mut store = SessionStore::with_id("s", BotConfig::named("Energy Agent"), Vec::new());
        let texts: Vec<String> = history_lines(&store).into_iter().map(|line| line.text).collect();
        assert_eq!(texts, ["History", "No messages yet"]);

        store.push_message(ChatRole::User, "How much energy did I use?");
        store.push_message(ChatRole::Assistant, "About 12 kWh.\nMostly heating.");
        let texts: Vec<String> = history_lines(&store).into_iter().map(|line| line.text).collect();
        assert_eq!(
            texts,
            [
                "History",
                "You:",
                "How much energy did I use?",
                "Energy Agent:",
                "About 12 kWh.",
                "Mostly heating.",
            ]
        );
    }
}
