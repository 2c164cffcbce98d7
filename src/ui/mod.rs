//! 終端機呈現層。
//!
//! `terminal` 把追蹤註記印成帶顏色的文字，`status` 產生對話摘要面板。
//! 兩者都先產生純文字的 `Line`，再由同一個函式套用樣式輸出，方便測試。

use std::io::{self, Write};

use crossterm::style::{Color, Stylize};

pub mod status;
pub mod terminal;
mod theme;

pub use status::{render_history, render_status};
pub use terminal::TerminalSink;

/// 一行輸出的語氣，決定套用的顏色與字重。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Title,
    Heading,
    SubAgent,
    Success,
    Warning,
    Accent,
    Code,
    Plain,
    Dim,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Title => theme::TITLE,
            Tone::Heading => theme::HEADING,
            Tone::SubAgent => theme::SUB_AGENT,
            Tone::Success => theme::SUCCESS,
            Tone::Warning => theme::WARNING,
            Tone::Accent => theme::ACCENT,
            Tone::Code => theme::CODE,
            Tone::Plain => theme::FG_PRIMARY,
            Tone::Dim => theme::FG_DIM,
        }
    }

    fn is_bold(self) -> bool {
        matches!(self, Tone::Title | Tone::Heading | Tone::SubAgent)
    }
}

/// 尚未套用樣式的一行文字。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub tone: Tone,
    pub indent: usize,
    pub text: String,
}

impl Line {
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            indent: 0,
            text: text.into(),
        }
    }

    pub fn indented(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }
}

/// 以主題顏色輸出多行文字。
pub fn write_lines<W: Write + ?Sized>(out: &mut W, lines: &[Line]) -> io::Result<()> {
    for line in lines {
        let styled = line.text.as_str().with(line.tone.color());
        let styled = if line.tone.is_bold() { styled.bold() } else { styled };
        writeln!(out, "{}{}", "  ".repeat(line.indent), styled)?;
    }
    out.flush()
}

/// 印出 bot 標題與起始提示。
pub fn print_banner<W: Write + ?Sized>(
    out: &mut W,
    bot_name: &str,
    start_prompt: &str,
) -> io::Result<()> {
    let mut lines = vec![Line::new(Tone::Title, format!("== {bot_name} =="))];
    if !start_prompt.trim().is_empty() {
        lines.push(Line::new(Tone::Dim, start_prompt));
    }
    write_lines(out, &lines)
}
