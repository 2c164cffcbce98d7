pub mod agent;
pub mod logging;
pub mod trace;
pub mod ui;

use std::env;
use std::io::{self, Write};

use anyhow::{Context, Result};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use agent::{ChatRole, RelayManager, SessionStore};
use ui::{TerminalSink, print_banner, render_history, render_status};

/// 選擇 bot 的環境變數。
const BOT_NAME_ENV: &str = "BOT_NAME";
/// 列出聊天記錄而不送出問題的指令。
const HISTORY_COMMAND: &str = "/history";
/// 呼叫失敗時記錄在對話中的回答。
const FALLBACK_ANSWER: &str = "I encountered an error processing your request. Please try again.";

#[tokio::main]
async fn main() -> Result<()> {
    let workspace_root = env::current_dir().context("無法取得目前工作目錄")?;
    logging::init(&workspace_root)?;

    let manager = RelayManager::bootstrap(workspace_root).await?;
    let requested = env::var(BOT_NAME_ENV).ok();
    let mut store = manager.open_session(requested.as_deref())?;
    info!(
        "Session {} started with bot {} via {}",
        store.session_id(),
        store.bot().bot_name,
        manager.runtime_name()
    );

    let mut stdout = io::stdout();
    print_banner(&mut stdout, &store.bot().bot_name, &store.bot().start_prompt)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == HISTORY_COMMAND {
            render_history(&mut stdout, &store)?;
            continue;
        }

        store.push_message(ChatRole::User, query);
        let answer = run_turn(&manager, &mut store, query).await;
        store.push_message(ChatRole::Assistant, answer);

        writeln!(stdout)?;
        render_status(&mut stdout, &store)?;
    }
    Ok(())
}

/// 送出一個回合並即時印出回答，回傳要記錄在對話中的文字。
async fn run_turn(manager: &RelayManager, store: &mut SessionStore, query: &str) -> String {
    let conversation = store.begin_conversation(query);
    let mut sink = TerminalSink::stdout();
    let result = async {
        let mut invocation = manager
            .invoke_agent(store, conversation, query, &mut sink)
            .await?;
        let mut stdout = io::stdout();
        while let Some(chunk) = invocation.next_chunk().await? {
            write!(stdout, "{}", chunk.text)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        Ok::<_, anyhow::Error>(invocation.answer())
    }
    .await;

    match result {
        Ok(answer) => answer,
        Err(err) => {
            error!("Error: {:#}", err);
            eprintln!("An error occurred. See the log for details.");
            FALLBACK_ANSWER.to_string()
        }
    }
}
