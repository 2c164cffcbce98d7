use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{Child, Command, Stdio};
use std::task::{Context as TaskContext, Poll};
use std::thread;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::agent::config::LocalProcessConfig;
use crate::agent::message::{InvocationRequest, StreamEvent};

use super::ndjson::decode_line;
use super::{AgentRuntime, EventStream};

/// `AgentRuntime` 的本地程序實作。
///
/// 每次呼叫都會啟動一個子程序，將請求以單行 JSON 寫入其 stdin，
/// 再從 stdout 逐行讀取 NDJSON 事件。
pub struct LocalProcessRuntime {
    config: LocalProcessConfig,
    workspace_root: PathBuf,
    /// 用於日誌顯示的程式名稱。
    label: String,
}

impl LocalProcessRuntime {
    pub fn new(config: LocalProcessConfig, workspace_root: &Path) -> Self {
        let label = Path::new(&config.program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&config.program)
            .to_string();
        Self {
            config,
            workspace_root: workspace_root.to_path_buf(),
            label,
        }
    }

    /// 設定並啟動子程序，stdin、stdout、stderr 皆導向管道。
    fn spawn(&self) -> Result<Child> {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);
        if let Some(dir) = self.config.working_dir.as_ref() {
            command.current_dir(dir);
        } else {
            command.current_dir(&self.workspace_root);
        }
        command.envs(&self.config.env);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match command.spawn() {
            Ok(child) => Ok(child),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(anyhow!("找不到代理執行檔：{}", self.config.program))
            }
            Err(err) => Err(anyhow!("無法啟動代理程序 {}: {}", self.label, err)),
        }
    }
}

#[async_trait]
impl AgentRuntime for LocalProcessRuntime {
    fn name(&self) -> &str {
        &self.label
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<EventStream> {
        let payload = serde_json::to_string(&request).context("序列化代理請求失敗")?;
        let mut child = self.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("代理 stdout 管道不存在"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("代理 stderr 管道不存在"))?;

        // 寫入請求後關閉 stdin，讓子程序知道輸入已結束。
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = writeln!(stdin, "{}", payload).and_then(|_| stdin.flush()) {
                // 不讀取 stdin 的程式（例如重播檔案）會讓寫入失敗，這不影響事件讀取。
                debug!("{} did not accept the request on stdin: {}", self.label, err);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_stdout_listener(stdout, tx);
        spawn_stderr_listener(stderr, self.label.clone());

        Ok(ProcessEventStream { child, events: rx }.boxed())
    }
}

/// 建立一個執行緒逐行讀取 stdout，將每一行解碼為 `StreamEvent` 後送入 channel。
/// 無法解碼的行會被記錄並略過；讀取失敗則送出錯誤並結束。
fn spawn_stdout_listener(
    stdout: std::process::ChildStdout,
    tx: UnboundedSender<Result<StreamEvent>>,
) {
    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            match line {
                Ok(raw) => match decode_line(&raw) {
                    Ok(Some(event)) => {
                        // 如果 channel 已關閉，則中斷循環。
                        if tx.send(Ok(event)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(err) => warn!("代理事件解析失敗: {}", err),
                },
                Err(err) => {
                    let _ = tx.send(Err(anyhow!("讀取代理標準輸出失敗: {err}")));
                    break;
                }
            }
        }
    });
}

/// 建立一個執行緒讀取 stderr，每一行都寫入日誌。
fn spawn_stderr_listener(stderr: std::process::ChildStderr, label: String) {
    thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for raw in reader.lines().map_while(|line| line.ok()) {
            warn!("{} 錯誤輸出: {}", label, raw);
        }
    });
}

/// 子程序的事件串流。串流被丟棄時子程序也會被終止。
struct ProcessEventStream {
    child: Child,
    events: UnboundedReceiver<Result<StreamEvent>>,
}

impl Stream for ProcessEventStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for ProcessEventStream {
    fn drop(&mut self) {
        // 嘗試殺死子程序，忽略任何錯誤（程序可能已自行結束）。
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
