//! `providers` 模組負責與代理執行環境及代理目錄進行通訊的具體實作。
//!
//! 執行環境（`AgentRuntime`）回傳一個事件串流；代理目錄（`AgentDirectory`）
//! 負責把代理 ID 轉成顯示名稱。

// --- 子模組宣告 ---

/// `directory` 模組：設定檔內建的靜態代理目錄。
pub mod directory;
/// `http` 模組：透過 HTTP API 與遠端代理服務通訊的實作。
pub mod http;
/// `local_process` 模組：透過本地子程序的 stdout 讀取事件串流的實作。
pub mod local_process;
/// `ndjson` 模組：將位元組串流切成行並解碼為事件。
pub mod ndjson;

#[cfg(test)]
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::agent::message::{InvocationRequest, StreamEvent};

/// 一次呼叫所產生的事件串流。串流是惰性的、有限的，且只能走訪一次。
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// 所有代理執行環境都必須遵守的通用介面。
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// 回傳此執行環境的名稱，用於日誌記錄。
    fn name(&self) -> &str;

    /// 送出一次呼叫並回傳事件串流。
    ///
    /// 連線或授權失敗時回傳錯誤；串流途中的傳輸錯誤則以串流中的 `Err` 項目表示。
    async fn invoke(&self, request: InvocationRequest) -> Result<EventStream>;
}

/// 代理目錄回傳的中繼資料。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMetadata {
    pub agent_id: String,
    pub agent_name: String,
}

/// 代理中繼資料的查詢介面。
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// 以代理 ID 查詢顯示名稱。
    async fn get_agent(&self, agent_id: &str) -> Result<AgentMetadata>;

    /// 以代理名稱反查代理 ID。
    async fn find_agent_id(&self, agent_name: &str) -> Result<Option<String>>;

    /// 回傳代理最新的別名 ID。
    async fn latest_alias_id(&self, agent_id: &str) -> Result<Option<String>>;
}
