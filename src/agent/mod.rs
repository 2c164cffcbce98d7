//! 代理中繼的核心組件。
//!
//! 此模組負責描述與代理執行環境溝通所需的一切：設定檔、請求與事件的
//! 資料結構、任務提示、對話狀態，以及連線管理等抽象層。

// --- 子模組宣告 ---

/// `config` 模組：定義 `bots.toml` 的解析格式，包括 bot、執行環境與代理目錄的設定。
pub mod config;

/// `manager` 模組：提供 `RelayManager`，負責載入設定、建立執行環境並發起呼叫。
pub mod manager;

/// `message` 模組：定義送往代理的請求，以及事件串流中的 chunk 與追蹤事件格式。
pub mod message;

/// `prompt` 模組：讀取任務檔並組合成單一提示。
pub mod prompt;

/// `providers` 模組：包含與不同類型代理後端（如 HTTP API、本地程序）
/// 進行通訊的具體實作邏輯。
pub mod providers;

/// `session` 模組：管理一個 session 的對話紀錄、代理活動與 token 統計。
pub mod session;

// --- 公共 API 重新導出 ---

pub use manager::{RelayError, RelayManager};
pub use session::{ChatRole, SessionStore};
