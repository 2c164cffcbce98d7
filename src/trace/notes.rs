use std::time::Duration;

use crate::agent::session::Step;

/// 路由分類器的決策結果。
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingOutcome {
    /// 沒有符合的 collaborator，改由 supervisor 處理。
    NoMatch,
    /// 沿用前一個 collaborator。
    Continue,
    /// 切換到新的 collaborator。
    Switched(String),
}

/// 解讀追蹤事件時產生的一則進度註記。
///
/// 所有文字欄位都已經過 `escape_markup` 處理。
#[derive(Debug, Clone, PartialEq)]
pub enum TraceNote {
    /// 正在為請求選擇 collaborator。
    SelectingCollaborator,
    /// 路由分類完成，附帶花費的時間。
    RoutingDecision {
        outcome: RoutingOutcome,
        elapsed: Duration,
    },
    /// 最上層代理的步驟標題。
    StepHeading { step: Step },
    /// 子代理的步驟標題。
    SubAgentStep { step: Step, agent: String },
    /// 代理說明目前步驟的推理內容。
    Rationale { text: String, nested: bool },
    KnowledgeBaseLookup {
        knowledge_base_id: String,
        query: String,
    },
    ToolInvocation {
        function: String,
        execution_type: String,
        parameters: Vec<(String, String)>,
    },
    CodeInvocation { code: String },
    /// 知識庫查詢結果：參考資料數量與每筆最多 200 字元的預覽。
    KnowledgeBaseResults {
        reference_count: usize,
        previews: Vec<String>,
    },
    ToolResponse { text: String },
    CodeOutput {
        output: Option<String>,
        error: Option<String>,
        files: Option<Vec<String>>,
    },
    FinalResponse { text: String },
    /// 執行環境回報的失敗。
    Failure { reason: String },
}

/// 接收進度註記的輸出端。不同的呈現層（終端機、網頁、日誌）各自實作。
pub trait TraceSink: Send {
    fn render(&mut self, note: TraceNote);
}

/// 將所有註記保存在記憶體中的輸出端。
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub notes: Vec<TraceNote>,
}

#[cfg(test)]
impl TraceSink for RecordingSink {
    fn render(&mut self, note: TraceNote) {
        self.notes.push(note);
    }
}
