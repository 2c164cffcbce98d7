use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::message::SessionState;
use super::prompt::ProcessingMode;

/// Environment variable that points at an alternative settings file.
pub const CONFIG_ENV: &str = "AGENT_RELAY_CONFIG";

/// Placeholder in session attributes that expands to the local date.
const TODAYS_DATE: &str = "{todays_date}";

/// 中繼設定的頂層結構，通常從 `config/bots.toml` 載入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// 預設使用的 bot 名稱。如果為 `None`，則使用列表中的第一個。
    #[serde(default)]
    pub default_bot: Option<String>,
    /// 與代理執行環境通訊的方式。
    pub runtime: RuntimeTransport,
    /// 查詢代理名稱的方式。
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// 所有已定義的 bot。
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

impl RelaySettings {
    /// 從工作區目錄讀取設定。
    /// 若設定了 `AGENT_RELAY_CONFIG` 環境變數，則改讀該路徑。
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config_path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace_root.join("config/bots.toml"));
        if !config_path.exists() {
            return Err(anyhow!("找不到 bot 設定檔: {}", config_path.display()));
        }
        let raw = fs::read_to_string(&config_path)
            .with_context(|| format!("讀取 bot 設定失敗: {}", config_path.display()))?;
        Self::parse(&raw, workspace_root)
            .with_context(|| format!("解析 bot 設定失敗: {}", config_path.display()))
    }

    /// 解析 TOML 內容並將相對路徑轉為相對於工作區根目錄的絕對路徑。
    pub fn parse(raw: &str, workspace_root: &Path) -> Result<Self> {
        let parsed: RelaySettings = toml::from_str(raw)?;
        if parsed.bots.is_empty() {
            return Err(anyhow!("設定中沒有任何 bot"));
        }
        Ok(parsed.normalize(workspace_root))
    }

    fn normalize(mut self, workspace_root: &Path) -> Self {
        self.runtime.normalize_paths(workspace_root);
        for bot in &mut self.bots {
            if let Some(tasks) = bot.tasks.as_mut()
                && tasks.is_relative()
            {
                *tasks = workspace_root.join(&tasks);
            }
        }
        self
    }

    /// 依序以指定名稱、`default_bot`、列表第一個來選擇 bot。
    pub fn select_bot(&self, requested: Option<&str>) -> Option<&BotConfig> {
        if let Some(name) = requested
            && let Some(bot) = self.bot(name)
        {
            return Some(bot);
        }
        if let Some(name) = &self.default_bot
            && let Some(bot) = self.bot(name)
        {
            return Some(bot);
        }
        self.bots.first()
    }

    /// 根據名稱尋找 bot。
    pub fn bot(&self, name: &str) -> Option<&BotConfig> {
        self.bots.iter().find(|bot| bot.bot_name == name)
    }
}

/// 一個 bot 的完整設定：要呼叫哪個代理、起始提示，以及可選的任務清單。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// 顯示在標題上的名稱。
    pub bot_name: String,
    /// 代理在執行環境中的名稱，缺少 ID 時用它反查。
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_alias_id: Option<String>,
    /// 輸入框的提示文字。
    #[serde(default)]
    pub start_prompt: String,
    /// YAML 任務檔的路徑（可選）。
    #[serde(default)]
    pub tasks: Option<PathBuf>,
    /// 代入任務描述中 `{key}` 佔位符的值。
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// 附加在任務提示最後的額外指示。
    #[serde(default)]
    pub additional_instructions: Option<String>,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
    /// 每次呼叫都會傳送的 session 屬性。
    #[serde(default)]
    pub session_attributes: Option<BTreeMap<String, String>>,
    /// 提供給提示範本使用的 session 屬性。
    #[serde(default)]
    pub prompt_session_attributes: Option<BTreeMap<String, String>>,
}

impl BotConfig {
    #[cfg(test)]
    pub fn named(bot_name: &str) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            agent_name: None,
            agent_id: Some("AGENT".into()),
            agent_alias_id: Some("ALIAS".into()),
            start_prompt: String::new(),
            tasks: None,
            inputs: BTreeMap::new(),
            additional_instructions: None,
            processing_mode: ProcessingMode::default(),
            session_attributes: None,
            prompt_session_attributes: None,
        }
    }

    /// 回傳代理 ID 與別名 ID；任一缺少時回傳錯誤。
    pub fn agent_target(&self) -> Result<(&str, &str)> {
        let agent_id = self
            .agent_id
            .as_deref()
            .ok_or_else(|| anyhow!("bot {} 尚未設定 agent_id", self.bot_name))?;
        let alias_id = self
            .agent_alias_id
            .as_deref()
            .ok_or_else(|| anyhow!("bot {} 尚未設定 agent_alias_id", self.bot_name))?;
        Ok((agent_id, alias_id))
    }

    /// 建構要隨請求傳送的 session 狀態。
    /// 只有設定了 `session_attributes` 時才會回傳值。
    pub fn session_state(&self) -> Option<SessionState> {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let expand = |attrs: &BTreeMap<String, String>| {
            attrs
                .iter()
                .map(|(key, value)| (key.clone(), value.replace(TODAYS_DATE, &today)))
                .collect::<BTreeMap<_, _>>()
        };
        let session_attributes = self.session_attributes.as_ref()?;
        Some(SessionState {
            session_attributes: expand(session_attributes),
            prompt_session_attributes: self.prompt_session_attributes.as_ref().map(expand),
        })
    }
}

/// 與代理執行環境通訊的方式。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeTransport {
    /// 透過 HTTP 取得 NDJSON 事件串流。
    HttpApi(HttpApiConfig),
    /// 透過本地子程序的 stdout 取得 NDJSON 事件串流。
    LocalProcess(LocalProcessConfig),
}

impl RuntimeTransport {
    fn normalize_paths(&mut self, workspace_root: &Path) {
        match self {
            RuntimeTransport::HttpApi(_) => {}
            RuntimeTransport::LocalProcess(config) => config.normalize(workspace_root),
        }
    }
}

/// 查詢代理中繼資料的方式。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryConfig {
    /// 透過代理管理 API 查詢。
    HttpApi(HttpApiConfig),
    /// 直接使用設定檔中的對照表。
    Static(StaticDirectoryConfig),
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig::Static(StaticDirectoryConfig::default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDirectoryConfig {
    #[serde(default)]
    pub agents: Vec<StaticAgent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticAgent {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub agent_alias_id: Option<String>,
}

/// 本地程序執行環境的設定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProcessConfig {
    /// 要執行的程式。
    pub program: String,
    /// 傳遞給程式的命令列參數。
    #[serde(default)]
    pub args: Vec<String>,
    /// 程式的工作目錄。相對路徑以工作區根目錄為基準。
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// 為子程序設定的額外環境變數。
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LocalProcessConfig {
    fn normalize(&mut self, workspace_root: &Path) {
        if let Some(dir) = self.working_dir.as_mut()
            && dir.is_relative()
        {
            *dir = workspace_root.join(&dir);
        }
        // 指向工作區內既有檔案的相對路徑參數轉為絕對路徑。
        self.args = self
            .args
            .iter()
            .map(|arg| {
                let path = Path::new(arg);
                if path.is_relative() {
                    let candidate = workspace_root.join(path);
                    if candidate.exists() {
                        candidate.to_string_lossy().into()
                    } else {
                        arg.clone()
                    }
                } else {
                    arg.clone()
                }
            })
            .collect();
    }
}

/// HTTP API 的設定，執行環境與代理目錄共用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpApiConfig {
    /// API 的基礎 URL，例如 `https://gateway.example.com`。
    pub endpoint: String,
    /// 直接在設定中指定的 API 金鑰。
    #[serde(default)]
    pub api_key: Option<String>,
    /// 用於讀取 API 金鑰的環境變數名稱。
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// 附加到請求中的額外 HTTP 標頭。
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

impl HttpApiConfig {
    /// 解析並回傳最終的 API 金鑰。
    /// 優先順序：`api_key` 欄位 > `api_key_env` 環境變數。
    pub fn resolved_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            Some(key.clone())
        } else if let Some(var) = &self.api_key_env {
            env::var(var).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_bot = "Marketing Advisor"

[runtime]
kind = "http_api"
endpoint = "https://agents.example.com"
api_key_env = "RELAY_TEST_KEY"

[directory]
kind = "static"
agents = [
    { agent_id = "QJMXEANC52", agent_name = "startup_advisor", agent_alias_id = "NNBOKSII5Q" },
]

[[bots]]
bot_name = "Energy Agent"
agent_id = "ADSSKE7HGL"
agent_alias_id = "CUTZ6N2T2A"
start_prompt = "Ask about energy consumption"

[[bots]]
bot_name = "Marketing Advisor"
agent_name = "startup_advisor"
tasks = "config/tasks.yaml"
processing_mode = "sequential"
inputs = { web_domain = "flyingCars.com" }

[[bots]]
bot_name = "Mortgages Assistant"
agent_name = "mortgages_assistant"
session_attributes = { customer_id = "123456", todays_date = "{todays_date}" }
prompt_session_attributes = { customer_preferred_name = "Mark" }
"#;

    fn settings() -> RelaySettings {
        RelaySettings::parse(SAMPLE, Path::new("/workspace")).unwrap()
    }

    #[test]
    fn parses_bots_and_transports() {
        let settings = settings();
        assert_eq!(settings.bots.len(), 3);
        assert!(matches!(settings.runtime, RuntimeTransport::HttpApi(_)));
        let DirectoryConfig::Static(directory) = &settings.directory else {
            panic!("expected a static directory");
        };
        assert_eq!(directory.agents[0].agent_name, "startup_advisor");
    }

    #[test]
    fn relative_task_paths_are_anchored_to_workspace() {
        let settings = settings();
        let bot = settings.bot("Marketing Advisor").unwrap();
        assert_eq!(bot.tasks.as_deref(), Some(Path::new("/workspace/config/tasks.yaml")));
        assert_eq!(bot.processing_mode, ProcessingMode::Sequential);
        assert_eq!(bot.inputs["web_domain"], "flyingCars.com");
    }

    #[test]
    fn processing_mode_defaults_to_parallel() {
        let settings = settings();
        let bot = settings.bot("Energy Agent").unwrap();
        assert_eq!(bot.processing_mode, ProcessingMode::AllowParallel);
    }

    #[test]
    fn bot_selection_falls_back_in_order() {
        let settings = settings();
        assert_eq!(
            settings.select_bot(Some("Energy Agent")).unwrap().bot_name,
            "Energy Agent"
        );
        assert_eq!(
            settings.select_bot(Some("Unknown")).unwrap().bot_name,
            "Marketing Advisor"
        );
        assert_eq!(settings.select_bot(None).unwrap().bot_name, "Marketing Advisor");
    }

    #[test]
    fn session_state_expands_todays_date() {
        let settings = settings();
        let state = settings
            .bot("Mortgages Assistant")
            .unwrap()
            .session_state()
            .unwrap();
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(state.session_attributes["todays_date"], today);
        assert_eq!(state.session_attributes["customer_id"], "123456");
        assert_eq!(
            state.prompt_session_attributes.unwrap()["customer_preferred_name"],
            "Mark"
        );
        assert!(settings.bot("Energy Agent").unwrap().session_state().is_none());
    }

    #[test]
    fn agent_target_requires_both_ids() {
        let settings = settings();
        assert_eq!(
            settings.bot("Energy Agent").unwrap().agent_target().unwrap(),
            ("ADSSKE7HGL", "CUTZ6N2T2A")
        );
        assert!(settings.bot("Mortgages Assistant").unwrap().agent_target().is_err());
    }

    #[test]
    fn empty_bot_list_is_rejected() {
        let raw = "[runtime]\nkind = \"local_process\"\nprogram = \"cat\"\n";
        assert!(RelaySettings::parse(raw, Path::new("/workspace")).is_err());
    }
}
