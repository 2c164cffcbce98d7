use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::agent::config::{BotConfig, DirectoryConfig, RelaySettings, RuntimeTransport};
use crate::agent::message::InvocationRequest;
use crate::agent::prompt::{build_prompt, load_tasks};
use crate::agent::providers::{
    self, AgentDirectory, AgentRuntime, directory::StaticDirectory,
};
use crate::agent::session::{ConversationId, SessionStore};
use crate::trace::{Invocation, TraceSink};

/// Custom error types for the relay manager.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("No bot named {0} is configured")]
    UnknownBot(String),
    #[error("Unknown conversation {0:?}")]
    UnknownConversation(ConversationId),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The core manager for the relay lifecycle.
///
/// `RelayManager` is responsible for:
/// - Loading `RelaySettings` and filling in agent ids the settings leave out.
/// - Instantiating the agent runtime and directory named by the settings.
/// - Opening sessions for a bot and turning user turns into `Invocation`s.
pub struct RelayManager {
    workspace_root: PathBuf,
    settings: RelaySettings,
    /// A trait object for the concrete runtime (HTTP gateway, local process).
    runtime: Box<dyn AgentRuntime>,
    /// Resolves agent ids to display names while streaming.
    directory: Box<dyn AgentDirectory>,
}

impl RelayManager {
    /// Initializes the relay.
    ///
    /// Loads the settings from the workspace, builds the runtime and directory
    /// and resolves bots that were configured by agent name only.
    pub async fn bootstrap(workspace_root: PathBuf) -> Result<Self, RelayError> {
        let settings = RelaySettings::load(&workspace_root)?;
        let runtime = instantiate_runtime(&settings.runtime, &workspace_root)?;
        let directory = instantiate_directory(&settings.directory)?;
        let mut manager = Self::from_parts(workspace_root, settings, runtime, directory);
        manager.resolve_bot_ids().await;
        Ok(manager)
    }

    pub fn from_parts(
        workspace_root: PathBuf,
        settings: RelaySettings,
        runtime: Box<dyn AgentRuntime>,
        directory: Box<dyn AgentDirectory>,
    ) -> Self {
        Self {
            workspace_root,
            settings,
            runtime,
            directory,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Returns the name of the active runtime.
    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    /// Returns a list of all configured bots.
    pub fn bots(&self) -> &[BotConfig] {
        &self.settings.bots
    }

    /// Refreshes agent and alias ids through the directory.
    ///
    /// A bot with an `agent_name` always takes the directory's current id and
    /// latest alias, so stale ids in the settings are replaced. When either
    /// lookup fails the configured ids are kept. A bot that still lacks ids
    /// afterwards stays listed; invoking it fails with a descriptive error
    /// instead of aborting startup.
    pub async fn resolve_bot_ids(&mut self) {
        for bot in &mut self.settings.bots {
            let Some(agent_name) = bot.agent_name.as_deref() else {
                if bot.agent_id.is_none() {
                    warn!("Bot {} has neither agent_id nor agent_name", bot.bot_name);
                } else if bot.agent_alias_id.is_none()
                    && let Some(agent_id) = bot.agent_id.as_deref()
                {
                    bot.agent_alias_id = latest_alias(self.directory.as_ref(), agent_id).await;
                }
                continue;
            };

            let agent_id = match self.directory.find_agent_id(agent_name).await {
                Ok(Some(agent_id)) => agent_id,
                Ok(None) => {
                    warn!("Agent {} not found in directory, keeping configured ids", agent_name);
                    continue;
                }
                Err(err) => {
                    warn!("Failed to look up agent {}: {:#}", agent_name, err);
                    continue;
                }
            };
            let Some(alias_id) = latest_alias(self.directory.as_ref(), &agent_id).await else {
                continue;
            };
            info!(
                "Resolved agent {} to id {} with alias {}",
                agent_name, agent_id, alias_id
            );
            bot.agent_id = Some(agent_id);
            bot.agent_alias_id = Some(alias_id);
        }
    }

    /// Opens a session for the requested bot, falling back to the default.
    ///
    /// The bot's task file, if any, is loaded once here and reused for every
    /// turn of the session.
    pub fn open_session(&self, requested: Option<&str>) -> Result<SessionStore, RelayError> {
        if let Some(name) = requested
            && self.settings.bot(name).is_none()
        {
            warn!("Bot {} is not configured, using the default bot", name);
        }
        let bot = self
            .settings
            .select_bot(requested)
            .cloned()
            .ok_or_else(|| RelayError::UnknownBot(requested.unwrap_or_default().to_string()))?;
        let tasks = match bot.tasks.as_deref() {
            Some(path) => load_tasks(path, &bot.inputs)?,
            None => Vec::new(),
        };
        info!("Opened session for {} with {} tasks", bot.bot_name, tasks.len());
        Ok(SessionStore::new(bot, tasks))
    }

    /// Builds the request for one user turn.
    ///
    /// Bots with a task list send the task prompt in place of the typed text.
    pub fn build_request(
        &self,
        store: &SessionStore,
        input_text: &str,
    ) -> Result<InvocationRequest, RelayError> {
        let bot = store.bot();
        let (agent_id, agent_alias_id) = bot.agent_target()?;
        let input_text = if store.tasks().is_empty() {
            input_text.to_string()
        } else {
            build_prompt(
                store.tasks(),
                bot.additional_instructions.as_deref(),
                bot.processing_mode,
            )
        };
        Ok(InvocationRequest {
            agent_id: agent_id.to_string(),
            agent_alias_id: agent_alias_id.to_string(),
            session_id: store.session_id().to_string(),
            input_text,
            session_state: bot.session_state(),
            enable_trace: true,
        })
    }

    /// Sends one user turn to the runtime and returns the stream assembler.
    ///
    /// The conversation must already have been appended to `store`; it
    /// remains there whatever happens to the stream.
    pub async fn invoke_agent<'a>(
        &'a self,
        store: &'a mut SessionStore,
        conversation: ConversationId,
        input_text: &str,
        sink: &'a mut dyn TraceSink,
    ) -> Result<Invocation<'a>, RelayError> {
        if store.conversation(conversation).is_none() {
            return Err(RelayError::UnknownConversation(conversation));
        }
        let request = self.build_request(store, input_text)?;
        info!(
            "Invoking agent {} ({}) via {}",
            request.agent_id,
            store.bot().bot_name,
            self.runtime.name()
        );
        let events = self.runtime.invoke(request).await?;
        Ok(Invocation::new(
            events,
            self.directory.as_ref(),
            store,
            conversation,
            sink,
        ))
    }
}

/// 查詢代理的最新別名；查無結果或失敗時記錄警告並回傳 `None`。
async fn latest_alias(directory: &dyn AgentDirectory, agent_id: &str) -> Option<String> {
    match directory.latest_alias_id(agent_id).await {
        Ok(Some(alias_id)) => Some(alias_id),
        Ok(None) => {
            warn!("Agent {} has no alias", agent_id);
            None
        }
        Err(err) => {
            warn!("Failed to look up aliases of {}: {:#}", agent_id, err);
            None
        }
    }
}

/// Maps the runtime settings to a concrete `AgentRuntime` implementation.
fn instantiate_runtime(
    transport: &RuntimeTransport,
    workspace_root: &Path,
) -> anyhow::Result<Box<dyn AgentRuntime>> {
    match transport {
        RuntimeTransport::HttpApi(config) => {
            let runtime = providers::http::HttpRuntime::new(config.clone())?;
            Ok(Box::new(runtime))
        }
        RuntimeTransport::LocalProcess(config) => {
            let runtime =
                providers::local_process::LocalProcessRuntime::new(config.clone(), workspace_root);
            Ok(Box::new(runtime))
        }
    }
}

/// Maps the directory settings to a concrete `AgentDirectory` implementation.
fn instantiate_directory(config: &DirectoryConfig) -> anyhow::Result<Box<dyn AgentDirectory>> {
    match config {
        DirectoryConfig::HttpApi(config) => {
            let directory = providers::http::HttpDirectory::new(config.clone())?;
            Ok(Box::new(directory))
        }
        DirectoryConfig::Static(config) => Ok(Box::new(StaticDirectory::new(config.clone()))),
    }
}
