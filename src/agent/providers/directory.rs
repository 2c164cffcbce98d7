use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::agent::config::{StaticAgent, StaticDirectoryConfig};

use super::{AgentDirectory, AgentMetadata};

/// An agent directory backed by the table in the settings file.
pub struct StaticDirectory {
    agents: Vec<StaticAgent>,
}

impl StaticDirectory {
    pub fn new(config: StaticDirectoryConfig) -> Self {
        Self {
            agents: config.agents,
        }
    }

    fn by_id(&self, agent_id: &str) -> Option<&StaticAgent> {
        self.agents.iter().find(|agent| agent.agent_id == agent_id)
    }
}

#[async_trait]
impl AgentDirectory for StaticDirectory {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentMetadata> {
        let agent = self
            .by_id(agent_id)
            .ok_or_else(|| anyhow!("Unknown agent id: {}", agent_id))?;
        Ok(AgentMetadata {
            agent_id: agent.agent_id.clone(),
            agent_name: agent.agent_name.clone(),
        })
    }

    async fn find_agent_id(&self, agent_name: &str) -> Result<Option<String>> {
        Ok(self
            .agents
            .iter()
            .find(|agent| agent.agent_name == agent_name)
            .map(|agent| agent.agent_id.clone()))
    }

    async fn latest_alias_id(&self, agent_id: &str) -> Result<Option<String>> {
        Ok(self
            .by_id(agent_id)
            .and_then(|agent| agent.agent_alias_id.clone()))
    }
}
