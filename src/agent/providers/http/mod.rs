use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use log::debug;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::agent::config::HttpApiConfig;
use crate::agent::message::{InvocationRequest, StreamEvent};

use super::ndjson::NdjsonDecoder;
use super::{AgentDirectory, AgentMetadata, AgentRuntime, EventStream};

mod models;

/// 一個輔助結構，用於儲存 HTTP 連線設定，執行環境與代理目錄共用。
#[derive(Clone)]
struct HttpBackendInfo {
    endpoint: String,
    api_key: Option<String>,
    headers: BTreeMap<String, String>,
}

impl HttpBackendInfo {
    fn from_config(config: HttpApiConfig) -> Self {
        let api_key = config.resolved_api_key();
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            headers: config.extra_headers,
        }
    }
}

/// `AgentRuntime` 的 HTTP 實作：送出呼叫後以 NDJSON 逐行讀取事件。
pub struct HttpRuntime {
    info: HttpBackendInfo,
    /// `reqwest` 的非同步 HTTP 客戶端。
    client: Client,
}

impl HttpRuntime {
    /// 根據提供的設定建立一個新的 `HttpRuntime`。
    pub fn new(config: HttpApiConfig) -> Result<Self> {
        Ok(Self {
            info: HttpBackendInfo::from_config(config),
            client: Client::new(),
        })
    }
}

#[async_trait]
impl AgentRuntime for HttpRuntime {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<EventStream> {
        use models::InvokeAgentPayload;

        let url = format!(
            "{}/agents/{}/agentAliases/{}/sessions/{}/text",
            self.info.endpoint, request.agent_id, request.agent_alias_id, request.session_id
        );
        let payload = InvokeAgentPayload {
            input_text: &request.input_text,
            enable_trace: request.enable_trace,
            session_state: request.session_state.as_ref(),
        };
        debug!("Invoking agent {} via {}", request.agent_id, url);

        let response = self
            .client
            .post(url)
            .headers(build_headers(&self.info)?)
            .json(&payload)
            .send()
            .await
            .context("代理執行環境呼叫失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("代理執行環境回應錯誤 ({}): {}", status, text));
        }

        Ok(ndjson_stream(response.bytes_stream()))
    }
}

struct NdjsonStreamState<S> {
    bytes: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

/// 將位元組串流轉為事件串流。傳輸錯誤會作為最後一個項目回傳，之後串流結束。
fn ndjson_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = NdjsonStreamState {
        bytes: Box::pin(bytes),
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    state.done = true;
                    let err = anyhow::Error::new(err).context("讀取事件串流失敗");
                    return Some((Err(err), state));
                }
                None => {
                    state.done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

/// `AgentDirectory` 的 HTTP 實作，查詢代理管理 API。
pub struct HttpDirectory {
    info: HttpBackendInfo,
    client: Client,
}

impl HttpDirectory {
    pub fn new(config: HttpApiConfig) -> Result<Self> {
        Ok(Self {
            info: HttpBackendInfo::from_config(config),
            client: Client::new(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .headers(build_headers(&self.info)?)
            .send()
            .await
            .with_context(|| format!("代理目錄呼叫失敗: {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("代理目錄回應錯誤 ({}): {}", status, text));
        }

        response
            .json()
            .await
            .with_context(|| format!("解析代理目錄回應失敗: {}", url))
    }
}

#[async_trait]
impl AgentDirectory for HttpDirectory {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentMetadata> {
        let url = format!("{}/agents/{}", self.info.endpoint, agent_id);
        let body: models::GetAgentResponse = self.get_json(url).await?;
        Ok(AgentMetadata {
            agent_id: body.agent.agent_id.unwrap_or_else(|| agent_id.to_string()),
            agent_name: body.agent.agent_name,
        })
    }

    async fn find_agent_id(&self, agent_name: &str) -> Result<Option<String>> {
        let url = format!("{}/agents", self.info.endpoint);
        let body: models::ListAgentsResponse = self.get_json(url).await?;
        Ok(body
            .agent_summaries
            .into_iter()
            .find(|summary| summary.agent_name == agent_name)
            .map(|summary| summary.agent_id))
    }

    async fn latest_alias_id(&self, agent_id: &str) -> Result<Option<String>> {
        let url = format!("{}/agents/{}/agentaliases", self.info.endpoint, agent_id);
        let body: models::ListAliasesResponse = self.get_json(url).await?;
        Ok(body
            .agent_alias_summaries
            .into_iter()
            .max_by_key(|alias| alias.updated_at)
            .map(|alias| alias.agent_alias_id))
    }
}

/// 根據連線資訊建構 HTTP 標頭。
fn build_headers(info: &HttpBackendInfo) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(api_key) = &info.api_key {
        let value = format!("Bearer {}", api_key);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value)?);
    }
    for (key, value) in info.headers.iter() {
        let header_name = HeaderName::from_bytes(key.as_bytes())?;
        headers.insert(header_name, HeaderValue::from_str(value)?);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn info() -> HttpBackendInfo {
        let mut extra_headers = BTreeMap::new();
        extra_headers.insert("x-tenant".to_string(), "energy".to_string());
        HttpBackendInfo::from_config(HttpApiConfig {
            endpoint: "https://agents.example.com/".into(),
            api_key: Some("secret".into()),
            api_key_env: None,
            extra_headers,
        })
    }

    #[test]
    fn endpoint_loses_trailing_slash() {
        assert_eq!(info().endpoint, "https://agents.example.com");
    }

    #[test]
    fn headers_carry_auth_and_extras() {
        let headers = build_headers(&info()).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
        assert_eq!(headers["x-tenant"], "energy");
    }

    #[tokio::test]
    async fn byte_chunks_become_events() {
        let chunks: Vec<std::result::Result<Vec<u8>, io::Error>> = vec![
            Ok(b"{\"chunk\":{\"bytes\":\"a\"}}\n{\"chu".to_vec()),
            Ok(b"nk\":{\"bytes\":\"b\"}}".to_vec()),
        ];
        let events: Vec<_> = ndjson_stream(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.is_ok()));
    }

    #[tokio::test]
    async fn transport_error_ends_the_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, io::Error>> = vec![
            Ok(b"{\"chunk\":{\"bytes\":\"a\"}}\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"{\"chunk\":{\"bytes\":\"never\"}}\n".to_vec()),
        ];
        let events: Vec<_> = ndjson_stream(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());
    }
}
