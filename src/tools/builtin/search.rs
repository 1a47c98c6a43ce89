//! Naver open search tool for the Researcher worker.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::NaverConfig;
use crate::context::CycleContext;
use crate::tools::tool::{Tool, ToolError, ToolOutput, optional_str, require_str};

const SEARCH_KINDS: &[&str] = &["news", "blog", "webkr", "kin", "doc"];
const DEFAULT_KIND: &str = "kin";
const DISPLAY: u32 = 5;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("HTML_TAG is a compile-time constant"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    description: Option<String>,
}

/// Searches Naver and returns the result descriptions as one block of text.
pub struct NaverSearchTool {
    client: reqwest::Client,
    config: NaverConfig,
}

impl NaverSearchTool {
    pub fn new(config: NaverConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Tool for NaverSearchTool {
    fn name(&self) -> &str {
        "naver_search"
    }

    fn description(&self) -> &str {
        "Search the web with Naver and return a short summary of the top results. \
         Use for facts, news, or anything needing up-to-date information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "kind": {
                    "type": "string",
                    "enum": SEARCH_KINDS,
                    "description": "Result source (default: kin)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &CycleContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let query = require_str(&params, "query")?;
        let kind = optional_str(&params, "kind").unwrap_or(DEFAULT_KIND);
        if !SEARCH_KINDS.contains(&kind) {
            return Err(ToolError::InvalidParameters(format!(
                "unknown search kind '{kind}'"
            )));
        }

        tracing::info!(session_id = %ctx.session_id, kind, query, "Naver search");

        let url = format!("{}/{}.json", self.config.base_url.trim_end_matches('/'), kind);
        let display = DISPLAY.to_string();
        let response = self
            .client
            .get(&url)
            .header("X-Naver-Client-Id", &self.config.client_id)
            .header(
                "X-Naver-Client-Secret",
                self.config.client_secret.expose_secret(),
            )
            .query(&[
                ("query", query),
                ("display", display.as_str()),
                ("start", "1"),
                ("sort", "date"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ToolError::NotAuthorized("naver search".to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ToolError::RateLimited);
        }
        if !status.is_success() {
            return Err(ToolError::ExternalService(format!(
                "naver search returned {status}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExternalService(format!("bad search response: {e}")))?;

        Ok(ToolOutput::text(render_results(&body), start.elapsed()))
    }
}

fn render_results(body: &SearchResponse) -> String {
    let descriptions: Vec<String> = body
        .items
        .iter()
        .filter_map(|item| item.description.as_deref())
        .map(|d| HTML_TAG.replace_all(d, "").trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();

    if descriptions.is_empty() {
        "❌ 검색 결과를 찾을 수 없습니다. 다른 검색어를 시도해보세요.".to_string()
    } else {
        format!(
            "✅ 검색이 완료되었습니다!\n\n🔍 검색 결과:\n{}",
            descriptions.join(" ")
        )
    }
}
