//! Kakao talk calendar tools for the Calendar worker.
//!
//! Four tools share one HTTP client: create, get, update and delete. Event
//! bodies go out as a JSON string in the `event` form field, which is what
//! the Kakao API expects.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::config::KakaoConfig;
use crate::context::CycleContext;
use crate::tools::tool::{Tool, ToolError, ToolOutput, optional_str, require_str};

/// Thin client over the Kakao calendar REST API.
pub struct KakaoCalendarClient {
    http: reqwest::Client,
    config: KakaoConfig,
}

impl KakaoCalendarClient {
    pub fn new(config: KakaoConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn create(&self, event: &Value) -> Result<Value, ToolError> {
        let form = [("event", event.to_string())];
        let request = self.http.post(self.url("create/event")).form(&form);
        self.send(request, "create").await
    }

    async fn get(&self, event_id: &str) -> Result<Value, ToolError> {
        let request = self
            .http
            .get(self.url("event"))
            .query(&[("event_id", event_id)]);
        self.send(request, "get").await
    }

    async fn update(&self, event_id: &str, event: &Value) -> Result<Value, ToolError> {
        let form = [
            ("event_id", event_id.to_string()),
            ("event", event.to_string()),
        ];
        let request = self.http.post(self.url("update/event/host")).form(&form);
        self.send(request, "update").await
    }

    async fn delete(&self, event_id: &str) -> Result<Value, ToolError> {
        let request = self
            .http
            .delete(self.url("delete/event"))
            .query(&[("event_id", event_id)]);
        self.send(request, "delete").await
    }

    async fn send(&self, request: reqwest::RequestBuilder, op: &str) -> Result<Value, ToolError> {
        let response = request
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ToolError::NotAuthorized(format!("kakao calendar {op}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ToolError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::ExternalService(format!(
                "kakao calendar {op} returned {status}: {body}"
            )));
        }

        // Delete answers with an empty or tiny body; treat unparseable as `null`.
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// All calendar tools bound to one client.
pub fn calendar_tools(config: KakaoConfig) -> Vec<Arc<dyn Tool>> {
    let client = Arc::new(KakaoCalendarClient::new(config));
    vec![
        Arc::new(CreateEventTool::new(Arc::clone(&client))),
        Arc::new(GetEventTool::new(Arc::clone(&client))),
        Arc::new(UpdateEventTool::new(Arc::clone(&client))),
        Arc::new(DeleteEventTool::new(client)),
    ]
}

fn parse_time(params: &Value, key: &str) -> Result<Option<DateTime<FixedOffset>>, ToolError> {
    optional_str(params, key)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw).map_err(|e| {
                ToolError::InvalidParameters(format!(
                    "'{key}' must be ISO 8601 (YYYY-MM-DDTHH:MM:SSZ): {e}"
                ))
            })
        })
        .transpose()
}

fn check_order(
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
) -> Result<(), ToolError> {
    if let (Some(start), Some(end)) = (start, end)
        && end <= start
    {
        return Err(ToolError::InvalidParameters(
            "end_at must be after start_at".to_string(),
        ));
    }
    Ok(())
}

fn event_id_of(response: &Value) -> Option<&str> {
    response.get("event_id").and_then(|v| v.as_str())
}

/// Creates a new calendar event.
pub struct CreateEventTool {
    client: Arc<KakaoCalendarClient>,
}

impl CreateEventTool {
    pub fn new(client: Arc<KakaoCalendarClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Create a new event in the user's Kakao calendar. Times must be absolute \
         ISO 8601 timestamps; convert relative expressions like '내일 오후 2시' first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Event title"},
                "start_at": {"type": "string", "description": "Start time, ISO 8601"},
                "end_at": {"type": "string", "description": "End time, ISO 8601"},
                "description": {"type": "string", "description": "Event details"}
            },
            "required": ["title", "start_at", "end_at"]
        })
    }

    async fn execute(&self, params: Value, ctx: &CycleContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let title = require_str(&params, "title")?;
        let start_at = require_str(&params, "start_at")?;
        let end_at = require_str(&params, "end_at")?;
        let description = optional_str(&params, "description").unwrap_or_default();
        check_order(
            parse_time(&params, "start_at")?,
            parse_time(&params, "end_at")?,
        )?;

        let event = json!({
            "title": title,
            "time": {"start_at": start_at, "end_at": end_at},
            "description": description,
        });
        let response = self.client.create(&event).await?;
        let event_id = event_id_of(&response).ok_or_else(|| {
            ToolError::ExternalService("create response carried no event_id".to_string())
        })?;

        tracing::info!(session_id = %ctx.session_id, event_id, "Calendar event created");
        Ok(ToolOutput::text(
            format!(
                "✅ 일정이 성공적으로 등록되었습니다!\n\n📅 제목: {title}\n🕐 시간: {start_at} ~ {end_at}\n🆔 이벤트 ID: {event_id}"
            ),
            start.elapsed(),
        ))
    }
}

/// Fetches one event's details.
pub struct GetEventTool {
    client: Arc<KakaoCalendarClient>,
}

impl GetEventTool {
    pub fn new(client: Arc<KakaoCalendarClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetEventTool {
    fn name(&self) -> &str {
        "get_calendar_event"
    }

    fn description(&self) -> &str {
        "Look up the details of a calendar event by its event ID."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string", "description": "Event ID"}
            },
            "required": ["event_id"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &CycleContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let event_id = require_str(&params, "event_id")?;
        let response = self.client.get(event_id).await?;
        Ok(ToolOutput::success(response, start.elapsed()))
    }
}

/// Edits fields of an existing event.
pub struct UpdateEventTool {
    client: Arc<KakaoCalendarClient>,
}

impl UpdateEventTool {
    pub fn new(client: Arc<KakaoCalendarClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for UpdateEventTool {
    fn name(&self) -> &str {
        "update_calendar_event"
    }

    fn description(&self) -> &str {
        "Update an existing calendar event. Only the fields given are changed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string", "description": "Event ID"},
                "title": {"type": "string"},
                "description": {"type": "string"},
                "start_at": {"type": "string", "description": "New start time, ISO 8601"},
                "end_at": {"type": "string", "description": "New end time, ISO 8601"}
            },
            "required": ["event_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &CycleContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let event_id = require_str(&params, "event_id")?;
        let event = update_payload(&params)?;

        self.client.update(event_id, &event).await?;
        tracing::info!(session_id = %ctx.session_id, event_id, "Calendar event updated");
        Ok(ToolOutput::text(
            format!("✅ 일정이 수정되었습니다. (이벤트 ID: {event_id})"),
            start.elapsed(),
        ))
    }
}

fn update_payload(params: &Value) -> Result<Value, ToolError> {
    check_order(parse_time(params, "start_at")?, parse_time(params, "end_at")?)?;

    let mut event = serde_json::Map::new();
    for key in ["title", "description"] {
        if let Some(v) = optional_str(params, key) {
            event.insert(key.to_string(), json!(v));
        }
    }
    let mut time = serde_json::Map::new();
    for key in ["start_at", "end_at"] {
        if let Some(v) = optional_str(params, key) {
            time.insert(key.to_string(), json!(v));
        }
    }
    if !time.is_empty() {
        event.insert("time".to_string(), Value::Object(time));
    }
    if event.is_empty() {
        return Err(ToolError::InvalidParameters(
            "nothing to update; give at least one field".to_string(),
        ));
    }
    Ok(Value::Object(event))
}

/// Removes an event.
pub struct DeleteEventTool {
    client: Arc<KakaoCalendarClient>,
}

impl DeleteEventTool {
    pub fn new(client: Arc<KakaoCalendarClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for DeleteEventTool {
    fn name(&self) -> &str {
        "delete_calendar_event"
    }

    fn description(&self) -> &str {
        "Delete a calendar event by its event ID."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string", "description": "Event ID"}
            },
            "required": ["event_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &CycleContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let event_id = require_str(&params, "event_id")?;
        self.client.delete(event_id).await?;
        tracing::info!(session_id = %ctx.session_id, event_id, "Calendar event deleted");
        Ok(ToolOutput::text(
            format!("✅ 일정이 삭제되었습니다. (이벤트 ID: {event_id})"),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> KakaoConfig {
        KakaoConfig {
            access_token: "token".to_string().into(),
            base_url: "http://127.0.0.1:9/".into(),
        }
    }

    #[test]
    fn builds_four_tools() {
        let tools = calendar_tools(config());
        let mut names: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "create_calendar_event",
                "delete_calendar_event",
                "get_calendar_event",
                "update_calendar_event"
            ]
        );
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = KakaoCalendarClient::new(config());
        assert_eq!(client.url("create/event"), "http://127.0.0.1:9/create/event");
    }

    #[test]
    fn update_payload_only_sets_given_fields() {
        let payload = update_payload(&json!({
            "event_id": "e1",
            "title": "회의",
            "start_at": "2026-10-18T14:00:00+09:00"
        }))
        .unwrap();
        assert_eq!(
            payload,
            json!({"title": "회의", "time": {"start_at": "2026-10-18T14:00:00+09:00"}})
        );
    }

    #[test]
    fn update_payload_requires_a_field() {
        assert!(matches!(
            update_payload(&json!({"event_id": "e1"})),
            Err(ToolError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_bad_times_before_network() {
        let tool = CreateEventTool::new(Arc::new(KakaoCalendarClient::new(config())));
        let ctx = CycleContext::new("s", Duration::from_secs(5));

        let err = tool
            .execute(
                json!({"title": "회의", "start_at": "내일 2시", "end_at": "2026-10-18T15:00:00Z"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        let err = tool
            .execute(
                json!({
                    "title": "회의",
                    "start_at": "2026-10-18T15:00:00Z",
                    "end_at": "2026-10-18T14:00:00Z"
                }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("end_at"));
    }
}
