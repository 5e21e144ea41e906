use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use super::google::GoogleClient;
use super::Capability;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

const SERVICE: &str = "Google Calendar";
const DEFAULT_DAYS: i64 = 7;
const MAX_DAYS: i64 = 90;

/// Lists upcoming events from the user's primary calendar
pub struct CalendarEvents {
    tool: Tool,
    client: GoogleClient,
    url: String,
}

impl CalendarEvents {
    pub(crate) fn new(client: GoogleClient, host: &str) -> Self {
        Self {
            tool: Tool::new(
                "calendar_events",
                "List upcoming events on the user's primary Google Calendar.",
                json!({
                    "type": "object",
                    "properties": {
                        "days": {
                            "type": "integer",
                            "description": "How many days ahead to look (default 7)"
                        },
                        "query": {
                            "type": "string",
                            "description": "Optional free text filter"
                        }
                    }
                }),
            ),
            client,
            url: format!(
                "{}/calendar/v3/calendars/primary/events",
                host.trim_end_matches('/')
            ),
        }
    }
}

fn event_time(event: &Value, field: &str) -> Option<String> {
    let time = event.get(field)?;
    time.get("dateTime")
        .or_else(|| time.get("date"))
        .and_then(Value::as_str)
        .map(String::from)
}

#[async_trait]
impl Capability for CalendarEvents {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let days = match arguments.get("days") {
            None | Some(Value::Null) => DEFAULT_DAYS,
            Some(value) => value
                .as_i64()
                .filter(|d| (1..=MAX_DAYS).contains(d))
                .ok_or_else(|| {
                    AgentError::InvalidParameters(format!("days must be between 1 and {}", MAX_DAYS))
                })?,
        };

        let now = Utc::now();
        let mut query = vec![
            ("timeMin", now.to_rfc3339()),
            ("timeMax", (now + Duration::days(days)).to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(text) = arguments.get("query").and_then(Value::as_str) {
            query.push(("q", text.to_string()));
        }

        let listing = self.client.get_json(SERVICE, &self.url, &query).await?;
        let events: Vec<Value> = listing
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|event| {
                        json!({
                            "summary": event.get("summary").and_then(Value::as_str).unwrap_or("(no title)"),
                            "start": event_time(event, "start"),
                            "end": event_time(event, "end"),
                            "location": event.get("location").and_then(Value::as_str),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "days": days, "events": events }))
    }
}
