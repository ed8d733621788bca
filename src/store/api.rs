use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::config::TargetSettings;
use crate::error::{MigrateError, Result};
use crate::model::TargetRecord;
use crate::store::target::{
    ActionResponse, DowntimeRequest, Filter, ObjectType, Query, TargetStore, action_body,
};

/// REST client for the target's `/v1` API.
pub struct ApiTarget {
    client: Client,
    base: reqwest::Url,
    username: String,
    password: String,
    retries: u32,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<TargetRecord>,
}

impl ApiTarget {
    pub fn new(settings: &TargetSettings) -> Result<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| MigrateError::Config("target.url is not set".into()))?;
        let base = reqwest::Url::parse(url)
            .map_err(|e| MigrateError::Config(format!("invalid target.url '{url}': {e}")))?;
        if !settings.verify_tls {
            debug!("TLS certificate verification disabled for target");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()?;
        Ok(Self {
            client,
            base,
            username: settings.username.clone(),
            password: settings.password.clone(),
            retries: settings.retries,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| MigrateError::Config(format!("target.url '{}' cannot be a base", self.base)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    /// POST with retries on transport failures.
    ///
    /// HTTP error statuses are returned to the caller, not retried.
    fn post(&self, url: reqwest::Url, body: &Value, as_get: bool) -> Result<(StatusCode, String)> {
        let attempts = self.retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let mut request = self
                .client
                .post(url.clone())
                .basic_auth(&self.username, Some(&self.password))
                .header("Accept", "application/json")
                .json(body);
            if as_get {
                request = request.header("X-HTTP-Method-Override", "GET");
            }
            let outcome = request
                .send()
                .and_then(|response| {
                    let status = response.status();
                    response.text().map(|text| (status, text))
                });
            match outcome {
                Ok(done) => {
                    debug!(url = %url, status = %done.0, attempt, "target request completed");
                    return Ok(done);
                }
                Err(e) if is_transient(&e) => {
                    warn!(url = %url, attempt, attempts, error = %e, "target request failed, retrying");
                    last_error = e.to_string();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MigrateError::StoreExhausted {
            attempts,
            message: last_error,
        })
    }

    fn action(&self, action: &str, body: Value) -> Result<ActionResponse> {
        let url = self.url(&["actions", action])?;
        let (status, text) = self.post(url, &body, false)?;
        parse_action_response(status, &text)
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

fn parse_action_response(status: StatusCode, text: &str) -> Result<ActionResponse> {
    match serde_json::from_str::<ActionResponse>(text) {
        Ok(response) if !response.results.is_empty() || status.is_success() => Ok(response),
        _ if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            Err(MigrateError::Api {
                status: status.as_u16(),
                body: text.to_string(),
            })
        }
        _ => Ok(ActionResponse::single(status.as_u16(), text.trim())),
    }
}

impl TargetStore for ApiTarget {
    fn query(&self, query: &Query) -> Result<Vec<TargetRecord>> {
        let url = self.url(&["objects", query.object_type.plural()])?;
        let (status, text) = self.post(url, &query.to_body(), true)?;
        if status == StatusCode::NOT_FOUND {
            // A filter that matches nothing is reported as 404.
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(MigrateError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        let parsed: QueryResponse = serde_json::from_str(&text)?;
        debug!(object_type = %query.object_type, count = parsed.results.len(), "query returned");
        Ok(parsed.results)
    }

    fn update(
        &self,
        object_type: ObjectType,
        name: &str,
        attrs: Map<String, Value>,
    ) -> Result<ActionResponse> {
        let url = self.url(&["objects", object_type.plural(), name])?;
        let (status, text) = self.post(url, &json!({ "attrs": attrs }), false)?;
        parse_action_response(status, &text)
    }

    fn schedule_downtime(&self, request: &DowntimeRequest) -> Result<ActionResponse> {
        self.action("schedule-downtime", request.to_body())
    }

    fn acknowledge(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        author: &str,
        comment: &str,
    ) -> Result<ActionResponse> {
        let mut body = action_body(object_type, filter);
        body.insert("author".into(), json!(author));
        body.insert("comment".into(), json!(comment));
        self.action("acknowledge-problem", Value::Object(body))
    }

    fn add_comment(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        author: &str,
        comment: &str,
    ) -> Result<ActionResponse> {
        let mut body = action_body(object_type, filter);
        body.insert("author".into(), json!(author));
        body.insert("comment".into(), json!(comment));
        self.action("add-comment", Value::Object(body))
    }

    fn remove_comment(&self, filter: &Filter) -> Result<ActionResponse> {
        self.action(
            "remove-comment",
            Value::Object(action_body(ObjectType::Comment, filter)),
        )
    }

    fn remove_downtime(&self, filter: &Filter) -> Result<ActionResponse> {
        self.action(
            "remove-downtime",
            Value::Object(action_body(ObjectType::Downtime, filter)),
        )
    }
}
