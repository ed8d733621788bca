use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::model::TargetRecord;

/// Object types exposed by the target API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Host,
    Service,
    Downtime,
    Comment,
    User,
    UserGroup,
    Notification,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Service => "Service",
            Self::Downtime => "Downtime",
            Self::Comment => "Comment",
            Self::User => "User",
            Self::UserGroup => "UserGroup",
            Self::Notification => "Notification",
        }
    }

    /// URL collection name, e.g. `hosts`.
    pub fn plural(self) -> &'static str {
        match self {
            Self::Host => "hosts",
            Self::Service => "services",
            Self::Downtime => "downtimes",
            Self::Comment => "comments",
            Self::User => "users",
            Self::UserGroup => "usergroups",
            Self::Notification => "notifications",
        }
    }

    /// Prefix used for the object's own fields in filter expressions.
    pub fn filter_prefix(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Service => "service",
            Self::Downtime => "downtime",
            Self::Comment => "comment",
            Self::User => "user",
            Self::UserGroup => "usergroup",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Eq(String, Value),
    IsNull(String),
    NotNull(String),
    /// Shell-style glob against a string field.
    Glob(String, String),
}

impl Clause {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq(f, _) | Self::IsNull(f) | Self::NotNull(f) | Self::Glob(f, _) => f,
        }
    }
}

/// A conjunction of clauses over dotted field paths such as `host.name`.
///
/// Values are always passed out of band as filter variables, never spliced
/// into the expression text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.to_string(), value.into()));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.clauses.push(Clause::IsNull(field.to_string()));
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.clauses.push(Clause::NotNull(field.to_string()));
        self
    }

    pub fn glob(mut self, field: &str, pattern: &str) -> Self {
        self.clauses
            .push(Clause::Glob(field.to_string(), pattern.to_string()));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render as an API filter expression plus its variables.
    pub fn render(&self) -> Option<(String, Map<String, Value>)> {
        if self.clauses.is_empty() {
            return None;
        }
        let mut vars = Map::new();
        let parts: Vec<String> = self
            .clauses
            .iter()
            .enumerate()
            .map(|(i, clause)| {
                let var = format!("v{i}");
                match clause {
                    Clause::Eq(field, value) => {
                        vars.insert(var.clone(), value.clone());
                        format!("{field}=={var}")
                    }
                    Clause::IsNull(field) => format!("{field}==null"),
                    Clause::NotNull(field) => format!("{field}!=null"),
                    Clause::Glob(field, pattern) => {
                        vars.insert(var.clone(), Value::String(pattern.clone()));
                        format!("match({var},{field})")
                    }
                }
            })
            .collect();
        Some((parts.join(" && "), vars))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub object_type: ObjectType,
    pub filter: Filter,
    pub attrs: Vec<String>,
    pub joins: Vec<String>,
}

impl Query {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            filter: Filter::new(),
            attrs: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn attrs(mut self, attrs: &[&str]) -> Self {
        self.attrs = attrs.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn joins(mut self, joins: &[&str]) -> Self {
        self.joins = joins.iter().map(|j| j.to_string()).collect();
        self
    }

    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        if let Some((filter, vars)) = self.filter.render() {
            body.insert("filter".into(), Value::String(filter));
            body.insert("filter_vars".into(), Value::Object(vars));
        }
        if !self.attrs.is_empty() {
            body.insert("attrs".into(), json!(self.attrs));
        }
        if !self.joins.is_empty() {
            body.insert("joins".into(), json!(self.joins));
        }
        Value::Object(body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DowntimeRequest {
    pub object_type: ObjectType,
    pub filter: Filter,
    pub author: String,
    pub comment: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub fixed: bool,
}

impl DowntimeRequest {
    pub fn to_body(&self) -> Value {
        let mut body = action_body(self.object_type, &self.filter);
        body.insert("author".into(), json!(self.author));
        body.insert("comment".into(), json!(self.comment));
        body.insert("start_time".into(), json!(self.start_time));
        body.insert("end_time".into(), json!(self.end_time));
        body.insert("duration".into(), json!(self.duration));
        body.insert("fixed".into(), json!(self.fixed));
        Value::Object(body)
    }
}

/// Common `type`/`filter`/`filter_vars` head of every action body.
pub fn action_body(object_type: ObjectType, filter: &Filter) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("type".into(), json!(object_type.as_str()));
    if let Some((expr, vars)) = filter.render() {
        body.insert("filter".into(), Value::String(expr));
        body.insert("filter_vars".into(), Value::Object(vars));
    }
    body
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub code: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ActionResult {
    pub fn ok(name: &str, status: impl Into<String>) -> Self {
        Self {
            code: 200.0,
            status: status.into(),
            name: Some(name.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200.0..300.0).contains(&self.code)
    }
}

/// Per-object results of a mutating call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub results: Vec<ActionResult>,
}

impl ActionResponse {
    pub fn single(code: u16, status: impl Into<String>) -> Self {
        Self {
            results: vec![ActionResult {
                code: f64::from(code),
                status: status.into(),
                name: None,
            }],
        }
    }

    /// True when the call matched something and every match succeeded.
    pub fn is_success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(ActionResult::is_success)
    }

    pub fn describe(&self) -> String {
        if self.results.is_empty() {
            return "no objects matched".into();
        }
        self.results
            .iter()
            .map(|r| format!("{}: {}", r.code, r.status))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The modern system's object store.
///
/// Mutations return the store's per-object verdict; an `Err` means the
/// request itself could not be completed.
pub trait TargetStore {
    fn query(&self, query: &Query) -> Result<Vec<TargetRecord>>;

    fn update(
        &self,
        object_type: ObjectType,
        name: &str,
        attrs: Map<String, Value>,
    ) -> Result<ActionResponse>;

    fn schedule_downtime(&self, request: &DowntimeRequest) -> Result<ActionResponse>;

    fn acknowledge(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        author: &str,
        comment: &str,
    ) -> Result<ActionResponse>;

    fn add_comment(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        author: &str,
        comment: &str,
    ) -> Result<ActionResponse>;

    fn remove_comment(&self, filter: &Filter) -> Result<ActionResponse>;

    fn remove_downtime(&self, filter: &Filter) -> Result<ActionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_renders_values_as_variables() {
        let filter = Filter::new()
            .eq("host.name", "web1")
            .is_null("service.name")
            .glob("downtime.comment", "* [migrated]");
        let (expr, vars) = filter.render().unwrap();
        assert_eq!(
            expr,
            "host.name==v0 && service.name==null && match(v2,downtime.comment)"
        );
        assert_eq!(vars.get("v0"), Some(&json!("web1")));
        assert_eq!(vars.get("v2"), Some(&json!("* [migrated]")));
        assert!(!vars.contains_key("v1"));
    }

    #[test]
    fn query_body_carries_attrs_and_joins() {
        let body = Query::new(ObjectType::Notification)
            .attrs(&["host_name", "users"])
            .joins(&["host.name"])
            .to_body();
        assert_eq!(
            body,
            json!({"attrs": ["host_name", "users"], "joins": ["host.name"]})
        );
    }

    #[test]
    fn empty_filter_renders_nothing() {
        assert_eq!(Filter::new().render(), None);
        let body = Query::new(ObjectType::Host).to_body();
        assert_eq!(body, json!({}));
    }

    #[test]
    fn empty_response_is_not_success() {
        assert!(!ActionResponse::default().is_success());
        assert!(ActionResponse::single(200, "ok").is_success());
        assert!(!ActionResponse::single(409, "conflict").is_success());
        assert_eq!(ActionResponse::default().describe(), "no objects matched");
    }

    #[test]
    fn downtime_body_carries_window() {
        let request = DowntimeRequest {
            object_type: ObjectType::Host,
            filter: Filter::new().eq("host.name", "web1"),
            author: "ops".into(),
            comment: "patching [migrated]".into(),
            start_time: 10,
            end_time: 20,
            duration: 10,
            fixed: true,
        };
        let body = request.to_body();
        assert_eq!(body["type"], "Host");
        assert_eq!(body["filter"], "host.name==v0");
        assert_eq!(body["fixed"], true);
        assert_eq!(body["end_time"], 20);
    }
}
