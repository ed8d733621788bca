use std::cell::{Cell, RefCell};
use std::path::Path;

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::Result;
use crate::model::TargetRecord;
use crate::normalize::{get_path, glob_regex};
use crate::store::target::{
    ActionResponse, ActionResult, Clause, DowntimeRequest, Filter, ObjectType, Query, TargetStore,
};

/// In-process target store, loaded from an exported object snapshot.
///
/// Evaluates the same filters the API does, closely enough for offline
/// runs and tests. Every successful mutation is counted.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    objects: RefCell<Vec<TargetRecord>>,
    mutations: Cell<usize>,
}

impl MemoryTarget {
    pub fn new(objects: Vec<TargetRecord>) -> Self {
        Self {
            objects: RefCell::new(objects.into_iter().map(with_identity).collect()),
            mutations: Cell::new(0),
        }
    }

    /// Load a JSON array of objects, or an API-style `{"results": [...]}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        let records = match value {
            Value::Object(mut map) if map.contains_key("results") => {
                serde_json::from_value(map.remove("results").unwrap_or_default())?
            }
            other => serde_json::from_value(other)?,
        };
        let store = Self::new(records);
        info!(path = %path.display(), objects = store.objects.borrow().len(), "target snapshot loaded");
        Ok(store)
    }

    pub fn insert(&self, record: TargetRecord) {
        self.objects.borrow_mut().push(record);
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.get()
    }

    pub fn objects_of(&self, object_type: ObjectType) -> Vec<TargetRecord> {
        self.objects
            .borrow()
            .iter()
            .filter(|o| o.object_type == object_type.as_str())
            .cloned()
            .collect()
    }

    fn mutated(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }

    fn matching(&self, object_type: ObjectType, filter: &Filter) -> Result<Vec<TargetRecord>> {
        let objects = self.objects.borrow();
        let mut matched = Vec::new();
        for object in objects.iter().filter(|o| o.object_type == object_type.as_str()) {
            if self.matches(&objects, object, filter)? {
                matched.push(object.clone());
            }
        }
        Ok(matched)
    }

    fn matches(&self, all: &[TargetRecord], object: &TargetRecord, filter: &Filter) -> Result<bool> {
        for clause in filter.clauses() {
            let value = resolve_field(all, object, clause.field());
            let hit = match clause {
                Clause::Eq(_, expected) => value.is_some_and(|v| values_equal(v, expected)),
                Clause::IsNull(_) => value.is_none(),
                Clause::NotNull(_) => value.is_some(),
                Clause::Glob(_, pattern) => {
                    let re = glob_regex(pattern)?;
                    value.and_then(Value::as_str).is_some_and(|s| re.is_match(s))
                }
            };
            if !hit {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Attach joined objects the way the API does for `joins: ["host"]`.
    fn with_joins(&self, mut record: TargetRecord, joins: &[String]) -> TargetRecord {
        let objects = self.objects.borrow();
        for join in joins {
            let object = join.split('.').next().unwrap_or(join);
            if let Some(related) = related_object(&objects, &record, object) {
                let mut attrs = related.attrs.clone();
                attrs
                    .entry("name")
                    .or_insert_with(|| Value::String(related.name.clone()));
                record.joins.insert(object.to_string(), Value::Object(attrs));
            }
        }
        record
    }

    /// Create one object per matched checkable, named `<checkable>!<uuid>`.
    fn create_for(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        kind: ObjectType,
        attrs: impl Fn(&TargetRecord) -> Value,
        status: &str,
    ) -> Result<ActionResponse> {
        let targets = self.matching(object_type, filter)?;
        let mut response = ActionResponse::default();
        for target in &targets {
            let name = format!("{}!{}", target.name, uuid::Uuid::new_v4());
            self.insert(TargetRecord::new(kind.as_str(), &name, attrs(target)));
            self.mutated();
            response.results.push(ActionResult::ok(&target.name, status));
        }
        debug!(action = status, matched = targets.len(), "memory target action");
        Ok(response)
    }

    fn remove(&self, object_type: ObjectType, filter: &Filter, status: &str) -> Result<ActionResponse> {
        let doomed: Vec<String> = self
            .matching(object_type, filter)?
            .into_iter()
            .map(|o| o.name)
            .collect();
        self.objects.borrow_mut().retain(|o| {
            o.object_type != object_type.as_str() || !doomed.contains(&o.name)
        });
        let mut response = ActionResponse::default();
        for name in &doomed {
            self.mutated();
            response.results.push(ActionResult::ok(name, status));
        }
        Ok(response)
    }
}

/// Fill in the `name` and `host_name` attributes the API always reports.
fn with_identity(mut record: TargetRecord) -> TargetRecord {
    let (host, short) = match record.name.split_once('!') {
        Some((host, short)) => (host.to_string(), short.to_string()),
        None => (record.name.clone(), record.name.clone()),
    };
    match record.object_type.as_str() {
        "Host" => {
            record.attrs.entry("name").or_insert(Value::String(short));
        }
        "Service" => {
            record.attrs.entry("name").or_insert(Value::String(short));
            record.attrs.entry("host_name").or_insert(Value::String(host));
        }
        _ => {}
    }
    record
}

fn checkable_attrs(target: &TargetRecord) -> (String, String) {
    match target.object_type.as_str() {
        "Service" => (
            target.host_name().unwrap_or_default().to_string(),
            target
                .attr_str("name")
                .map(str::to_string)
                .unwrap_or_else(|| target.name.rsplit('!').next().unwrap_or_default().to_string()),
        ),
        _ => (target.name.clone(), String::new()),
    }
}

/// Find the object a `<object>.` filter prefix refers to.
fn related_object<'a>(
    all: &'a [TargetRecord],
    record: &TargetRecord,
    object: &str,
) -> Option<&'a TargetRecord> {
    let name = record.attr_str(&format!("{object}_name"))?;
    if name.is_empty() {
        return None;
    }
    match object {
        "host" => all
            .iter()
            .find(|o| o.object_type == "Host" && o.name == name),
        "service" => {
            let host = record.attr_str("host_name")?;
            let full = format!("{host}!{name}");
            all.iter()
                .find(|o| o.object_type == "Service" && o.name == full)
        }
        _ => None,
    }
}

/// Resolve a dotted field such as `host.name` or `downtime.comment`.
///
/// The object's own prefix reads from its attributes; other prefixes read
/// from joins, then from `<object>_name`-style shortcut attributes, then from
/// the related object itself.
fn resolve_field<'a>(
    all: &'a [TargetRecord],
    record: &'a TargetRecord,
    field: &str,
) -> Option<&'a Value> {
    let mut segments = field.split('.');
    let object = segments.next()?;
    let path: Vec<&str> = segments.collect();

    if object.eq_ignore_ascii_case(&record.object_type) {
        return match path.split_first() {
            Some((first, rest)) => get_path(record.attrs.get(*first)?, rest),
            None => None,
        };
    }
    if let Some(joined) = record.joins.get(object)
        && let Some(value) = get_path(joined, &path)
    {
        return Some(value);
    }
    if path.len() == 1 {
        let shortcut = format!("{object}_{}", path[0]);
        if let Some(value) = record.attrs.get(&shortcut)
            && !value.is_null()
            && value.as_str() != Some("")
        {
            return Some(value);
        }
    }
    let related = related_object(all, record, object)?;
    let (first, rest) = path.split_first()?;
    get_path(related.attrs.get(*first)?, rest)
}

/// Equality with numeric coercion, so `10` matches `10.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

impl TargetStore for MemoryTarget {
    fn query(&self, query: &Query) -> Result<Vec<TargetRecord>> {
        let matched = self.matching(query.object_type, &query.filter)?;
        Ok(matched
            .into_iter()
            .map(|record| self.with_joins(record, &query.joins))
            .collect())
    }

    fn update(
        &self,
        object_type: ObjectType,
        name: &str,
        attrs: Map<String, Value>,
    ) -> Result<ActionResponse> {
        let mut objects = self.objects.borrow_mut();
        let Some(object) = objects
            .iter_mut()
            .find(|o| o.object_type == object_type.as_str() && o.name == name)
        else {
            return Ok(ActionResponse::single(404, format!("no {object_type} named '{name}'")));
        };

        for (key, value) in attrs {
            let previous = object.attrs.get(&key).cloned().unwrap_or(Value::Null);
            let originals = object
                .attrs
                .entry("original_attributes")
                .or_insert_with(|| json!({}));
            if !originals.is_object() {
                *originals = json!({});
            }
            if let Some(originals) = originals.as_object_mut() {
                originals.entry(key.clone()).or_insert(previous);
            }
            object.attrs.insert(key, value);
        }
        drop(objects);
        self.mutated();
        Ok(ActionResponse {
            results: vec![ActionResult::ok(name, "Attributes updated.")],
        })
    }

    fn schedule_downtime(&self, request: &DowntimeRequest) -> Result<ActionResponse> {
        self.create_for(
            request.object_type,
            &request.filter,
            ObjectType::Downtime,
            |target| {
                let (host_name, service_name) = checkable_attrs(target);
                json!({
                    "host_name": host_name,
                    "service_name": service_name,
                    "author": request.author,
                    "comment": request.comment,
                    "start_time": request.start_time,
                    "end_time": request.end_time,
                    "duration": request.duration,
                    "fixed": request.fixed,
                })
            },
            "Successfully scheduled downtime",
        )
    }

    fn acknowledge(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        author: &str,
        comment: &str,
    ) -> Result<ActionResponse> {
        self.create_for(
            object_type,
            filter,
            ObjectType::Comment,
            |target| {
                let (host_name, service_name) = checkable_attrs(target);
                json!({
                    "host_name": host_name,
                    "service_name": service_name,
                    "author": author,
                    "text": comment,
                    "entry_type": 4,
                })
            },
            "Successfully acknowledged problem",
        )
    }

    fn add_comment(
        &self,
        object_type: ObjectType,
        filter: &Filter,
        author: &str,
        comment: &str,
    ) -> Result<ActionResponse> {
        self.create_for(
            object_type,
            filter,
            ObjectType::Comment,
            |target| {
                let (host_name, service_name) = checkable_attrs(target);
                json!({
                    "host_name": host_name,
                    "service_name": service_name,
                    "author": author,
                    "text": comment,
                    "entry_type": 1,
                })
            },
            "Successfully added comment",
        )
    }

    fn remove_comment(&self, filter: &Filter) -> Result<ActionResponse> {
        self.remove(ObjectType::Comment, filter, "Successfully removed comment")
    }

    fn remove_downtime(&self, filter: &Filter) -> Result<ActionResponse> {
        self.remove(ObjectType::Downtime, filter, "Successfully removed downtime")
    }
}
