pub mod environment;
pub mod fields;
pub mod sink;
pub mod trace_url;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::auth::Token;

pub use environment::{add_provider_fields, ProcessEnv, ProviderKind};
pub use fields::add_fields_from_file;
pub use sink::EventSink;
pub use trace_url::TraceUrlBuilder;

pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io";
pub const DEFAULT_DATASET: &str = "buildevents";

/// A single span, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: Map::new(),
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn add_fields(&mut self, fields: Map<String, Value>) {
        self.fields.extend(fields);
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }
}

/// Where events go and how they are labelled.
#[derive(Debug, Clone)]
pub struct HoneycombSettings {
    pub api_key: Option<Token>,
    pub api_host: String,
    pub dataset: String,
}

impl HoneycombSettings {
    pub fn is_classic(&self) -> bool {
        is_classic(self.api_key.as_ref())
    }

    /// Picks `classic` for 32-character keys, `modern` otherwise.
    pub fn if_classic<'a>(&self, classic: &'a str, modern: &'a str) -> &'a str {
        if self.is_classic() {
            classic
        } else {
            modern
        }
    }
}

/// Classic keys are exactly 32 characters; environment keys are shorter.
pub fn is_classic(api_key: Option<&Token>) -> bool {
    api_key.is_some_and(|key| key.as_str().len() == 32)
}

/// Decides the dataset events are sent to. Returns the dataset and any
/// warnings the caller should surface.
pub fn resolve_dataset(
    api_key: Option<&Token>,
    dataset: Option<&str>,
    service_name: Option<&str>,
) -> (String, Vec<String>) {
    let dataset = dataset.filter(|d| !d.is_empty());
    let service_name = service_name.filter(|s| !s.is_empty());
    let mut warnings = Vec::new();

    if is_classic(api_key) {
        if service_name.is_some() {
            warnings.push("classic mode ignores the service name parameter.".to_string());
        }
        return (dataset.unwrap_or(DEFAULT_DATASET).to_string(), warnings);
    }

    match (service_name, dataset) {
        (Some(service), dataset) => {
            if dataset.is_some() {
                warnings.push("service name was specified, dataset is ignored.".to_string());
            }
            let trimmed = service.trim();
            if trimmed != service {
                warnings.push(format!(
                    "service name contained leading or trailing whitespace, sending to '{trimmed}'."
                ));
            }
            (trimmed.to_string(), warnings)
        }
        (None, Some(dataset)) => {
            warnings.push("dataset is deprecated, please use service_name.".to_string());
            (dataset.to_string(), warnings)
        }
        (None, None) => (DEFAULT_DATASET.to_string(), warnings),
    }
}
