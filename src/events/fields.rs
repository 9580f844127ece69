use std::path::Path;

use log::debug;
use serde_json::{Map, Number, Value};

use super::Event;

/// Parses `key=value` pairs separated by whitespace or newlines. Values may be
/// quoted; a bare key maps to an empty string.
pub fn parse_fields(contents: &str) -> Result<Map<String, Value>, shell_words::ParseError> {
    let mut fields = Map::new();
    for pair in shell_words::split(contents)? {
        let (key, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
        if key.is_empty() {
            continue;
        }
        fields.insert(key.to_string(), typed_value(value));
    }
    Ok(fields)
}

/// Numbers first, then booleans, otherwise the raw string.
fn typed_value(raw: &str) -> Value {
    if let Some(number) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    match raw {
        "t" | "T" | "true" | "TRUE" | "True" => Value::Bool(true),
        "f" | "F" | "false" | "FALSE" | "False" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// Adds the user's extra fields to `event`. Problems are reported and the
/// event is sent without them.
pub fn add_fields_from_file(path: Option<&Path>, event: &mut Event) {
    let Some(path) = path else {
        return;
    };

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            eprintln!("unable to read {:?}: {e}", path.display().to_string());
            return;
        }
    };

    match parse_fields(&contents) {
        Ok(fields) => {
            debug!("Loaded {} extra fields from {}", fields.len(), path.display());
            event.add_fields(fields);
        }
        Err(e) => eprintln!("problems loading from {:?}: {e}", path.display().to_string()),
    }
}
