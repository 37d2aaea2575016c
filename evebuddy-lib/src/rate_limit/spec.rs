//! Rate limit extraction from an ESI OpenAPI document.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Map;
use serde_json::Value;

use super::RateLimitGroup;
use crate::error::RateLimitError;

const METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// Rate limit data extracted from an API spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitSpec {
    /// Groups by name.
    pub groups: BTreeMap<String, RateLimitGroup>,
    /// Group name per operation ID; `None` for unlimited operations.
    pub operations: BTreeMap<String, Option<String>>,
}

/// Parses the rate limit groups and operations of an OpenAPI document.
///
/// Operations are read from `paths.*.{get,post,put,delete,patch}`. Each
/// needs an `operationId` and may carry an `x-rate-limit` extension.
///
/// # Example
///
/// ```
/// use evebuddy_lib::rate_limit::parse_spec;
///
/// let spec = parse_spec(r#"{
///     "paths": {
///         "/status": { "get": { "operationId": "GetStatus" } },
///         "/characters/{character_id}/location": {
///             "get": {
///                 "operationId": "GetCharactersCharacterIdLocation",
///                 "x-rate-limit": { "group": "char-location", "max-tokens": 1200, "window-size": "15m" }
///             }
///         }
///     }
/// }"#).unwrap();
///
/// assert_eq!(spec.groups["char-location"].max_tokens, 1200);
/// assert_eq!(spec.operations["GetStatus"], None);
/// ```
pub fn parse_spec(json: &str) -> Result<RateLimitSpec, RateLimitError> {
    let root: Value = serde_json::from_str(json)?;
    let paths = root
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("paths", "missing paths object"))?;

    let mut spec = RateLimitSpec::default();
    for (path, item) in paths {
        let item = item
            .as_object()
            .ok_or_else(|| malformed(&format!("paths.{path}"), "path item is not an object"))?;
        for method in METHODS {
            let Some(operation) = item.get(method) else {
                continue;
            };
            let location = format!("paths.{path}.{method}");
            let operation = operation
                .as_object()
                .ok_or_else(|| malformed(&location, "operation is not an object"))?;
            parse_operation(&mut spec, &location, operation)?;
        }
    }

    log::debug!(
        "rate limit spec: {} operations, {} groups",
        spec.operations.len(),
        spec.groups.len()
    );
    Ok(spec)
}

fn parse_operation(
    spec: &mut RateLimitSpec,
    location: &str,
    operation: &Map<String, Value>,
) -> Result<(), RateLimitError> {
    let operation_id = operation
        .get("operationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed(location, "missing operationId"))?;

    let group = match operation.get("x-rate-limit") {
        None | Some(Value::Null) => None,
        Some(limit) => {
            let location = format!("{location}.x-rate-limit");
            let group = parse_group(&location, limit)?;
            let name = group.name.to_string();
            match spec.groups.get(&name) {
                Some(existing) if *existing != group => {
                    return Err(RateLimitError::ConflictingGroup { group: name });
                }
                Some(_) => {}
                None => {
                    spec.groups.insert(name.clone(), group);
                }
            }
            Some(name)
        }
    };

    if spec
        .operations
        .insert(operation_id.to_string(), group)
        .is_some()
    {
        return Err(malformed(
            location,
            &format!("duplicate operationId {operation_id}"),
        ));
    }
    Ok(())
}

fn parse_group(location: &str, limit: &Value) -> Result<RateLimitGroup, RateLimitError> {
    let name = limit
        .get("group")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed(location, "missing group"))?;
    let max_tokens = limit
        .get("max-tokens")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| malformed(location, "max-tokens must be a positive integer"))?;
    let window = match limit.get("window-size") {
        Some(Value::String(s)) => parse_window(s)?,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(window_from_secs)
            .ok_or_else(|| RateLimitError::InvalidWindow(n.to_string()))?,
        _ => return Err(malformed(location, "missing window-size")),
    };
    Ok(RateLimitGroup::owned(name, max_tokens, window))
}

/// Parses a window size such as `15m`, `1h`, `30s`, `1d` or `900` (seconds).
pub fn parse_window(s: &str) -> Result<Duration, RateLimitError> {
    let invalid = || RateLimitError::InvalidWindow(s.to_string());
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let factor = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    value
        .checked_mul(factor)
        .and_then(window_from_secs)
        .ok_or_else(invalid)
}

/// Longest accepted window.
pub const MAX_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn window_from_secs(secs: u64) -> Option<Duration> {
    let window = Duration::from_secs(secs);
    (secs > 0 && window <= MAX_WINDOW).then_some(window)
}

fn malformed(location: &str, message: &str) -> RateLimitError {
    RateLimitError::MalformedSpec {
        location: location.to_string(),
        message: message.to_string(),
    }
}
