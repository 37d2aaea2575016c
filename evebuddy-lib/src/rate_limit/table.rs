//! Operation to rate limit bucket resolution.

use std::collections::HashMap;

use super::RateLimitGroup;
use super::RateLimitSpec;
use crate::error::RateLimitError;

/// A resolved rate limit bucket.
///
/// Requests in the same bucket share one steady rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// `{group}-{character_id}`, with `0` for public requests.
    pub key: String,
    pub group: RateLimitGroup,
}

/// Maps operation IDs to rate limit groups.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTable {
    groups: HashMap<String, RateLimitGroup>,
    /// Empty group name means unlimited.
    operations: HashMap<String, String>,
}

impl RateLimitTable {
    /// Builds a table from a parsed spec.
    pub fn from_spec(spec: &RateLimitSpec) -> Self {
        Self {
            groups: spec.groups.clone().into_iter().collect(),
            operations: spec
                .operations
                .iter()
                .map(|(op, group)| (op.clone(), group.clone().unwrap_or_default()))
                .collect(),
        }
    }

    /// Builds a table from generated `RATE_LIMIT_GROUPS` and `OPERATION_GROUPS`.
    pub fn from_static(groups: &[RateLimitGroup], operations: &[(&str, &str)]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|g| (g.name.to_string(), g.clone()))
                .collect(),
            operations: operations
                .iter()
                .map(|(op, group)| (op.to_string(), group.to_string()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&RateLimitGroup> {
        self.groups.get(name)
    }

    /// Resolves the bucket for a request.
    ///
    /// Returns `Ok(None)` for operations without a rate limit. Authenticated
    /// requests must name the character they are made for.
    pub fn resolve(
        &self,
        operation_id: &str,
        character_id: Option<i32>,
        authenticated: bool,
    ) -> Result<Option<Bucket>, RateLimitError> {
        if authenticated && character_id.is_none() {
            return Err(RateLimitError::MissingCharacterId(operation_id.to_string()));
        }
        let group_name = self
            .operations
            .get(operation_id)
            .ok_or_else(|| RateLimitError::UnknownOperation(operation_id.to_string()))?;
        if group_name.is_empty() {
            return Ok(None);
        }
        let group = self
            .groups
            .get(group_name)
            .ok_or_else(|| RateLimitError::UnknownGroup {
                operation: operation_id.to_string(),
                group: group_name.clone(),
            })?;

        let key = format!("{}-{}", group_name, character_id.unwrap_or(0));
        log::debug!(
            "rate limit: applying group {} to {} (bucket {})",
            group_name,
            operation_id,
            key
        );
        Ok(Some(Bucket {
            key,
            group: group.clone(),
        }))
    }
}
