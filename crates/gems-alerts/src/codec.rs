//! Codec for the query-parameter payload stored in rule annotations.
//!
//! The payload is the only place raw JSON strings are handled; everything
//! else works with [`EncodedQuery`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};
use crate::types::{CompareOp, QueryParams};

/// The decoded payload of one rule entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedQuery {
    /// Shared query parameters.
    pub params: QueryParams,
    /// Comparison of this entry.
    pub compare_op: CompareOp,
    /// Compared value of this entry.
    pub compare_value: String,
}

// Field order here is the canonical key order of the payload.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    resource: String,
    rule: String,
    #[serde(default)]
    unit: String,
    #[serde(rename = "labelpairs", default)]
    label_pairs: BTreeMap<String, String>,
    compare_op: String,
    compare_value: String,
}

/// Decodes an annotation payload.
///
/// # Errors
///
/// Returns `AlertError::Decode` if the payload is not valid JSON of the
/// expected shape, if `resource` or `rule` is empty, or if the compare
/// operator is unknown.
pub fn decode(payload: &str) -> Result<EncodedQuery> {
    let raw: Payload = serde_json::from_str(payload)
        .map_err(|e| AlertError::decode(format!("malformed query payload: {e}")))?;

    if raw.resource.is_empty() {
        return Err(AlertError::decode("query payload has empty resource"));
    }
    if raw.rule.is_empty() {
        return Err(AlertError::decode("query payload has empty rule"));
    }

    Ok(EncodedQuery {
        params: QueryParams {
            resource: raw.resource,
            rule_type: raw.rule,
            unit: raw.unit,
            label_pairs: raw.label_pairs,
        },
        compare_op: raw.compare_op.parse()?,
        compare_value: raw.compare_value,
    })
}

/// Encodes a payload with canonical key order.
///
/// # Errors
///
/// Returns `AlertError::Serialization` if JSON encoding fails.
pub fn encode(query: &EncodedQuery) -> Result<String> {
    let raw = Payload {
        resource: query.params.resource.clone(),
        rule: query.params.rule_type.clone(),
        unit: query.params.unit.clone(),
        label_pairs: query.params.label_pairs.clone(),
        compare_op: query.compare_op.as_symbol().to_string(),
        compare_value: query.compare_value.clone(),
    };
    Ok(serde_json::to_string(&raw)?)
}
