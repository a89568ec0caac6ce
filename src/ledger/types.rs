//! Typed views over remote ledger resources
//!
//! The remote API answers with loosely nested JSON. Anything we act on is
//! pulled out with strict field-presence checks so upstream schema drift
//! fails fast instead of flowing into the books.

use crate::ledger::error::{LedgerError, LedgerResult};
use serde_json::Value;

/// Kinds of counterparty the reconciler can resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Customer,
    Vendor,
    Item,
}

impl EntityKind {
    /// Remote resource/table name, also the key the query response nests
    /// results under
    pub fn resource(&self) -> &'static str {
        match self {
            EntityKind::Customer => "Customer",
            EntityKind::Vendor => "Vendor",
            EntityKind::Item => "Item",
        }
    }

    /// The display-name field in the remote query language
    pub fn name_field(&self) -> &'static str {
        match self {
            EntityKind::Customer | EntityKind::Vendor => "DisplayName",
            EntityKind::Item => "Name",
        }
    }
}

/// The slice of a remote Customer/Vendor/Item the reconciler needs
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub id: String,
    pub sync_token: String,
    pub display_name: String,
    pub active: bool,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

/// Identifier pair for a freshly created financial document
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedDocument {
    pub id: String,
    pub doc_number: Option<String>,
}

fn missing(field: &str, context: &str) -> LedgerError {
    LedgerError::Other(anyhow::anyhow!(
        "remote response missing '{}' in {}",
        field,
        context
    ))
}

/// Required string field; the remote system also emits numbers for some
/// id-like fields, so both are accepted.
pub fn require_str(value: &Value, field: &str, context: &str) -> LedgerResult<String> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(missing(field, context)),
    }
}

pub fn optional_str(value: &Value, field: &str) -> Option<String> {
    match value.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Decode one entity object from a query or read response
pub fn decode_entity(kind: EntityKind, value: &Value) -> LedgerResult<RemoteEntity> {
    let context = kind.resource();
    Ok(RemoteEntity {
        id: require_str(value, "Id", context)?,
        sync_token: require_str(value, "SyncToken", context)?,
        display_name: require_str(value, kind.name_field(), context)?,
        active: value.get("Active").and_then(Value::as_bool).unwrap_or(true),
        given_name: optional_str(value, "GivenName"),
        family_name: optional_str(value, "FamilyName"),
    })
}

/// Decode the (possibly empty) match list from a `query` response:
/// `{ "QueryResponse": { "<Kind>": [ ... ] } }`
pub fn decode_query_matches(kind: EntityKind, response: &Value) -> LedgerResult<Vec<RemoteEntity>> {
    let query_response = response
        .get("QueryResponse")
        .ok_or_else(|| missing("QueryResponse", "query response"))?;

    let Some(rows) = query_response.get(kind.resource()).and_then(Value::as_array) else {
        // No key at all means zero matches, not drift
        return Ok(Vec::new());
    };

    rows.iter().map(|row| decode_entity(kind, row)).collect()
}

/// Decode a create/update response: `{ "<Kind>": { ... } }`
pub fn decode_wrapped_entity(kind: EntityKind, response: &Value) -> LedgerResult<RemoteEntity> {
    let inner = response
        .get(kind.resource())
        .ok_or_else(|| missing(kind.resource(), "create response"))?;
    decode_entity(kind, inner)
}

/// Decode a document-creation response (`Bill` or `JournalEntry` wrapper)
pub fn decode_created_document(doc_type: &str, response: &Value) -> LedgerResult<CreatedDocument> {
    let inner = response
        .get(doc_type)
        .ok_or_else(|| missing(doc_type, "document create response"))?;
    Ok(CreatedDocument {
        id: require_str(inner, "Id", doc_type)?,
        doc_number: optional_str(inner, "DocNumber"),
    })
}

/// Decode an upload response:
/// `{ "AttachableResponse": [ { "Attachable": { ... } } ] }`
pub fn decode_attachable_id(response: &Value) -> LedgerResult<String> {
    let inner = response
        .pointer("/AttachableResponse/0/Attachable")
        .ok_or_else(|| missing("AttachableResponse", "upload response"))?;
    require_str(inner, "Id", "Attachable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_query_matches() {
        let response = json!({
            "QueryResponse": {
                "Vendor": [
                    {"Id": "42", "SyncToken": "3", "DisplayName": "Acme Brokers", "Active": true}
                ]
            }
        });
        let matches = decode_query_matches(EntityKind::Vendor, &response).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "42");
        assert_eq!(matches[0].sync_token, "3");
        assert!(matches[0].active);
    }

    #[test]
    fn test_decode_query_empty() {
        let response = json!({"QueryResponse": {}});
        let matches = decode_query_matches(EntityKind::Customer, &response).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_missing_sync_token_is_an_error() {
        let response = json!({
            "QueryResponse": {"Vendor": [{"Id": "42", "DisplayName": "Acme"}]}
        });
        assert!(decode_query_matches(EntityKind::Vendor, &response).is_err());
    }

    #[test]
    fn test_numeric_id_accepted() {
        let entity = json!({"Id": 42, "SyncToken": 0, "Name": "Widget"});
        let decoded = decode_entity(EntityKind::Item, &entity).unwrap();
        assert_eq!(decoded.id, "42");
        assert_eq!(decoded.sync_token, "0");
    }

    #[test]
    fn test_decode_created_document() {
        let response = json!({"JournalEntry": {"Id": "901", "DocNumber": "BC-101"}});
        let doc = decode_created_document("JournalEntry", &response).unwrap();
        assert_eq!(doc.id, "901");
        assert_eq!(doc.doc_number.as_deref(), Some("BC-101"));
    }

    #[test]
    fn test_decode_attachable_id() {
        let response = json!({
            "AttachableResponse": [
                {"Attachable": {"Id": "5000", "FileName": "receipt.pdf"}}
            ]
        });
        assert_eq!(decode_attachable_id(&response).unwrap(), "5000");
        assert!(decode_attachable_id(&json!({"AttachableResponse": []})).is_err());
    }

    #[test]
    fn test_inactive_entity_decodes() {
        let entity = json!({
            "Id": "7", "SyncToken": "1", "DisplayName": "Dormant LLC", "Active": false
        });
        let decoded = decode_entity(EntityKind::Customer, &entity).unwrap();
        assert!(!decoded.active);
    }
}
