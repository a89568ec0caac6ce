//! Entity reconciliation
//!
//! Resolves a local counterparty name to a remote entity id: exact-name
//! lookup (inactive rows included), create on miss, reactivate on
//! soft-deleted match, and best-effort sparse updates when supplied
//! attributes have drifted from the remote record. Reactivation failures
//! are fatal; drift-update failures are logged and swallowed because the
//! id the caller needs is already in hand.

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::gateway::RemoteLedger;
use crate::ledger::types::{
    decode_entity, decode_query_matches, decode_wrapped_entity, EntityKind, RemoteEntity,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Optional attributes carried along when creating or updating an entity
#[derive(Debug, Clone, Default)]
pub struct EntityAttrs {
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Free-text contact name, split into given/family on whitespace
    pub contact_name: Option<String>,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

pub struct EntityReconciler {
    gateway: Arc<dyn RemoteLedger>,
}

impl EntityReconciler {
    pub fn new(gateway: Arc<dyn RemoteLedger>) -> Self {
        Self { gateway }
    }

    /// Find, create or reactivate the remote entity for `name`; returns its
    /// remote id.
    pub async fn resolve(
        &self,
        kind: EntityKind,
        name: &str,
        attrs: Option<&EntityAttrs>,
    ) -> LedgerResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidInput(
                "entity name must not be empty".into(),
            ));
        }

        let statement = format!(
            "SELECT * FROM {} WHERE {} = '{}' AND Active IN (true, false)",
            kind.resource(),
            kind.name_field(),
            escape_query_value(name)
        );
        let response = self.gateway.query(&statement).await?;
        let matches = decode_query_matches(kind, &response)?;

        let Some(existing) = matches.into_iter().next() else {
            return self.create(kind, name, attrs).await;
        };

        if !existing.active {
            self.reactivate(kind, name, &existing).await?;
            return Ok(existing.id);
        }

        if let Some(attrs) = attrs {
            if let Some(update) = drifted_name_fields(&existing, attrs) {
                self.apply_drift_update(kind, &existing, update).await;
            }
        }

        Ok(existing.id)
    }

    async fn create(
        &self,
        kind: EntityKind,
        name: &str,
        attrs: Option<&EntityAttrs>,
    ) -> LedgerResult<String> {
        let body = build_create_body(kind, name, attrs);
        let response = self
            .gateway
            .post_json(&kind.resource().to_lowercase(), &body)
            .await?;
        let created = decode_wrapped_entity(kind, &response)?;
        info!(
            "Created remote {} '{}' (id {})",
            kind.resource(),
            name,
            created.id
        );
        Ok(created.id)
    }

    async fn reactivate(
        &self,
        kind: EntityKind,
        name: &str,
        existing: &RemoteEntity,
    ) -> LedgerResult<()> {
        let body = json!({
            "Id": existing.id,
            "SyncToken": existing.sync_token,
            "sparse": true,
            "Active": true,
            kind.name_field(): existing.display_name,
        });

        match self
            .gateway
            .post_json(&kind.resource().to_lowercase(), &body)
            .await
        {
            Ok(_) => {
                info!("Reactivated remote {} '{}'", kind.resource(), name);
                Ok(())
            }
            Err(err) => Err(LedgerError::ReactivationFailed {
                name: name.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Best-effort: re-read for a fresh sync token, send only the changed
    /// fields, and swallow any failure.
    async fn apply_drift_update(
        &self,
        kind: EntityKind,
        existing: &RemoteEntity,
        changed: Map<String, Value>,
    ) {
        let fresh = match self
            .gateway
            .get(&format!("{}/{}", kind.resource().to_lowercase(), existing.id))
            .await
            .and_then(|response| decode_wrapped_entity(kind, &response))
        {
            Ok(entity) => entity,
            Err(err) => {
                warn!(
                    "Skipping drift update for {} '{}': re-read failed: {}",
                    kind.resource(),
                    existing.display_name,
                    err
                );
                return;
            }
        };

        let mut body = Map::new();
        body.insert("Id".into(), Value::String(fresh.id.clone()));
        body.insert("SyncToken".into(), Value::String(fresh.sync_token.clone()));
        body.insert("sparse".into(), Value::Bool(true));
        body.extend(changed);

        if let Err(err) = self
            .gateway
            .post_json(&kind.resource().to_lowercase(), &Value::Object(body))
            .await
        {
            warn!(
                "Drift update failed for {} '{}' (id {}): {}",
                kind.resource(),
                existing.display_name,
                existing.id,
                err
            );
        }
    }
}

/// Escape a value for the remote query language
pub fn escape_query_value(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// First whitespace token is the given name, the rest joined is the family
/// name
pub fn split_contact_name(contact_name: &str) -> Option<(String, String)> {
    let mut tokens = contact_name.split_whitespace();
    let given = tokens.next()?.to_string();
    let family = tokens.collect::<Vec<_>>().join(" ");
    Some((given, family))
}

/// Name fields that differ between the supplied attributes and the remote
/// record; None when nothing drifted or no contact name was supplied.
pub fn drifted_name_fields(
    existing: &RemoteEntity,
    attrs: &EntityAttrs,
) -> Option<Map<String, Value>> {
    let contact_name = attrs.contact_name.as_deref()?;
    let (given, family) = split_contact_name(contact_name)?;

    let mut changed = Map::new();
    if existing.given_name.as_deref() != Some(given.as_str()) {
        changed.insert("GivenName".into(), Value::String(given));
    }
    let family_matches = match (existing.family_name.as_deref(), family.is_empty()) {
        (None, true) => true,
        (stored, false) => stored == Some(family.as_str()),
        (Some(_), true) => false,
    };
    if !family_matches {
        changed.insert("FamilyName".into(), Value::String(family));
    }

    if changed.is_empty() {
        None
    } else {
        Some(changed)
    }
}

fn build_create_body(kind: EntityKind, name: &str, attrs: Option<&EntityAttrs>) -> Value {
    let mut body = Map::new();
    body.insert(kind.name_field().into(), Value::String(name.to_string()));

    if kind == EntityKind::Item {
        // Catalog items need a type; services cover commission line items
        body.insert("Type".into(), Value::String("Service".into()));
        return Value::Object(body);
    }

    if let Some(attrs) = attrs {
        if let Some(contact) = attrs.contact_name.as_deref() {
            if let Some((given, family)) = split_contact_name(contact) {
                body.insert("GivenName".into(), Value::String(given));
                if !family.is_empty() {
                    body.insert("FamilyName".into(), Value::String(family));
                }
            }
        }
        if let Some(email) = attrs.email.as_deref() {
            body.insert("PrimaryEmailAddr".into(), json!({ "Address": email }));
        }
        if let Some(phone) = attrs.phone.as_deref() {
            body.insert("PrimaryPhone".into(), json!({ "FreeFormNumber": phone }));
        }
        if attrs.address_line1.is_some() || attrs.city.is_some() || attrs.postal_code.is_some() {
            let mut addr = Map::new();
            if let Some(line1) = attrs.address_line1.as_deref() {
                addr.insert("Line1".into(), Value::String(line1.to_string()));
            }
            if let Some(city) = attrs.city.as_deref() {
                addr.insert("City".into(), Value::String(city.to_string()));
            }
            if let Some(postal) = attrs.postal_code.as_deref() {
                addr.insert("PostalCode".into(), Value::String(postal.to_string()));
            }
            body.insert("BillAddr".into(), Value::Object(addr));
        }
    }

    Value::Object(body)
}
