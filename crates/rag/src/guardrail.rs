//! Tenant/site/source-type gate in front of every retrieval.
//!
//! Validation is pure and runs before any embedding or vector store call, so
//! a rejected request has no side effects.

use std::collections::BTreeSet;

use serde::Serialize;
use storechat_core::ValidationError;

use crate::policy::{GuardrailPolicy, SourceTypeEnforcement};
use crate::types::SourceType;

/// A request that passed the guardrail: tenant and site are present and every
/// source type is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalScope {
    pub tenant_id: String,
    pub site_id: String,
    /// Canonically ordered, deduplicated
    pub source_types: Vec<SourceType>,
}

impl RetrievalScope {
    /// True when sanitizing removed every requested type.
    pub fn is_empty(&self) -> bool {
        self.source_types.is_empty()
    }

    pub fn contains(&self, source_type: SourceType) -> bool {
        self.source_types.contains(&source_type)
    }
}

/// Validate tenant/site scoping and the requested source types.
///
/// `requested` of `None` (or an empty list) means "every type the policy
/// allows". Under [`SourceTypeEnforcement::Strict`] any requested name that is
/// unknown or outside the allowlist fails the request; under
/// [`SourceTypeEnforcement::Sanitize`] such names are dropped, which may leave
/// an empty scope.
pub fn validate_scope<S: AsRef<str>>(
    tenant_id: &str,
    site_id: &str,
    requested: Option<&[S]>,
    policy: &GuardrailPolicy,
) -> Result<RetrievalScope, ValidationError> {
    if tenant_id.trim().is_empty() {
        return Err(ValidationError::MissingTenant);
    }
    if site_id.trim().is_empty() {
        return Err(ValidationError::MissingSite);
    }

    let source_types = match requested {
        None => policy.allowed_source_types.iter().copied().collect(),
        Some(names) if names.is_empty() => policy.allowed_source_types.iter().copied().collect(),
        Some(names) => match policy.enforcement {
            SourceTypeEnforcement::Strict => check_source_types(names, policy)?,
            SourceTypeEnforcement::Sanitize => sanitize_source_types(names, policy),
        },
    };

    Ok(RetrievalScope {
        tenant_id: tenant_id.to_string(),
        site_id: site_id.to_string(),
        source_types,
    })
}

/// Fail on the first requested name that is not an allowed source type.
pub fn check_source_types<S: AsRef<str>>(
    requested: &[S],
    policy: &GuardrailPolicy,
) -> Result<Vec<SourceType>, ValidationError> {
    let mut accepted = BTreeSet::new();
    for name in requested {
        let name = name.as_ref();
        match name.parse::<SourceType>() {
            Ok(source_type) if policy.allows(source_type) => {
                accepted.insert(source_type);
            }
            _ => return Err(ValidationError::DisallowedSourceType(name.to_string())),
        }
    }
    Ok(accepted.into_iter().collect())
}

/// Keep only the requested names that parse to an allowed source type.
pub fn sanitize_source_types<S: AsRef<str>>(
    requested: &[S],
    policy: &GuardrailPolicy,
) -> Vec<SourceType> {
    let kept: BTreeSet<SourceType> = requested
        .iter()
        .filter_map(|name| name.as_ref().parse::<SourceType>().ok())
        .filter(|source_type| policy.allows(*source_type))
        .collect();

    if kept.len() < requested.len() {
        tracing::debug!(
            requested = requested.len(),
            kept = kept.len(),
            "Dropped source types outside the allowlist"
        );
    }

    kept.into_iter().collect()
}
