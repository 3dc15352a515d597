//! Validation rules for the buyer-settable `gitops_prefix` field.
//!
//! The prefix scopes which repositories a subscription covers. It is the one
//! mutable field on a ledger row and may be set exactly once; the allowed
//! values depend on the vendor and the purchased SKU.

use thiserror::Error;

use super::entitlement::sku_grants_tenant;
use super::event::Vendor;

/// Canonical code-hosting domain buyers may point at.
const CODE_HOST: &str = "https://github.com";

/// Field-level validation failures, surfaced to the buyer as messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitopsPrefixError {
    #[error("value cannot be empty")]
    Empty,

    #[error("value is not an HTTP URL")]
    NotHttpUrl,

    #[error("value has already been set and cannot be changed")]
    AlreadySet,

    #[error("value is derived automatically for marketplace purchases")]
    VendorManaged,

    #[error("value cannot be the bare {CODE_HOST} domain")]
    BareRootForbidden,

    #[error("value must point inside {CODE_HOST}")]
    OutsideCodeHost,

    #[error("value must point at your own personal namespace")]
    NotPersonalNamespace,
}

/// Validates a new `gitops_prefix` value for a purchase.
///
/// `current` is the value already stored on the row, `sku` the purchase's
/// SKU, and `personal_namespace` the buyer's verified login from the
/// external directory lookup (only consulted for base self-support SKUs).
pub fn validate_gitops_prefix(
    vendor: Vendor,
    sku: &str,
    current: Option<&str>,
    value: &str,
    personal_namespace: Option<&str>,
) -> Result<(), GitopsPrefixError> {
    if current.is_some_and(|c| !c.is_empty()) {
        return Err(GitopsPrefixError::AlreadySet);
    }
    if value.is_empty() {
        return Err(GitopsPrefixError::Empty);
    }
    if !value.to_lowercase().starts_with("http") {
        return Err(GitopsPrefixError::NotHttpUrl);
    }

    // Marketplace purchases derive the prefix from the purchase event
    // itself; buyers never edit it by hand.
    if vendor.is_marketplace() {
        return Err(GitopsPrefixError::VendorManaged);
    }

    let normalized = value.trim_end_matches('/').to_lowercase();
    let tokens: Vec<&str> = sku.split('+').filter(|t| !t.is_empty()).collect();

    if tokens.contains(&"enterprise") {
        // Enterprise buyers may use any URL except the bare root domain.
        if normalized == CODE_HOST {
            return Err(GitopsPrefixError::BareRootForbidden);
        }
        return Ok(());
    }

    if sku_grants_tenant(sku) {
        // Private-tenant buyers may point at any organization or personal
        // namespace on the canonical code host.
        let rest = normalized
            .strip_prefix(CODE_HOST)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or(GitopsPrefixError::OutsideCodeHost)?;
        if rest.is_empty() {
            return Err(GitopsPrefixError::OutsideCodeHost);
        }
        return Ok(());
    }

    // Base self-support SKU: only the buyer's own personal namespace,
    // verified through the directory lookup.
    let login = personal_namespace.ok_or(GitopsPrefixError::NotPersonalNamespace)?;
    let expected = format!("{}/{}", CODE_HOST, login.to_lowercase());
    if normalized == expected || normalized.starts_with(&format!("{expected}/")) {
        Ok(())
    } else {
        Err(GitopsPrefixError::NotPersonalNamespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_value_rejected() {
        let result =
            validate_gitops_prefix(Vendor::Fastspring, "x-tenant+version", None, "", None);
        assert_eq!(result, Err(GitopsPrefixError::Empty));
    }

    #[test]
    fn non_http_value_rejected() {
        let result = validate_gitops_prefix(
            Vendor::Fastspring,
            "x-tenant+version",
            None,
            "git@github.com:kiwitcms/Kiwi",
            None,
        );
        assert_eq!(result, Err(GitopsPrefixError::NotHttpUrl));
    }

    #[test]
    fn existing_value_is_immutable() {
        let result = validate_gitops_prefix(
            Vendor::Fastspring,
            "x-tenant+version",
            Some("https://github.com/kiwitcms"),
            "https://github.com/other",
            None,
        );
        assert_eq!(result, Err(GitopsPrefixError::AlreadySet));
    }

    #[test]
    fn marketplace_purchases_forbid_manual_edits() {
        for vendor in [Vendor::Github, Vendor::GithubCron] {
            let result = validate_gitops_prefix(
                vendor,
                "version",
                None,
                "https://github.com/kiwitcms",
                None,
            );
            assert_eq!(result, Err(GitopsPrefixError::VendorManaged));
        }
    }

    #[test]
    fn enterprise_sku_allows_any_url_except_bare_root() {
        let sku = "x-tenant+version+enterprise";
        assert!(validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://gitlab.example.com/kiwitcms",
            None
        )
        .is_ok());

        let result = validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://github.com/",
            None,
        );
        assert_eq!(result, Err(GitopsPrefixError::BareRootForbidden));
    }

    #[test]
    fn private_tenant_sku_requires_code_host_namespace() {
        let sku = "x-tenant+version";
        assert!(validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://github.com/kiwitcms",
            None
        )
        .is_ok());

        let result = validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://gitlab.example.com/kiwitcms",
            None,
        );
        assert_eq!(result, Err(GitopsPrefixError::OutsideCodeHost));

        let result =
            validate_gitops_prefix(Vendor::Fastspring, sku, None, "https://github.com/", None);
        assert_eq!(result, Err(GitopsPrefixError::OutsideCodeHost));
    }

    #[test]
    fn self_support_sku_requires_own_namespace() {
        let sku = "version";
        assert!(validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://github.com/atodorov",
            Some("atodorov")
        )
        .is_ok());
        assert!(validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://github.com/atodorov/some-repo",
            Some("atodorov")
        )
        .is_ok());

        let result = validate_gitops_prefix(
            Vendor::Fastspring,
            sku,
            None,
            "https://github.com/kiwitcms",
            Some("atodorov"),
        );
        assert_eq!(result, Err(GitopsPrefixError::NotPersonalNamespace));

        // Directory lookup found nothing: reject instead of guessing.
        let result = validate_gitops_prefix(
            Vendor::Manual,
            sku,
            None,
            "https://github.com/atodorov",
            None,
        );
        assert_eq!(result, Err(GitopsPrefixError::NotPersonalNamespace));
    }
}
