//! Entitlement arithmetic: paid-until dates and the SKU token grammar.
//!
//! SKU grammar: `+`-joined tokens. Tokens prefixed `x-` are entitlement
//! markers (e.g. `x-tenant` grants a private tenant) and are excluded from
//! the provisioned product-access list; all other tokens are literal
//! product identifiers passed to the provisioner.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use super::errors::BillingError;

/// Marker token meaning "this purchase grants a private tenant".
const TENANT_MARKER: &str = "x-tenant";

/// Prefix identifying entitlement markers rather than product identifiers.
const MARKER_PREFIX: &str = "x-";

/// Billing cycle as reported by a vendor, already normalized by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingCycle {
    Monthly,
    Yearly,
    /// A single non-recurring charge.
    OneTime,
    /// The vendor reported something we do not understand. Recorded but
    /// never used for entitlement math.
    Unrecognized,
}

/// Parses a vendor-supplied date string.
///
/// Vendors send `2017-10-25T00:00:00+00:00`-style values; only the first 19
/// characters are significant (sub-second and timezone-offset suffixes are
/// ignored, truncating to whole seconds).
pub fn parse_vendor_date(raw: &str) -> Result<DateTime<Utc>, BillingError> {
    let head = raw.get(..19).ok_or_else(|| {
        BillingError::malformed(format!("date string too short: {raw:?}"))
    })?;
    let parsed = NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| BillingError::malformed(format!("unparseable date {raw:?}: {e}")))?;
    Ok(parsed.and_utc())
}

/// Computes the date through which a purchase keeps the buyer entitled.
///
/// An explicit vendor-reported next-billing-date wins over cycle arithmetic.
/// Otherwise monthly adds 31 days and yearly 366, covering the longest
/// month/year. The result is always normalized to 23:59:59 so the buyer
/// keeps access through the whole last day.
pub fn paid_until(
    cycle: BillingCycle,
    effective_date: DateTime<Utc>,
    explicit_next: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let date = match explicit_next {
        Some(next) => next,
        None => match cycle {
            BillingCycle::Monthly => effective_date + Duration::days(31),
            BillingCycle::Yearly => effective_date + Duration::days(366),
            // Unknown cycles leave the date unchanged. Preserved from
            // observed behavior; see the pinning test below.
            BillingCycle::OneTime | BillingCycle::Unrecognized => effective_date,
        },
    };
    end_of_grace_day(date)
}

/// Normalizes a timestamp to 23:59:59 on the same day.
fn end_of_grace_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive()
        .and_hms_opt(23, 59, 59)
        .expect("23:59:59 is a valid time of day")
        .and_utc()
}

/// Splits a SKU into the product identifiers to be provisioned, dropping
/// empty tokens and entitlement markers.
pub fn product_access_list(sku: &str) -> Vec<&str> {
    sku.split('+')
        .filter(|token| !token.is_empty() && !token.starts_with(MARKER_PREFIX))
        .collect()
}

/// Whether the SKU carries the private-tenant entitlement marker.
pub fn sku_grants_tenant(sku: &str) -> bool {
    sku.split('+').any(|token| token == TENANT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn monthly_cycle_adds_31_days_and_ends_the_day() {
        let result = paid_until(BillingCycle::Monthly, utc(2019, 4, 1, 0, 0, 0), None);
        assert_eq!(result, utc(2019, 5, 2, 23, 59, 59));
    }

    #[test]
    fn yearly_cycle_adds_366_days_and_ends_the_day() {
        let result = paid_until(BillingCycle::Yearly, utc(2019, 4, 1, 0, 0, 0), None);
        assert_eq!(result, utc(2020, 4, 1, 23, 59, 59));
    }

    #[test]
    fn explicit_next_billing_date_wins_over_cycle() {
        let explicit = parse_vendor_date("2027-09-25T00:00:00Z").unwrap();
        let result = paid_until(
            BillingCycle::Yearly,
            utc(2019, 4, 1, 0, 0, 0),
            Some(explicit),
        );
        assert_eq!(result, utc(2027, 9, 25, 23, 59, 59));
    }

    // An unrecognized cycle leaves the effective date unchanged. This looks
    // like an oversight rather than intended policy, but it is the observed
    // behavior and this test pins it instead of silently fixing it.
    #[test]
    fn unrecognized_cycle_leaves_date_unchanged() {
        let result = paid_until(
            BillingCycle::Unrecognized,
            utc(2019, 4, 1, 12, 30, 0),
            None,
        );
        assert_eq!(result, utc(2019, 4, 1, 23, 59, 59));
    }

    #[test]
    fn vendor_date_truncates_offset_suffix() {
        let parsed = parse_vendor_date("2017-10-25T00:00:00+00:00").unwrap();
        assert_eq!(parsed, utc(2017, 10, 25, 0, 0, 0));
    }

    #[test]
    fn vendor_date_truncates_subseconds() {
        let parsed = parse_vendor_date("2027-09-25T00:00:00.123Z").unwrap();
        assert_eq!(parsed, utc(2027, 9, 25, 0, 0, 0));
    }

    #[test]
    fn short_vendor_date_is_malformed() {
        let result = parse_vendor_date("2019-04-01");
        assert!(matches!(result, Err(BillingError::MalformedPayload(_))));
    }

    #[test]
    fn access_list_drops_markers_and_empty_tokens() {
        assert_eq!(
            product_access_list("x-tenant+version+enterprise"),
            vec!["version", "enterprise"]
        );
        assert_eq!(product_access_list("version"), vec!["version"]);
        assert_eq!(product_access_list("x-tenant"), Vec::<&str>::new());
        assert_eq!(product_access_list("version++"), vec!["version"]);
        assert_eq!(product_access_list(""), Vec::<&str>::new());
    }

    #[test]
    fn tenant_marker_requires_exact_token() {
        assert!(sku_grants_tenant("x-tenant+version"));
        assert!(sku_grants_tenant("x-tenant"));
        assert!(!sku_grants_tenant("version+enterprise"));
        assert!(!sku_grants_tenant("x-tenants"));
        assert!(!sku_grants_tenant(""));
    }

    proptest! {
        // Grace-period policy: whatever the inputs, the buyer keeps access
        // through the last second of the final day.
        #[test]
        fn paid_until_always_ends_at_23_59_59(secs in 0i64..4_000_000_000i64) {
            let effective = Utc.timestamp_opt(secs, 0).unwrap();
            for cycle in [
                BillingCycle::Monthly,
                BillingCycle::Yearly,
                BillingCycle::OneTime,
                BillingCycle::Unrecognized,
            ] {
                let result = paid_until(cycle, effective, None);
                prop_assert_eq!(result.format("%H:%M:%S").to_string(), "23:59:59");
            }
        }
    }
}
