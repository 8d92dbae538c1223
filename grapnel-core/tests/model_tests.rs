//! Integration tests for core models and configuration.

use chrono::{Duration, Utc};
use grapnel_core::{
    CookieRecord, CredentialBundle, GrapnelConfig, Health, HealthThresholds, ItemRef,
    RequiredCookieNames, SearchQuery, media_id_to_shortcode, shortcode_to_media_id,
};

#[test]
fn test_url_and_shortcode_agree() {
    let from_url = ItemRef::parse("https://www.platform.example/p/CuE2WNQs6vH/").unwrap();
    let from_code = ItemRef::parse("CuE2WNQs6vH").unwrap();
    assert_eq!(from_url, from_code);

    let id = from_code.media_id().unwrap();
    let back = ItemRef::parse(&id).unwrap();
    assert_eq!(back.shortcode().as_deref(), Some("CuE2WNQs6vH"));
}

#[test]
fn test_shortcode_alphabet_edges() {
    assert_eq!(shortcode_to_media_id("-").unwrap(), 62);
    assert_eq!(shortcode_to_media_id("_").unwrap(), 63);
    assert_eq!(media_id_to_shortcode(63), "_");
}

#[test]
fn test_harvested_bundle_is_usable() {
    let now = Utc::now();
    let required = RequiredCookieNames::default();
    let records = ["sessionid", "csrftoken", "ds_user_id", "rur"]
        .into_iter()
        .map(|name| CookieRecord::new(name, "v").with_expires(now + Duration::days(60)))
        .collect();

    let bundle = CredentialBundle::from_cookie_records(
        records,
        now,
        GrapnelConfig::default().refresh.session_lifetime(),
        &required,
    )
    .unwrap();

    assert!(bundle.presence(&required).is_valid);
    assert_eq!(bundle.required_cookie_expiries(&required).len(), 4);
}

#[test]
fn test_custom_thresholds_shift_health() {
    let thresholds = HealthThresholds {
        critical_hours: 1,
        warning_hours: 2,
    };
    let remaining = std::time::Duration::from_secs(90 * 60);
    assert_eq!(Health::from_remaining(Some(remaining), &thresholds), Health::Warning);
    assert_eq!(
        Health::from_remaining(Some(remaining), &HealthThresholds::default()),
        Health::Critical
    );
}

#[test]
fn test_search_query_zero_limit_kept() {
    let q = SearchQuery::new("#a", 0);
    assert_eq!(q.limit, 0);
    assert_eq!(q.keyword, "a");
}
