//! Service queries that are not tied to a single scan.

use crate::auth::AuthenticationProvider;
use crate::http::HttpTransport;
use crate::service::cloud::{API_BASIC_DETAILS, API_IS_VALID_DOMAIN, API_IS_VALID_URL, API_TENANT_INFO};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const STATIC_TECH: &str = "StaticAnalyzer";
pub const DYNAMIC_TECH: &str = "DynamicAnalyzer";
pub const SCA_TECH: &str = "SoftwareCompositionAnalyzer";

/// Whether the tenant lists `technology` among its active technologies.
///
/// An expired credential answers `true` so the scan proceeds and fails later
/// with a login message.
pub async fn has_entitlement(
    technology: &str,
    auth: &dyn AuthenticationProvider,
    transport: &dyn HttpTransport,
) -> bool {
    if auth.is_token_expired() {
        return true;
    }

    let url = format!("{}{}", auth.server(), API_TENANT_INFO);
    let mut headers = auth.authorization_headers(false);
    headers.insert("Accept".to_string(), "application/json".to_string());

    match transport.get(&url, headers).await {
        Ok(response) if response.is_success() => response
            .json()
            .and_then(|body| body.get("ActiveTechnologies").and_then(Value::as_str).map(str::to_string))
            .map(|active| active.contains(technology))
            .unwrap_or(false),
        Ok(response) => {
            debug!("Tenant info request returned {}", response.code);
            false
        }
        Err(e) => {
            warn!("Tenant info request failed: {}", e);
            false
        }
    }
}

pub async fn has_sca_entitlement(auth: &dyn AuthenticationProvider, transport: &dyn HttpTransport) -> bool {
    has_entitlement(SCA_TECH, auth, transport).await
}

pub async fn has_sast_entitlement(auth: &dyn AuthenticationProvider, transport: &dyn HttpTransport) -> bool {
    has_entitlement(STATIC_TECH, auth, transport).await
}

pub async fn has_dast_entitlement(auth: &dyn AuthenticationProvider, transport: &dyn HttpTransport) -> bool {
    has_entitlement(DYNAMIC_TECH, auth, transport).await
}

/// Ask the service whether `url` can be scanned
pub async fn is_valid_url(url: &str, auth: &dyn AuthenticationProvider, transport: &dyn HttpTransport) -> bool {
    let request_url = format!("{}{}", auth.server(), API_IS_VALID_URL);
    let mut headers = auth.authorization_headers(false);
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    match transport.post(&request_url, headers, json!({ "Url": url })).await {
        Ok(response) if response.is_success() => response
            .json()
            .and_then(|body| body.get("IsValid").and_then(Value::as_bool))
            .unwrap_or(false),
        _ => false,
    }
}

/// Ask the service whether `url` belongs to a verified domain of `app_id`
pub async fn is_valid_domain(
    url: &str,
    app_id: &str,
    auth: &dyn AuthenticationProvider,
    transport: &dyn HttpTransport,
) -> bool {
    let request_url = format!("{}{}", auth.server(), API_IS_VALID_DOMAIN);
    let mut headers = auth.authorization_headers(false);
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    match transport
        .post(&request_url, headers, json!({ "AppId": app_id, "StartingUrl": url }))
        .await
    {
        Ok(response) if response.is_success() => response.text().trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Whether `scan_id` exists, belongs to `app_id` and ran the engine named `scan_type`
pub async fn is_valid_scan_id(
    scan_id: &str,
    app_id: &str,
    scan_type: &str,
    auth: &dyn AuthenticationProvider,
    transport: &dyn HttpTransport,
) -> bool {
    if auth.is_token_expired() {
        return true;
    }

    let url = format!(
        "{}{}?$filter=Id%20eq%20{}&%24select=AppId%2C%20Technology",
        auth.server(),
        API_BASIC_DETAILS,
        scan_id
    );

    let response = match transport.get(&url, auth.authorization_headers(true)).await {
        Ok(response) if response.is_success() => response,
        _ => return false,
    };

    let Some(first) = response
        .json()
        .and_then(|body| body.get("Items").and_then(Value::as_array).and_then(|items| items.first().cloned()))
    else {
        return false;
    };

    let found_app = first.get("AppId").and_then(Value::as_str).unwrap_or_default();
    let found_tech = first.get("Technology").and_then(Value::as_str).unwrap_or_default();
    found_app == app_id && found_tech == technology_name(scan_type)
}

/// Main version of the deployed service, `"0"` when the answer is unreadable
pub async fn service_version(auth: &dyn AuthenticationProvider, transport: &dyn HttpTransport) -> Option<String> {
    let url = format!("{}/assets/versions.json", auth.server());
    match transport.get(&url, Default::default()).await {
        Ok(response) if response.is_success() => Some(
            response
                .json()
                .and_then(|body| body.get("MainVersion").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "0".to_string()),
        ),
        Ok(_) => None,
        Err(_) => Some("0".to_string()),
    }
}

/// True when `new_version` is ahead of `base_version` in any of the first
/// three dotted components. A missing base always compares as older.
pub fn compare_versions(base_version: Option<&str>, new_version: Option<&str>) -> bool {
    let Some(base) = base_version else {
        return true;
    };
    let Some(next) = new_version else {
        return false;
    };

    for (b, n) in base.split('.').zip(next.split('.')).take(3) {
        let (Ok(b), Ok(n)) = (b.parse::<u64>(), n.parse::<u64>()) else {
            return false;
        };
        if b < n {
            return true;
        }
    }
    false
}

/// URL segment for an engine display name
pub fn scan_type_short_form(scan_type: &str) -> String {
    match scan_type {
        "Static Analyzer" => "Sast".to_string(),
        "Dynamic Analyzer" => "Dast".to_string(),
        "Software Composition Analyzer" => "Sca".to_string(),
        other => other.to_string(),
    }
}

/// Backend technology id for an engine display name
pub fn technology_name(scan_type: &str) -> String {
    match scan_type {
        "Static Analyzer" => STATIC_TECH.to_string(),
        "Dynamic Analyzer" => DYNAMIC_TECH.to_string(),
        "Software Composition Analyzer" => SCA_TECH.to_string(),
        other => other.to_string(),
    }
}
