//! Backend URL selection.
//!
//! A client running on a local development host must never talk to a
//! production backend, even when the configuration points there.

use meridian_core::ApiConfig;

const LOCAL_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// True for `localhost`, loopback/unspecified addresses and `*.local` names.
pub fn is_local_host(host: &str) -> bool {
    let host = normalize_host(host);
    LOCAL_HOSTS.contains(&host.as_str()) || host.ends_with(".local")
}

/// Pick the base URL for a client running on `client_host`.
///
/// On a local development host the local default wins when nothing is
/// configured or the configured URL targets a production host. Otherwise the
/// configured URL is used, falling back to the local default.
pub fn resolve_base_url(client_host: Option<&str>, config: &ApiConfig) -> String {
    let local_default = config.local_default.trim_end_matches('/').to_string();
    let configured = config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty());
    let on_local_host = client_host.is_some_and(is_local_host);

    match configured {
        Some(url) if on_local_host && targets_production(url, &config.production_hosts) => {
            tracing::warn!(
                configured = url,
                "Configured API targets a production host from a local client; using local default"
            );
            local_default
        }
        Some(url) => url.trim_end_matches('/').to_string(),
        None => local_default,
    }
}

fn targets_production(url: &str, production_hosts: &[String]) -> bool {
    let Some(host) = url_host(url) else {
        return false;
    };
    production_hosts
        .iter()
        .any(|production| normalize_host(production) == host)
}

fn url_host(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(normalize_host))
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase()
}
