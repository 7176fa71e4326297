//! Header and URI rewriting for single-host forwarding.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Append the client address to X-Forwarded-For
//! - Rewrite the request URI onto the upstream target
//!
//! # Design Decisions
//! - The incoming Host header is forwarded unchanged
//! - Target path and request path are joined with exactly one slash
//! - Target and request query strings are both kept, target first

use std::net::IpAddr;

use axum::http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    uri::{PathAndQuery, Uri},
};

/// Headers that apply to a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Append `client` to X-Forwarded-For, keeping earlier hops.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Point `incoming` at `target`, joining paths and merging query strings.
pub fn rewrite_uri(target: &Uri, incoming: &Uri) -> Result<Uri, axum::http::Error> {
    let path = join_paths(target.path(), incoming.path());
    let query = match (target.query(), incoming.query()) {
        (Some(t), Some(i)) if !t.is_empty() && !i.is_empty() => Some(format!("{t}&{i}")),
        (Some(t), _) if !t.is_empty() => Some(t.to_string()),
        (_, Some(i)) if !i.is_empty() => Some(i.to_string()),
        _ => None,
    };

    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };

    let mut builder = Uri::builder().path_and_query(PathAndQuery::try_from(path_and_query)?);
    if let Some(scheme) = target.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = target.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.build()
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn joins_paths_with_single_slash() {
        assert_eq!(join_paths("/", "/a"), "/a");
        assert_eq!(join_paths("/base", "/a"), "/base/a");
        assert_eq!(join_paths("/base/", "/a"), "/base/a");
        assert_eq!(join_paths("/base", "a"), "/base/a");
    }

    #[test]
    fn rewrites_onto_target() {
        let rewritten = rewrite_uri(&uri("http://127.0.0.1:6060"), &uri("/debug/vars?x=1")).unwrap();
        assert_eq!(rewritten, uri("http://127.0.0.1:6060/debug/vars?x=1"));
    }

    #[test]
    fn merges_target_prefix_and_query() {
        let rewritten = rewrite_uri(&uri("http://backend/app?key=k"), &uri("/items?page=2")).unwrap();
        assert_eq!(rewritten, uri("http://backend/app/items?key=k&page=2"));

        let no_query = rewrite_uri(&uri("http://backend/app/"), &uri("/")).unwrap();
        assert_eq!(no_query, uri("http://backend/app/"));
    }

    #[test]
    fn strips_hop_by_hop_and_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[test]
    fn forwarded_for_appends_hops() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1".parse().unwrap());
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2".parse().unwrap());
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2");
    }
}
