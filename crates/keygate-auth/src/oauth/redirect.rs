//! Redirect URI resolution.
//!
//! A requested redirect URI is accepted when it equals a registered URI, when
//! it matches a registered wildcard pattern (if the deployment enables
//! wildcards), or, for public clients only, when it is an HTTP(S) loopback
//! URI matching a registered loopback URI on everything but the port
//! (RFC 8252 section 7.3).

use std::net::{Ipv4Addr, Ipv6Addr};

use regex::Regex;
use url::{Host, Url};

use crate::error::AuthorizationRejection;
use crate::types::Client;

/// Chooses the redirect URI for an authorization request.
///
/// # Errors
///
/// Every failure is a [`AuthorizationRejection::RedirectUri`]: no redirect
/// may be sent to an unverified target.
pub fn resolve_redirect_uri(
    client: &Client,
    requested: Option<&str>,
    allow_wildcards: bool,
) -> Result<String, AuthorizationRejection> {
    let Some(requested) = requested else {
        return match client.redirect_uris.as_slice() {
            [single] if !single.contains('*') => Ok(single.clone()),
            [_] => Err(AuthorizationRejection::redirect_uri(
                "redirect_uri is required: the registered URI is a pattern",
            )),
            _ => Err(AuthorizationRejection::redirect_uri(
                "redirect_uri is required: the client has several registered URIs",
            )),
        };
    };

    let url = Url::parse(requested)
        .map_err(|_| AuthorizationRejection::redirect_uri("redirect_uri is not a valid URI"))?;

    if client.is_public() && !is_http(&url) && !url.scheme().contains('.') {
        return Err(AuthorizationRejection::redirect_uri(format!(
            "private-use scheme '{}' must be in reverse domain form",
            url.scheme()
        )));
    }

    if client.redirect_uris.iter().any(|r| r == requested) {
        return Ok(requested.to_string());
    }

    if allow_wildcards
        && client
            .redirect_uris
            .iter()
            .filter(|r| r.contains('*'))
            .any(|pattern| wildcard_matches(pattern, requested))
    {
        return Ok(requested.to_string());
    }

    if client.is_public() && is_http(&url) && is_loopback(&url) {
        let matched = client
            .redirect_uris
            .iter()
            .filter_map(|r| Url::parse(r).ok())
            .any(|registered| loopback_equivalent(&registered, &url));
        if matched {
            return Ok(requested.to_string());
        }
    }

    tracing::debug!(client_id = %client.client_id, "Redirect URI is not registered");
    Err(AuthorizationRejection::redirect_uri(
        "redirect_uri is not registered for this client",
    ))
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
        _ => false,
    }
}

/// Both sides are http(s) loopback URIs with the same path. Port, scheme
/// and which loopback address is used are not compared.
fn loopback_equivalent(registered: &Url, requested: &Url) -> bool {
    is_http(registered)
        && is_loopback(registered)
        && is_http(requested)
        && is_loopback(requested)
        && registered.path() == requested.path()
}

/// Matches `candidate` against a registered URI in which `*` stands for any
/// sequence of characters.
fn wildcard_matches(pattern: &str, candidate: &str) -> bool {
    let regex = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    Regex::new(&regex)
        .map(|r| r.is_match(candidate))
        .unwrap_or(false)
}
