//! Address-bar text normalization

use url::form_urlencoded;

/// Schemes written without `//` that still count as explicit
const OPAQUE_SCHEMES: &[&str] = &["about", "data", "blob", "mailto", "tel", "javascript"];

/// Turn free text typed into the address bar into a URL
///
/// Text that already carries a scheme passes through; a bare IPv4 address
/// (optionally with port and path) gets `http://`; anything else containing a
/// dot and no whitespace gets `https://`; the rest becomes a search using
/// `search_template`, whose `{query}` is replaced by the encoded text.
/// Blank input yields `None`.
pub fn normalize_address(input: &str, search_template: &str) -> Option<String> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }

    if has_scheme(text) {
        return Some(text.to_string());
    }
    if is_ipv4_address(text) {
        return Some(format!("http://{text}"));
    }
    if text.contains('.') && !text.contains(char::is_whitespace) {
        return Some(format!("https://{text}"));
    }

    let query: String = form_urlencoded::byte_serialize(text.as_bytes()).collect();
    Some(search_template.replace("{query}", &query))
}

fn has_scheme(text: &str) -> bool {
    if let Some((scheme, _)) = text.split_once("://") {
        return is_scheme_name(scheme);
    }
    text.split_once(':')
        .is_some_and(|(scheme, _)| OPAQUE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()))
}

fn is_scheme_name(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// `a.b.c.d`, `a.b.c.d:port`, optionally followed by a path
fn is_ipv4_address(text: &str) -> bool {
    let authority = text.split(['/', '?', '#']).next().unwrap_or_default();
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };

    if let Some(port) = port {
        if port.is_empty() || port.parse::<u16>().is_err() {
            return false;
        }
    }

    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.len() <= 3 && o.parse::<u8>().is_ok())
}
