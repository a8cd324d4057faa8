//! Redirect target resolution.
//!
//! Extracts the destination URL from the request's query parameters or the
//! configured default and validates it syntactically. Resolution is pure: no
//! network access, URL grammar only. The result is computed once per session
//! and never mutated afterwards.

use url::Url;

/// Query parameter names checked for the destination, in priority order.
const TARGET_PARAMS: [&str; 3] = ["to", "redirect", "url"];

pub const ERR_INVALID_PARAM: &str = "The provided redirect URL is invalid.";
pub const ERR_INVALID_DEFAULT: &str = "The default redirect URL is invalid.";
pub const ERR_MISSING: &str = "No redirect URL was provided.";

/// Validated destination for the post-verification redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    url: Option<Url>,
    raw: Option<String>,
    error: Option<&'static str>,
}

impl RedirectTarget {
    pub fn is_valid(&self) -> bool {
        self.url.is_some()
    }

    /// The resolved destination, present only when valid.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The destination exactly as supplied, without URL normalization.
    pub fn as_str(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Human-readable resolution error, present only when invalid.
    pub fn error(&self) -> Option<&'static str> {
        self.error
    }

    fn valid(raw: &str, url: Url) -> Self {
        Self {
            url: Some(url),
            raw: Some(raw.to_string()),
            error: None,
        }
    }

    fn invalid(error: &'static str) -> Self {
        Self {
            url: None,
            raw: None,
            error: Some(error),
        }
    }
}

/// Resolve the redirect target from query pairs and the configured fallback.
///
/// The first non-empty parameter in priority order wins, even when a later
/// one would have been valid; parameters present with an empty value fall
/// through to the next candidate. The fallback is only consulted when no
/// parameter carries a value.
pub fn resolve(query: &[(String, String)], default_url: Option<&str>) -> RedirectTarget {
    let requested = TARGET_PARAMS.iter().find_map(|name| {
        query
            .iter()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.as_str())
    });

    if let Some(raw) = requested {
        return match Url::parse(raw) {
            Ok(url) => RedirectTarget::valid(raw, url),
            Err(err) => {
                log::debug!("rejected redirect parameter {raw:?}: {err}");
                RedirectTarget::invalid(ERR_INVALID_PARAM)
            }
        };
    }

    match default_url {
        Some(raw) => match Url::parse(raw) {
            Ok(url) => RedirectTarget::valid(raw, url),
            Err(err) => {
                log::debug!("rejected default redirect URL {raw:?}: {err}");
                RedirectTarget::invalid(ERR_INVALID_DEFAULT)
            }
        },
        None => RedirectTarget::invalid(ERR_MISSING),
    }
}

/// Resolve from a raw query string (`a=b&c=d`, leading `?` tolerated).
pub fn resolve_from_query_string(query: &str, default_url: Option<&str>) -> RedirectTarget {
    let trimmed = query.strip_prefix('?').unwrap_or(query);
    let pairs: Vec<(String, String)> =
        url::form_urlencoded::parse(trimmed.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
    resolve(&pairs, default_url)
}
