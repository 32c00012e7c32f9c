//! Request URL resolution.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("relative URL without a base: {0}")]
    RelativeWithoutBase(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse and check an origin URL used as the base for relative requests.
pub fn parse_base(input: &str) -> Result<Url, UrlError> {
    let base = resolve(None, input)?;
    if base.cannot_be_a_base() {
        return Err(UrlError::InvalidUrl(format!("{input} cannot be a base URL")));
    }
    Ok(base)
}

/// Resolve a request or manifest URL to an absolute http(s) URL.
///
/// 1. Trim leading/trailing whitespace
/// 2. Parse as absolute, or join onto `base` when relative
/// 3. Require http or https
/// 4. Remove fragment (#...)
/// 5. Keep the query string byte-for-byte; volatile parameters are the key
///    normalizer's business, not this function's
pub fn resolve(base: Option<&Url>, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?,
            None => return Err(UrlError::RelativeWithoutBase(trimmed.to_string())),
        },
        Err(e) => return Err(UrlError::InvalidUrl(e.to_string())),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        parse_base("https://app.test/myapp/").unwrap()
    }

    #[test]
    fn test_absolute_url() {
        let url = resolve(None, "https://App.Test/api/users?_dc=1").unwrap();
        assert_eq!(url.as_str(), "https://app.test/api/users?_dc=1");
    }

    #[test]
    fn test_relative_joins_base() {
        let url = resolve(Some(&base()), "resources/app.css").unwrap();
        assert_eq!(url.as_str(), "https://app.test/myapp/resources/app.css");

        let url = resolve(Some(&base()), "/api/users?page=2").unwrap();
        assert_eq!(url.as_str(), "https://app.test/api/users?page=2");
    }

    #[test]
    fn test_relative_without_base() {
        assert!(matches!(resolve(None, "app.js"), Err(UrlError::RelativeWithoutBase(_))));
    }

    #[test]
    fn test_removes_fragment_keeps_query() {
        let url = resolve(None, "https://app.test/index.html?a=1&_dc=2#/main").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("a=1&_dc=2"));
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(resolve(None, "file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(resolve(Some(&base()), "data:text/plain,hi"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_empty() {
        assert!(matches!(resolve(None, "   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_base_must_be_hierarchical() {
        assert!(parse_base("mailto:ops@app.test").is_err());
    }
}
