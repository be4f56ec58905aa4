use url::Url;

/// Path appended to service URLs that don't name one.
pub const DEFAULT_VARS_PATH: &str = "/debug/vars";

/// # Service
///
/// A remote process polled every cycle. `name` is the join key between fetch
/// results and widget bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub endpoint: Url,
}

impl Service {
    /// Builds a service from a raw, possibly partial, URL (see [`parse_url`]).
    pub fn new(name: impl Into<String>, raw_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            name: name.into(),
            endpoint: parse_url(raw_url)?,
        })
    }
}

/// Normalizes a configured service address.
///
/// `localhost:5678` becomes `http://localhost:5678/debug/vars`; an explicit scheme
/// and path are kept as they are.
pub fn parse_url(raw: &str) -> Result<Url, url::ParseError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };

    let mut url = Url::parse(&with_scheme)?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_VARS_PATH);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_scheme_gets_http() {
        let url = parse_url("localhost:5678/test").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5678/test");
    }

    #[test]
    fn url_without_path_gets_debug_vars() {
        let url = parse_url("localhost:5678").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5678/debug/vars");
    }

    #[test]
    fn explicit_https_url_is_kept() {
        let url = parse_url("https://example.com:8443/vars").unwrap();
        assert_eq!(url.as_str(), "https://example.com:8443/vars");
    }

    #[test]
    fn host_starting_with_http_gets_scheme_and_path() {
        let url = parse_url("http-api:9000").unwrap();
        assert_eq!(url.as_str(), "http://http-api:9000/debug/vars");
    }

    #[test]
    fn bad_host_is_rejected() {
        assert!(parse_url("http://^").is_err());
    }

    #[test]
    fn service_new_normalizes_endpoint() {
        let service = Service::new("api", "10.0.0.1:9000").unwrap();
        assert_eq!(service.name, "api");
        assert_eq!(service.endpoint.as_str(), "http://10.0.0.1:9000/debug/vars");
    }
}
