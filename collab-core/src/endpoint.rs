//! URLs derived from the configured API base.

use url::Url;

use crate::error::{CollabError, CollabResult};

/// Append `segments` to the base URL's path, percent-encoding each one.
///
/// # Errors
///
/// Returns [`CollabError::InvalidBaseUrl`] if `base` cannot carry a path
/// (e.g. `mailto:`).
pub fn api_endpoint(base: &Url, segments: &[&str]) -> CollabResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| CollabError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Socket endpoint for `session_id`: `{base}/collaboration/session/{id}/ws`
/// with `http` mapped to `ws` and `https` to `wss`.
///
/// # Errors
///
/// Returns [`CollabError::UnsupportedScheme`] for schemes other than
/// http(s)/ws(s), and [`CollabError::InvalidBaseUrl`] as for [`api_endpoint`].
pub fn session_socket_url(base: &Url, session_id: &str) -> CollabResult<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(CollabError::UnsupportedScheme(other.to_string())),
    };

    let mut url = api_endpoint(base, &["collaboration", "session", session_id, "ws"])?;
    url.set_scheme(scheme)
        .map_err(|()| CollabError::UnsupportedScheme(base.scheme().to_string()))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).expect("url")
    }

    #[test]
    fn test_http_becomes_ws() {
        let url = session_socket_url(&base("http://localhost:3000/api"), "s1").expect("url");
        assert_eq!(url.as_str(), "ws://localhost:3000/api/collaboration/session/s1/ws");
    }

    #[test]
    fn test_https_becomes_wss_and_trailing_slash_is_ignored() {
        let url = session_socket_url(&base("https://edpsych.example/api/"), "abc").expect("url");
        assert_eq!(url.as_str(), "wss://edpsych.example/api/collaboration/session/abc/ws");
    }

    #[test]
    fn test_session_id_is_percent_encoded() {
        let url = session_socket_url(&base("http://h/api"), "a b/c").expect("url");
        assert_eq!(url.path(), "/api/collaboration/session/a%20b%2Fc/ws");
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            session_socket_url(&base("ftp://h/api"), "s1"),
            Err(CollabError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn test_api_endpoint() {
        let url = api_endpoint(&base("http://h:3000/api"), &["collaboration", "session"])
            .expect("url");
        assert_eq!(url.as_str(), "http://h:3000/api/collaboration/session");
        assert!(matches!(
            api_endpoint(&base("mailto:someone@example.com"), &["x"]),
            Err(CollabError::InvalidBaseUrl(_))
        ));
    }
}
