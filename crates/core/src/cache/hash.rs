//! Request key generation.

use sha2::{Digest, Sha256};

use crate::http::Request;

/// Compute the cache key for a request.
///
/// Fragments never reach the key; the query string does.
pub fn compute_cache_key(method: &str, url: &str, vary_fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary_fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

/// `name=value` pairs for the configured vary headers, lowercased and in config order.
pub fn vary_fingerprint(request: &Request, vary_headers: &[String]) -> String {
    vary_headers
        .iter()
        .map(|name| {
            let name = name.to_ascii_lowercase();
            let value = request.header(&name).unwrap_or("");
            format!("{name}={value}")
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// The canonical identity of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub cache_key: String,
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(request: &Request, vary_headers: &[String]) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        let method = request.method.to_ascii_uppercase();
        let cache_key = compute_cache_key(&method, url.as_str(), &vary_fingerprint(request, vary_headers));
        Self { cache_key, method, url: url.to_string() }
    }

    /// A synthetic key stored verbatim, used for bookkeeping entries.
    pub fn reserved(name: &str) -> Self {
        Self { cache_key: name.to_string(), method: "GET".into(), url: name.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_hash_stability() {
        let a = RequestKey::new(&get("http://localhost/x"), &[]);
        let b = RequestKey::new(&get("http://localhost/x"), &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_ignores_fragment() {
        let a = RequestKey::new(&get("http://localhost/x#top"), &[]);
        let b = RequestKey::new(&get("http://localhost/x"), &[]);
        assert_eq!(a.cache_key, b.cache_key);
        assert_eq!(a.url, "http://localhost/x");
    }

    #[test]
    fn test_hash_keeps_query() {
        let a = RequestKey::new(&get("http://localhost/x?v=1"), &[]);
        let b = RequestKey::new(&get("http://localhost/x?v=2"), &[]);
        assert_ne!(a.cache_key, b.cache_key);
    }

    #[test]
    fn test_hash_method() {
        let a = compute_cache_key("get", "http://localhost/x", "");
        let b = compute_cache_key("GET", "http://localhost/x", "");
        let c = compute_cache_key("HEAD", "http://localhost/x", "");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_vary_headers() {
        let vary = vec!["Accept-Language".to_string()];
        let en = get("http://localhost/").with_header("accept-language", "en");
        let de = get("http://localhost/").with_header("Accept-Language", "de");
        assert_eq!(vary_fingerprint(&en, &vary), "accept-language=en");
        assert_ne!(RequestKey::new(&en, &vary).cache_key, RequestKey::new(&de, &vary).cache_key);
        assert_eq!(RequestKey::new(&en, &[]).cache_key, RequestKey::new(&de, &[]).cache_key);
    }

    #[test]
    fn test_hash_format() {
        let key = RequestKey::new(&get("http://localhost/x"), &[]);
        assert_eq!(key.cache_key.len(), 64);
        assert!(key.cache_key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
