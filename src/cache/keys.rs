//! Listing cache keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::http::{HeaderMap, header};

/// Namespace shared by every cached global-index page.
pub const INDEX_NAMESPACE: &str = "index_page";

/// Cookie whose value separates one requester's cached pages from another's.
pub const SESSION_COOKIE: &str = "sessionid";

/// Identifies one cached rendering: the view, its query and the requester's session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub namespace: &'static str,
    pub path: String,
    pub query_hash: u64,
    /// Raw session cookie value; `None` for anonymous requests.
    pub session: Option<String>,
}

impl ListingKey {
    pub fn index(path: impl Into<String>, query: &str, session: Option<String>) -> Self {
        Self {
            namespace: INDEX_NAMESPACE,
            path: path.into(),
            query_hash: hash_query(query),
            session,
        }
    }
}

/// Value of the session cookie, if the request carries a non-empty one.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash a raw query string for key composition.
pub fn hash_query(query: &str) -> u64 {
    hash_value(&query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_produce_distinct_keys() {
        let anonymous = ListingKey::index("/", "", None);
        let alice = ListingKey::index("/", "", Some("alice".to_string()));
        let bob = ListingKey::index("/", "", Some("bob".to_string()));

        assert_ne!(anonymous, alice);
        assert_ne!(alice, bob);
        assert_eq!(alice, ListingKey::index("/", "", Some("alice".to_string())));
    }

    #[test]
    fn session_cookie_is_extracted_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; sessionid=abc123; lang=en".parse().unwrap(),
        );
        assert_eq!(session_from_headers(&headers).as_deref(), Some("abc123"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, "sessionid=".parse().unwrap());
        assert_eq!(session_from_headers(&empty), None);
        assert_eq!(session_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn page_query_is_part_of_the_key() {
        let first = ListingKey::index("/", "page=1", None);
        let second = ListingKey::index("/", "page=2", None);
        assert_ne!(first, second);
        assert_eq!(first.namespace, INDEX_NAMESPACE);
    }
}
