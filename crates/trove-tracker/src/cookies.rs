//! Cookie jar for a single tracker host that can be cleared and exported.
//!
//! Storage and matching follow RFC 6265 through `cookie_store`, so
//! `Expires`, `Max-Age`, `Domain` and `Path` are all honoured.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use cookie_store::{CookieStore as Rfc6265Store, RawCookie};
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use tracing::debug;

/// Cookie jar shared with the HTTP client.
#[derive(Debug)]
pub struct SessionCookies {
    origin: Url,
    store: RwLock<Rfc6265Store>,
}

impl SessionCookies {
    /// Empty jar; restored cookies are scoped to `origin` with path `/`.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            store: RwLock::new(Rfc6265Store::default()),
        }
    }

    /// Drop every cookie.
    pub fn clear(&self) {
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Name and value of every unexpired cookie.
    #[must_use]
    pub fn export(&self) -> BTreeMap<String, String> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_unexpired()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect()
    }

    /// Replace the jar contents.
    pub fn restore(&self, cookies: BTreeMap<String, String>) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.clear();
        for (name, value) in cookies {
            let cookie = RawCookie::build((name, value)).path("/").build();
            if let Err(err) = store.insert_raw(&cookie, &self.origin) {
                debug!(cookie = cookie.name(), error = %err, "dropping cached cookie");
            }
        }
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let parsed = cookie_headers
            .filter_map(|header| header.to_str().ok())
            .filter_map(|text| RawCookie::parse(text).ok())
            .map(RawCookie::into_owned);
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .store_response_cookies(parsed, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let joined = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            return None;
        }
        HeaderValue::from_str(&joined).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://tracker.example/")
            .and_then(|base| base.join(path))
            .unwrap_or_else(|_| unreachable!())
    }

    fn receive(jar: &SessionCookies, headers: &[&'static str]) {
        let headers: Vec<HeaderValue> = headers
            .iter()
            .copied()
            .map(HeaderValue::from_static)
            .collect();
        jar.set_cookies(&mut headers.iter(), &url("login.php"));
    }

    fn sent(jar: &SessionCookies, path: &str) -> Vec<String> {
        let mut pairs: Vec<String> = jar
            .cookies(&url(path))
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|joined| joined.split("; ").map(str::to_string).collect())
            .unwrap_or_default();
        pairs.sort();
        pairs
    }

    #[test]
    fn stores_and_renders_cookies() {
        let jar = SessionCookies::new(url(""));
        receive(
            &jar,
            &["session=abc; Path=/; HttpOnly", "keeplogged=xyz; Path=/; Max-Age=3600"],
        );
        assert_eq!(sent(&jar, "ajax.php"), vec!["keeplogged=xyz", "session=abc"]);
    }

    #[test]
    fn max_age_and_expires_both_remove_cookies() {
        let jar = SessionCookies::new(url(""));
        receive(&jar, &["session=abc; Path=/", "keeplogged=xyz; Path=/"]);
        receive(&jar, &["session=deleted; Path=/; Max-Age=0"]);
        assert_eq!(sent(&jar, "ajax.php"), vec!["keeplogged=xyz"]);

        receive(
            &jar,
            &["keeplogged=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"],
        );
        assert!(jar.cookies(&url("ajax.php")).is_none());
        assert!(jar.export().is_empty());
    }

    #[test]
    fn path_and_domain_scope_cookies() {
        let jar = SessionCookies::new(url(""));
        receive(
            &jar,
            &[
                "session=abc; Path=/",
                "staff=1; Path=/staff",
                "foreign=1; Domain=elsewhere.example; Path=/",
            ],
        );
        assert_eq!(sent(&jar, "ajax.php"), vec!["session=abc"]);
        assert_eq!(sent(&jar, "staff/tools.php"), vec!["session=abc", "staff=1"]);
        assert!(!jar.export().contains_key("foreign"));
    }

    #[test]
    fn export_restore_and_clear() {
        let jar = SessionCookies::new(url(""));
        let saved = BTreeMap::from([("session".to_string(), "abc".to_string())]);
        jar.restore(saved.clone());
        assert_eq!(jar.export(), saved);
        assert_eq!(sent(&jar, "torrents.php"), vec!["session=abc"]);
        jar.clear();
        assert!(jar.export().is_empty());
    }
}
