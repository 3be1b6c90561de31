//! Cookie handling for both ends of a call.
//!
//! Servers parse the `Cookie` request header into a [`CookieJar`] and hand it
//! to handlers through the call context. Clients keep a [`CookieStore`] that
//! absorbs `Set-Cookie` response headers and replays the jar on every request.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

/// A set of cookies keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

impl CookieJar {
    pub fn new() -> CookieJar {
        CookieJar::default()
    }

    /// Parse a `Cookie` request header. Pairs without a `=` or with an empty
    /// name are skipped; a repeated name keeps the last value.
    pub fn parse_header(header: &str) -> CookieJar {
        let mut jar = CookieJar::new();
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            jar.insert(name, unquote(value.trim()));
        }
        jar
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|x| x.as_str())
    }

    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cookies.remove(name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the jar as a `Cookie` request header value.
    pub fn to_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Some(pairs.join("; "))
    }

    /// Apply a `Set-Cookie` instruction: an expiring cookie is removed, any
    /// other replaces the current value.
    pub fn apply(&mut self, set: &SetCookie) {
        if set.is_removal() {
            self.remove(&set.name);
        } else {
            self.insert(set.name.clone(), set.value.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn parse(s: &str) -> Option<SameSite> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Some(SameSite::Strict),
            "lax" => Some(SameSite::Lax),
            "none" => Some(SameSite::None),
            _ => None,
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// A `Set-Cookie` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub max_age: Option<Duration>,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl SetCookie {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> SetCookie {
        SetCookie {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
            same_site: None,
        }
    }

    /// A cookie that tells the client to forget `name`.
    pub fn removal<N: Into<String>>(name: N) -> SetCookie {
        SetCookie::new(name, "")
            .with_path("/")
            .with_max_age(Duration::ZERO)
    }

    pub fn with_path<S: Into<String>>(mut self, path: S) -> SetCookie {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> SetCookie {
        self.max_age = Some(max_age);
        self
    }

    pub fn http_only(mut self) -> SetCookie {
        self.http_only = true;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> SetCookie {
        self.same_site = Some(same_site);
        self
    }

    pub fn is_removal(&self) -> bool {
        self.max_age == Some(Duration::ZERO)
    }

    /// Parse a `Set-Cookie` header value. Unknown attributes are ignored.
    pub fn parse(header: &str) -> Option<SetCookie> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let mut set = SetCookie::new(name, unquote(value.trim()));
        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attr.trim(), None),
            };
            match (key.to_ascii_lowercase().as_str(), val) {
                ("path", Some(v)) => set.path = Some(v.to_owned()),
                ("max-age", Some(v)) => {
                    // a negative max-age expires the cookie immediately
                    let secs = v.parse::<i64>().ok()?;
                    set.max_age = Some(Duration::from_secs(secs.max(0) as u64));
                }
                ("httponly", _) => set.http_only = true,
                ("samesite", Some(v)) => set.same_site = SameSite::parse(v),
                _ => {}
            }
        }
        Some(set)
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

/// A cookie jar shared between clones of a client.
#[derive(Debug, Clone, Default)]
pub struct CookieStore {
    jar: Arc<Mutex<CookieJar>>,
}

impl CookieStore {
    pub fn new() -> CookieStore {
        CookieStore::default()
    }

    pub fn insert<N: Into<String>, V: Into<String>>(&self, name: N, value: V) {
        self.jar.lock().expect("lock poisoned").insert(name, value);
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.jar.lock().expect("lock poisoned").remove(name)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let jar = self.jar.lock().expect("lock poisoned");
        jar.get(name).map(|x| x.to_owned())
    }

    pub fn snapshot(&self) -> CookieJar {
        self.jar.lock().expect("lock poisoned").clone()
    }

    pub fn header(&self) -> Option<String> {
        self.jar.lock().expect("lock poisoned").to_header()
    }

    /// Apply every `Set-Cookie` header of a response.
    pub fn absorb<'a, I: IntoIterator<Item = &'a str>>(&self, headers: I) {
        let mut jar = self.jar.lock().expect("lock poisoned");
        for header in headers {
            match SetCookie::parse(header) {
                Some(set) => {
                    log::debug!("absorbing cookie {}", set.name);
                    jar.apply(&set);
                }
                None => log::warn!("ignoring malformed set-cookie header"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("a=1", &[("a", "1")])]
    #[case("a=1; b=2", &[("a", "1"), ("b", "2")])]
    #[case(" a = 1 ;b=\"two\"", &[("a", "1"), ("b", "two")])]
    #[case("a=1; junk; =3; a=4", &[("a", "4")])]
    #[case("token=abc=def", &[("token", "abc=def")])]
    #[case("", &[])]
    fn parse_cookie_header(#[case] header: &str, #[case] expected: &[(&str, &str)]) {
        let jar = CookieJar::parse_header(header);
        let pairs: Vec<(&str, &str)> = jar.iter().collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn header_round_trip() {
        let mut jar = CookieJar::new();
        assert_eq!(jar.to_header(), None);
        jar.insert("b", "2");
        jar.insert("a", "1");
        assert_eq!(jar.to_header().as_deref(), Some("a=1; b=2"));
        assert_eq!(CookieJar::parse_header("a=1; b=2"), jar);
    }

    #[test]
    fn set_cookie_renders_attributes() {
        let set = SetCookie::new("qubit-auth", "abc")
            .with_path("/")
            .with_max_age(Duration::from_secs(3600))
            .http_only()
            .with_same_site(SameSite::Lax);
        assert_eq!(
            set.to_string(),
            "qubit-auth=abc; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax"
        );
        assert_eq!(SetCookie::parse(&set.to_string()), Some(set));
    }

    #[rstest]
    #[case("a=1; Max-Age=0")]
    #[case("a=1; max-age=-5; Path=/")]
    fn expiring_cookies_are_removals(#[case] header: &str) {
        assert!(SetCookie::parse(header).unwrap().is_removal());
    }

    #[test]
    fn set_cookie_rejects_garbage() {
        assert_eq!(SetCookie::parse("novalue"), None);
        assert_eq!(SetCookie::parse("=1"), None);
        assert_eq!(SetCookie::parse("a=1; Max-Age=soon"), None);
    }

    #[test]
    fn store_absorbs_and_forgets() {
        let store = CookieStore::new();
        let clone = store.clone();
        store.absorb(["session=xyz; Path=/; HttpOnly", "theme=dark"]);
        assert_eq!(clone.header().as_deref(), Some("session=xyz; theme=dark"));

        store.absorb([SetCookie::removal("session").to_string().as_str()]);
        assert_eq!(clone.get("session"), None);
        assert_eq!(clone.get("theme").as_deref(), Some("dark"));
    }
}
