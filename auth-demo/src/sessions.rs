use std::{
    collections::HashMap,
    fmt::Write,
    sync::Mutex,
    time::{Duration, Instant},
};

use rand::Rng;

/// The longest a session may live.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Session {
    user: String,
    expires: Instant,
}

impl Session {
    fn is_live(&self, now: Instant) -> bool {
        self.expires > now
    }
}

/// In-memory login sessions keyed by an opaque random token.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

fn new_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().fold(String::with_capacity(32), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl SessionStore {
    /// `ttl` is capped at [`MAX_TTL`].
    pub fn new(ttl: Duration) -> SessionStore {
        SessionStore {
            ttl: ttl.min(MAX_TTL),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a session for `user` and return its token.
    pub fn create(&self, user: &str) -> String {
        let token = new_token();
        let now = Instant::now();
        let session = Session {
            user: user.to_owned(),
            expires: now.checked_add(self.ttl).unwrap_or(now),
        };
        self.sessions
            .lock()
            .expect("lock poisoned")
            .insert(token.clone(), session);
        token
    }

    /// The user owning `token`, if the session is still live. Expired
    /// sessions are dropped on lookup.
    pub fn lookup(&self, token: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().expect("lock poisoned");
        match sessions.get(token) {
            Some(s) if s.is_live(Instant::now()) => Some(s.user.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .expect("lock poisoned")
            .remove(token)
            .is_some()
    }

    /// Drop every expired session, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().expect("lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| s.is_live(now));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
