//! Shared-password login sessions and per-visitor display preferences.

pub const SESSION_COOKIE: &str = "chocotube_session";
pub const THEME_COOKIE: &str = "theme";
pub const QUALITY_COOKIE: &str = "vc";
pub const PROXY_COOKIE: &str = "proxy";

const KEY_CONTEXT: &str = "chocotube 2025 session cookie v1";
const SESSION_CLAIM: &[u8] = b"logged_in";

/// Issues and checks the login cookie. The cookie value is a keyed BLAKE3
/// MAC over a fixed claim, so it stays valid until the secret changes.
#[derive(Clone)]
pub struct SessionKeys {
    password: String,
    mac_key: [u8; 32],
}

impl SessionKeys {
    pub fn new(password: &str, secret: &str) -> Self {
        Self {
            password: password.to_string(),
            mac_key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
        }
    }

    pub fn password_matches(&self, candidate: &str) -> bool {
        // Hash comparison is constant time.
        blake3::hash(candidate.as_bytes()) == blake3::hash(self.password.as_bytes())
    }

    pub fn issue_token(&self) -> String {
        blake3::keyed_hash(&self.mac_key, SESSION_CLAIM)
            .to_hex()
            .to_string()
    }

    pub fn verify_token(&self, token: &str) -> bool {
        match blake3::Hash::from_hex(token.trim()) {
            Ok(presented) => presented == blake3::keyed_hash(&self.mac_key, SESSION_CLAIM),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub theme: String,
    /// Search result layout selector, `"1"` by default.
    pub vc: String,
    /// `"True"` routes thumbnails through the local relay.
    pub proxy: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            vc: "1".to_string(),
            proxy: "False".to_string(),
        }
    }
}

impl Preferences {
    /// Reads each preference through `lookup(cookie_name)`; missing or blank
    /// values keep their defaults.
    pub fn from_cookies<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str, fallback: String| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
        };
        Self {
            theme: read(THEME_COOKIE, defaults.theme),
            vc: read(QUALITY_COOKIE, defaults.vc),
            proxy: read(PROXY_COOKIE, defaults.proxy),
        }
    }

    pub fn uses_proxy(&self) -> bool {
        self.proxy.eq_ignore_ascii_case("true")
    }
}
