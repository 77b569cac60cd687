use std::env;
use std::fmt;

use log::debug;

use crate::error::{FetchError, Result};

pub const USERNAME_VAR: &str = "FACTORIO_USERNAME";
pub const TOKEN_VAR: &str = "FACTORIO_TOKEN";

/// Username and API token sent as query parameters on every download.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Read credentials from the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("env: loaded {}", path.display()),
            Err(err) => debug!("env: no .env loaded ({err})"),
        }
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |var: &'static str| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .ok_or(FetchError::MissingCredentials { var })
        };
        Ok(Self::new(read(USERNAME_VAR)?, read(TOKEN_VAR)?))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_both_variables() {
        let creds =
            Credentials::from_lookup(lookup(&[(USERNAME_VAR, "engineer"), (TOKEN_VAR, "abc")]))
                .unwrap();
        assert_eq!(creds.username(), "engineer");
        assert_eq!(creds.token(), "abc");
    }

    #[test]
    fn reports_the_missing_variable() {
        let err = Credentials::from_lookup(lookup(&[(USERNAME_VAR, "engineer")])).unwrap_err();
        assert!(matches!(err, FetchError::MissingCredentials { var } if var == TOKEN_VAR));

        let err = Credentials::from_lookup(lookup(&[(USERNAME_VAR, " "), (TOKEN_VAR, "abc")]))
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingCredentials { var } if var == USERNAME_VAR));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let rendered = format!("{:?}", Credentials::new("engineer", "very-secret"));
        assert!(rendered.contains("engineer"));
        assert!(!rendered.contains("very-secret"));
    }
}
