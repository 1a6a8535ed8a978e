//! auth::credentials
//!
//! Username and password for one remote.
//!
//! [`Password`] implements neither `Display` nor `Serialize`, and its
//! `Debug` output is redacted. The only way to read the value is
//! [`Password::expose`], called at the point it is handed to the transport.

/// A password or access token.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret. Never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Credentials for the remote, owned by the sync engine for one session.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: Option<Password>,
    /// Set when the remote rejected the current credentials.
    pub needs_password: bool,
}

impl Credentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            needs_password: false,
        }
    }

    pub fn with_password(mut self, password: Password) -> Self {
        self.password = Some(password);
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    /// Replace the password; a new value clears `needs_password`.
    pub fn set_password(&mut self, password: Option<Password>) {
        self.needs_password = password.is_none() && self.needs_password;
        self.password = password;
    }

    /// Drop the password, keeping the username.
    pub fn clear(&mut self) {
        self.password = None;
    }
}
