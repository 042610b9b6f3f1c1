//! Graph store credentials. Writes only accept a [`ReadWriteCredential`] and
//! the retriever only ever holds a [`ReadOnlyCredential`], so the type system
//! keeps the query path away from mutations.

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct ReadOnlyCredential {
    user: String,
    password: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ReadWriteCredential {
    user: String,
    password: String,
}

impl ReadOnlyCredential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl ReadWriteCredential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ReadOnlyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyCredential")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for ReadWriteCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteCredential")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
