//! Resolved credentials

/// Identity attached to a connection after a successful handshake
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    subject: Option<String>,
    scope: Option<String>,
}

impl Credential {
    /// Kind reported to action handlers
    pub const KIND: &'static str = "TOKEN";

    /// Opaque bearer token, no subject known
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            subject: None,
            scope: None,
        }
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        Self::KIND
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &Self::KIND)
            .field("subject", &self.subject)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
