use serde::{Deserialize, Serialize};

/// Who may decrypt a file: named users, plus an optional public link grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessList {
    pub users: Vec<String>,
    pub public: bool,
}

impl AccessList {
    pub fn new(users: Vec<String>, public: bool) -> Self {
        Self { users, public }
    }

    /// Access for the given users only, no public link.
    pub fn for_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            public: false,
        }
    }

    pub fn with_public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn contains(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }
}
