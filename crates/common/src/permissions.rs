// Per-action permission sets for documents and columns.
//
// Each action (read/write/delete) carries a list of audience tokens:
// "all", "authenticated", or a specific user id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is looking at (or editing) a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(Uuid),
}

impl Viewer {
    pub fn user_id(self) -> Option<Uuid> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }
}

impl From<Option<Uuid>> for Viewer {
    fn from(id: Option<Uuid>) -> Self {
        id.map_or(Self::Anonymous, Self::User)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    Delete,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audience token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Audience {
    All,
    Authenticated,
    User(Uuid),
}

impl Audience {
    pub fn admits(&self, viewer: Viewer) -> bool {
        match (self, viewer) {
            (Self::All, _) => true,
            (Self::Authenticated, Viewer::User(_)) => true,
            (Self::Authenticated, Viewer::Anonymous) => false,
            (Self::User(expected), Viewer::User(actual)) => *expected == actual,
            (Self::User(_), Viewer::Anonymous) => false,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::User(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "authenticated" => Ok(Self::Authenticated),
            other => Uuid::parse_str(other)
                .map(Self::User)
                .map_err(|_| format!("invalid audience token `{other}`")),
        }
    }
}

impl TryFrom<String> for Audience {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Audience> for String {
    fn from(value: Audience) -> Self {
        value.to_string()
    }
}

/// Audience lists per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub read: Vec<Audience>,
    #[serde(default)]
    pub write: Vec<Audience>,
    #[serde(default)]
    pub delete: Vec<Audience>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self { read: vec![Audience::All], write: vec![Audience::All], delete: vec![Audience::All] }
    }
}

impl Permissions {
    /// Restrict every action to a single user.
    pub fn owner_only(owner: Uuid) -> Self {
        let only = vec![Audience::User(owner)];
        Self { read: only.clone(), write: only.clone(), delete: only }
    }

    pub fn audience(&self, action: Action) -> &[Audience] {
        match action {
            Action::Read => &self.read,
            Action::Write => &self.write,
            Action::Delete => &self.delete,
        }
    }

    pub fn allows(&self, action: Action, viewer: Viewer) -> bool {
        self.audience(action).iter().any(|audience| audience.admits(viewer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permissions_admit_anonymous() {
        let perms = Permissions::default();
        assert!(perms.allows(Action::Read, Viewer::Anonymous));
        assert!(perms.allows(Action::Delete, Viewer::Anonymous));
    }

    #[test]
    fn authenticated_requires_a_user() {
        let perms = Permissions {
            read: vec![Audience::Authenticated],
            write: vec![],
            delete: vec![],
        };
        assert!(!perms.allows(Action::Read, Viewer::Anonymous));
        assert!(perms.allows(Action::Read, Viewer::User(Uuid::new_v4())));
        assert!(!perms.allows(Action::Write, Viewer::User(Uuid::new_v4())));
    }

    #[test]
    fn owner_only_admits_just_the_owner() {
        let owner = Uuid::new_v4();
        let perms = Permissions::owner_only(owner);
        assert!(perms.allows(Action::Write, Viewer::User(owner)));
        assert!(!perms.allows(Action::Write, Viewer::User(Uuid::new_v4())));
    }

    #[test]
    fn audience_serializes_as_bare_token() {
        let user = Uuid::new_v4();
        let perms = Permissions {
            read: vec![Audience::All],
            write: vec![Audience::Authenticated],
            delete: vec![Audience::User(user)],
        };
        let json = serde_json::to_value(&perms).unwrap();
        assert_eq!(json["read"][0], "all");
        assert_eq!(json["write"][0], "authenticated");
        assert_eq!(json["delete"][0], user.to_string());

        let parsed: Permissions = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, perms);
    }

    #[test]
    fn invalid_audience_token_is_rejected() {
        let err = serde_json::from_str::<Permissions>(r#"{"read":["admins"]}"#).unwrap_err();
        assert!(err.to_string().contains("invalid audience token"));
    }
}
