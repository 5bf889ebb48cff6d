use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Staff,
    Admin,
    /// Any role this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Faculty => write!(f, "faculty"),
            Role::Staff => write!(f, "staff"),
            Role::Admin => write!(f, "admin"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

/// Backends hand out either numeric ids or UUID strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Number(id) => write!(f, "{}", id),
            UserId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// Snapshot of the signed-in user as returned by `/users/me`.
///
/// Replaced wholesale on every refetch. The sign-in response embeds a
/// reduced version of this object, so everything past `id` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    /// Remaining backend fields (department, student number, picture url, ...)
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unknown user")
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.role.map(|r| roles.contains(&r)).unwrap_or(false)
    }
}
