use serde::Deserialize;
use serde::Serialize;

use crate::OrgId;

/// Role of a user inside an organization, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Viewer,
    Editor,
    Admin,
}

impl OrgRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(OrgRole::Viewer),
            "editor" => Some(OrgRole::Editor),
            "admin" => Some(OrgRole::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Viewer => "viewer",
            OrgRole::Editor => "editor",
            OrgRole::Admin => "admin",
        }
    }
}

/// Caller identity resolved by the transport before any dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub org_id: OrgId,
    pub user_id: i64,
    /// Stable external identifier of the user
    pub uid: String,
    pub login: String,
    pub role: OrgRole,
}

impl Principal {
    pub fn new(
        org_id: OrgId,
        user_id: i64,
        uid: impl Into<String>,
        login: impl Into<String>,
        role: OrgRole,
    ) -> Self {
        Self {
            org_id,
            user_id,
            uid: uid.into(),
            login: login.into(),
            role,
        }
    }

    /// True when the principal's role is at least `role`
    pub fn has_role(
        &self,
        role: OrgRole,
    ) -> bool {
        self.role >= role
    }

    pub fn is_admin(&self) -> bool {
        self.role == OrgRole::Admin
    }
}

/// Short user description embedded in enriched payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisplay {
    pub id: i64,
    pub login: String,
}

impl From<&Principal> for UserDisplay {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.user_id,
            login: p.login.clone(),
        }
    }
}
