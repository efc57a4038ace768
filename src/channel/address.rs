//! Channel addressing.
//!
//! A channel is written `{orgId}/{scope}/{namespace}/{path}` on the wire. The
//! org-less remainder (`{scope}/{namespace}/{path}`) is what handlers and the
//! publisher see; the org-qualified form is the key for stream registration,
//! presence and leader leases.

use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::Result;
use crate::ValidationError;

pub type OrgId = i64;

/// First component of a channel: which family of handlers owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Built-in features (broadcast, chat, dashboard, notice, ...)
    Grafana,
    /// Streams served by a plugin, namespace is the plugin id
    Plugin,
    /// Streams served by a datasource's plugin, namespace is the datasource uid
    Datasource,
    /// Managed push streams, not served by this engine
    Stream,
    /// Resource watch bridge
    Watch,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Grafana => "grafana",
            Scope::Plugin => "plugin",
            Scope::Datasource => "ds",
            Scope::Stream => "stream",
            Scope::Watch => "watch",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grafana" => Ok(Scope::Grafana),
            "plugin" => Ok(Scope::Plugin),
            "ds" => Ok(Scope::Datasource),
            "stream" => Ok(Scope::Stream),
            "watch" => Ok(Scope::Watch),
            _ => Err(invalid(s, "unknown scope")),
        }
    }
}

/// A validated channel address. Only constructible through [`ChannelAddress::new`]
/// or the parsers, so every value formats back to an equal address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    org_id: OrgId,
    scope: Scope,
    namespace: String,
    path: String,
}

impl ChannelAddress {
    pub fn new(
        org_id: OrgId,
        scope: Scope,
        namespace: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let path = path.into();
        let shown = || format!("{}/{}/{}/{}", org_id, scope, namespace, path);

        if org_id <= 0 {
            return Err(invalid(&shown(), "org id must be positive"));
        }
        if !is_valid_namespace(&namespace) {
            return Err(invalid(&shown(), "invalid namespace"));
        }
        if !is_valid_path(&path) {
            return Err(invalid(&shown(), "invalid path"));
        }

        Ok(Self {
            org_id,
            scope,
            namespace,
            path,
        })
    }

    /// Parse the org-qualified form `{orgId}/{scope}/{namespace}/{path}`
    pub fn parse(raw: &str) -> Result<Self> {
        let (org, rest) = raw
            .split_once('/')
            .ok_or_else(|| invalid(raw, "missing org id"))?;
        let org_id: OrgId = org.parse().map_err(|_| invalid(raw, "org id is not a number"))?;
        Self::parse_in_org(org_id, rest)
    }

    /// Parse the org-less form `{scope}/{namespace}/{path}` within `org_id`
    pub fn parse_in_org(
        org_id: OrgId,
        channel: &str,
    ) -> Result<Self> {
        let mut parts = channel.splitn(3, '/');
        let (Some(scope), Some(namespace), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(channel, "expected scope/namespace/path"));
        };
        let scope = scope.parse::<Scope>()?;
        Self::new(org_id, scope, namespace, path)
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Org-less channel, as handed to handlers and the publisher
    pub fn channel(&self) -> String {
        format!("{}/{}/{}", self.scope, self.namespace, self.path)
    }

    /// Org-qualified key used for stream registration, presence and leases
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.org_id, self.scope, self.namespace, self.path
        )
    }
}

impl FromStr for ChannelAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Org-qualified key of an org-less channel
pub fn channel_key(
    org_id: OrgId,
    channel: &str,
) -> String {
    format!("{}/{}", org_id, channel)
}

fn invalid(
    channel: &str,
    reason: &'static str,
) -> Error {
    ValidationError::InvalidChannel {
        channel: channel.to_string(),
        reason,
    }
    .into()
}

fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '=' | '+'))
        })
}
