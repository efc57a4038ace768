/// Sled tree holding the last message published on each channel
pub(crate) const MESSAGE_TREE: &str = "live_messages";

/// Built-in feature namespaces under the `grafana` scope
pub const NS_BROADCAST: &str = "broadcast";
pub const NS_CHAT: &str = "chat";
pub const NS_COMMENT: &str = "comment";
pub const NS_DASHBOARD: &str = "dashboard";
pub const NS_METRICS: &str = "metrics";
pub const NS_NOTICE: &str = "notice";
pub const NS_TESTDATA: &str = "testdata";

/// Default per-channel fan-out buffer of the in-process hub
pub(crate) const HUB_CHANNEL_CAPACITY: usize = 256;
