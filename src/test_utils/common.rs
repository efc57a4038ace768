use once_cell::sync::Lazy;

use crate::OrgRole;
use crate::Principal;

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    Lazy::force(&LOGGER_INIT);
}

pub fn viewer(org_id: i64) -> Principal {
    Principal::new(org_id, 10, "u-viewer", "viewer", OrgRole::Viewer)
}

pub fn editor(org_id: i64) -> Principal {
    Principal::new(org_id, 20, "u-editor", "editor", OrgRole::Editor)
}

pub fn admin(org_id: i64) -> Principal {
    Principal::new(org_id, 30, "u-admin", "admin", OrgRole::Admin)
}
