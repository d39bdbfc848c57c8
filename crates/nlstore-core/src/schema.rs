use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::storage::{Parsed, safe_parse_json};
use crate::store::StoreContext;

/// Bump when the persisted task schema changes, and add a matching arm to
/// [`migrate`].
pub const SCHEMA_VERSION: u32 = 1;

pub mod keys {
    pub const TASKS: &str = "nlstore:tasks";
    pub const THEME: &str = "nlstore:theme";
    pub const VERSION: &str = "nlstore:version";
}

/// Pure migration chain over the raw task payload. Runs one step per
/// version from `from` up to `to`.
pub fn migrate(payload: Value, from: u32, to: u32) -> Value {
    let mut current = payload;
    for version in from..to {
        debug!(from = version, to = version + 1, "running schema migration step");
        current = match version {
            // future migration steps land here, one arm per version bump
            _ => current,
        };
    }
    current
}

/// Bring the persisted schema up to [`SCHEMA_VERSION`]. A missing version
/// entry is treated as current and stamped; an older one migrates the raw
/// task payload and bumps the stored version. Best effort throughout, like
/// every other storage access.
#[instrument(skip(ctx))]
pub fn ensure_schema_version(ctx: &StoreContext) {
    let stored = match safe_parse_json::<u32>(ctx.get_raw(keys::VERSION).as_deref()) {
        Parsed::Value(version) => Some(version),
        Parsed::Missing | Parsed::Malformed(_) => None,
    };

    let from = stored.unwrap_or(SCHEMA_VERSION);
    if from < SCHEMA_VERSION {
        if let Parsed::Value(payload) =
            safe_parse_json::<Value>(ctx.get_raw(keys::TASKS).as_deref())
        {
            let migrated = migrate(payload, from, SCHEMA_VERSION);
            ctx.set_item(keys::TASKS, &migrated);
        }
        info!(from, to = SCHEMA_VERSION, "migrated task schema");
    }

    if stored != Some(SCHEMA_VERSION) {
        ctx.set_item(keys::VERSION, &SCHEMA_VERSION);
    }
}
