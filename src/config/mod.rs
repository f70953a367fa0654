//! Layered configuration.
//!
//! Tiers, lowest to highest priority:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/task-roster/config.yaml`
//! 3. **User** - `~/.task-roster/config.yaml`
//! 4. **Environment** - see below
//!
//! YAML tiers are merged field by field.
//!
//! ## Environment Variables
//! - `TASK_ROSTER_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `TASK_ROSTER_DB_PATH` - Database path
//! - `TASK_ROSTER_HOST` / `BIND_HOST` - Listen address
//! - `TASK_ROSTER_PORT` / `PORT` - Listen port
//! - `TASK_ROSTER_USER_DIR` - User config dir (default: `~/.task-roster`)
//! - `TASK_ROSTER_PROJECT_DIR` - Project config dir (default: `./task-roster`)

mod loader;
mod types;

pub use loader::{ConfigLoader, ConfigPaths};
pub use types::*;
