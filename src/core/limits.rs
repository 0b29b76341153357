// src/core/limits.rs

//! Wall-clock ceilings shared across the protocol: the
//! per-command/per-job `TIMEOUT` and the map family's outer `MAX_TIMEOUT`.

use std::time::Duration;

/// Per-command and per-transfer-setup ceiling.
pub const TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The map family's outer ceiling and the job map's stranded-job age limit:
/// `2 * TIMEOUT + 15s`.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(2 * TIMEOUT.as_secs() + 15);
