pub mod acquire;
pub mod aggregate;
pub mod args;
pub mod exfil;
pub mod fault;
pub mod inject;
pub mod integrity;
pub mod mailbox;
pub mod pipeline;
pub mod sample;
pub mod sensor;
pub mod storage;
pub mod watchdog;
pub mod window;

use std::time::Duration;

// Sampling cadence. 5 ms = 200 Hz, the fastest rate the analog front end was
// validated at. WINDOW_DURATION_MS must divide evenly by the period.
pub const SAMPLE_PERIOD_MS: u64 = 5;
// How much time one window covers
pub const WINDOW_DURATION_MS: u64 = 10_000;
// How many samples land in a window before it is frozen and flushed
pub const WINDOW_LEN: usize = (WINDOW_DURATION_MS / SAMPLE_PERIOD_MS) as usize;
// Outstanding samples the mailbox can hold
pub const MAILBOX_CAPACITY: usize = 32;

// Generous relative to the tick period, so a timeout means the other side of
// the mailbox has actually stalled rather than jittered
pub const MAILBOX_TIMEOUT: Duration = Duration::from_secs(2);
// How long the aggregator will wait for a spare window at swap time
pub const SWAP_TIMEOUT: Duration = Duration::from_secs(2);
// Storage lock acquisition bound; past this we assume a deadlock
pub const STORAGE_LOCK_TIMEOUT: Duration = Duration::from_millis(200);
// Hardware watchdog window
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);
// Delay between the restart request and process exit, so diagnostics flush
pub const RESTART_GRACE: Duration = Duration::from_secs(5);
