// Core reannounce library modules

pub mod config;
pub mod cycle;
pub mod daemon_loop;
pub mod gates;
pub mod qbittorrent;
pub mod reannounce;
pub mod session;
pub mod tracker;
pub mod waiter;

// Re-export commonly used types
pub use config::{DaemonConfig, Options, Selector};
pub use cycle::{run_cycle, CycleError, CycleReport, ReannounceOutcome};
pub use daemon_loop::{execute, run_daemon, run_targeted};
pub use qbittorrent::QbitSession;
pub use session::{SessionError, TorrentFilter, Transfer, TransferSession};
