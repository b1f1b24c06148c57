//! Long-running background tasks owned by the process supervisor.

pub mod reaper;

pub use reaper::{Reaper, ReaperHandle, ReaperStats};
