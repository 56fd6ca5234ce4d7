//! Actor-based polling engine
//!
//! Each monitored printer gets its own poller task; a single scheduler task
//! owns their lifecycle. Actors communicate via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │ SchedulerActor  │◄── re-sync tick (registry + config)
//!                  └────────┬────────┘
//!                           │ spawns / retires / updates
//!              ┌────────────┼────────────┐
//!              │            │            │
//!      ┌───────▼───────┐    │    ┌───────▼───────┐
//!      │ Poller (P-1)  │    │    │ Poller (P-n)  │
//!      └───────┬───────┘    │    └───────┬───────┘
//!              │   acquire permit        │
//!              └───────►┌───────────┐◄───┘
//!                       │ Semaphore │  (worker pool, fleet-wide)
//!                       └───────────┘
//!              probe → normalize → evaluate → state table
//!                           │
//!                 ┌─────────▼──────────┐
//!                 │  NotificationSink  │──► repositories + live channel
//!                 └────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel (PollNow, Resync,
//!    Shutdown, ...) with oneshot channels for request/response
//! 2. **Policy**: thresholds and hysteresis knobs flow over a watch channel,
//!    so a re-sync updates every poller without restarting it
//! 3. **Isolation**: a poller never touches another printer's state; the
//!    semaphore is the only fleet-wide coordination point

pub mod messages;
pub mod poller;
pub mod scheduler;
