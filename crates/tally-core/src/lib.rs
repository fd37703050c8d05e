//! # Tally Core Library
//!
//! Bookkeeping for recurring per-character chores that reset on fixed UTC
//! boundaries: daily at 00:00, weekly on Wednesday 00:00 and monthly on the
//! first of the month.
//!
//! ## Features
//!
//! - **Reset Arithmetic**: Pure boundary functions over `chrono` instants
//! - **Background Reconciliation**: A tokio task that clears completions once
//!   their period has ended, without overlapping ticks
//! - **Tolerant Storage**: Every persisted key is decoded leniently; malformed
//!   records are repaired or dropped instead of failing the load
//! - **Shared Backends**: Several repositories over one backend stay in sync
//!   through change events
//!
//! ## Core Modules
//!
//! - [`reset`]: Reset boundary calculation
//! - [`models`]: Core data structures and transfer objects
//! - [`repository`]: Data access layer with Repository pattern
//! - [`reconcile`]: Stale completion clearing, one-shot or on a timer
//! - [`projection`]: Filtered, ordered task views
//! - [`storage`]: Key/value backends (memory and SQLite)
//! - [`snapshot`]: Whole-state export and import
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally_core::{
//!     clock::SystemClock,
//!     models::{Frequency, NewTaskData, ReconcilerConfig},
//!     reconcile::Reconciler,
//!     repository::{LocalRepository, TaskRepository},
//!     storage::SqliteStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = SqliteStorage::open("tally.db").await?;
//!     let repo = Arc::new(LocalRepository::open(Arc::new(storage)).await);
//!
//!     repo.add_task(NewTaskData::new("Aria", "Weekly boss", Frequency::Weekly)).await?;
//!
//!     let handle = Reconciler::spawn(repo.clone(), Arc::new(SystemClock), ReconcilerConfig::default());
//!     // ...
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

pub mod calc;
pub mod clock;
pub mod db;
pub mod error;
pub mod ids;
pub mod models;
pub mod projection;
pub mod reconcile;
pub mod repository;
pub mod reset;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod templates;
pub mod timezone;
