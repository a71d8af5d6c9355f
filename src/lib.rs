// Increase recursion limit for complex async operations
#![recursion_limit = "256"]

//! fieldops - Offline-first field technician client
//!
//! Technicians track time, photograph their work and record the parts they
//! use on assigned jobs, with or without a connection. Everything is
//! committed to a local SQLite store first and delivered to the server by a
//! durable sync queue once it is reachable.
//!
//! # Module Structure
//!
//! - **`shared`** - Records and validated configuration
//!   - Jobs, time logs, media, parts usage, sync queue items
//!   - `AppConfig` and its builder
//!
//! - **`client`** - Everything that runs on the device
//!   - Local store, sync queue manager, background sync agent
//!   - Connectivity monitor and caching engine
//!   - Time tracking, media pipeline, parts scanning
//!   - `FieldClient` composition root and the egui desktop shell
//!
//! # Usage
//!
//! ```rust,no_run
//! use fieldops::client::{Config, Devices, FieldClient};
//!
//! # async fn example() -> Result<(), fieldops::client::FieldError> {
//! let client = FieldClient::start(Config::load()?, Devices::default()).await?;
//! client.timer().start("JOB-2024-00017").await?;
//! let state = client.sync_state().await?;
//! println!("{} records waiting", state.unsynced());
//! # Ok(())
//! # }
//! ```
//!
//! # Delivery Guarantees
//!
//! - A record is never lost once its local commit returns
//! - Delivery is at least once; the server de-duplicates by record id
//! - Transient failures retry up to three times, then wait for the user
//! - Rejected records stay visible until retried or dismissed
//!
//! # Thread Safety
//!
//! - **Client**: components are cheap `Clone` handles over `Arc` state
//! - **Background agent**: its own tokio task, sharing only the database
//!   and broadcast channels with the foreground
//! - **Native**: egui is single-threaded immediate mode GUI

/// Shared types and data structures
pub mod shared;

/// Device-side client
pub mod client;
