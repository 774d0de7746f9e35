//! `rover-cockpit` – the operator-facing HTTP + WebSocket surface.
//!
//! Boots a small server (default port `8080`) that:
//!
//! 1. **Serves** the embedded operator page at `/`.
//! 2. **Dispatches** JSON control envelopes from `/control` to the rover's
//!    subsystems through the [`Dispatcher`], one command at a time per
//!    connection.
//! 3. **Streams** microphone chunks to, and speaker buffers from,
//!    `/audiostream`, and the camera as MJPEG on `/videostream`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_cockpit::CockpitServer;
//! use rover_hal::RoverHardware;
//! use rover_runtime::{Rover, RoverConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let rover = Rover::assemble(RoverHardware::new(), RoverConfig::default())
//!         .await
//!         .expect("assemble");
//!     let (_stop, stop_rx) = tokio::sync::watch::channel(false);
//!     CockpitServer::new(Arc::new(rover))
//!         .run_until(stop_rx)
//!         .await
//!         .expect("cockpit server failed");
//! }
//! ```

pub mod dispatcher;
pub mod server;

pub use dispatcher::Dispatcher;
pub use server::{CockpitServer, DEFAULT_PORT};
