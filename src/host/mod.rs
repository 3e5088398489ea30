//! The host launch controller.
//!
//! [`HostController::launch`] runs one managed program. The sequence is fixed:
//!
//! ```text
//! LaunchGuard ──► runtime root ──► patch lookup ──► base profile
//!                                                        │
//!      ┌─────────────────────────────────────────────────┘
//!      ▼
//! base hooks ──► overlay decision ──► overlay / clear flag ──► preload ──► install patches
//!                                            │                                   │
//!                                            │                                   ▼
//!                                            └──────── restored ◄──────── run entry point
//! ```
//!
//! Everything before the overlay step either fails without side effects or only touches the
//! base profile, which is meant to persist. Everything after it runs under a drop guard that
//! puts the overlay variables back.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`controller`] | [`HostController`] |
//! | [`request`] | [`LaunchRequest`] and [`LaunchOutcome`] |

pub mod controller;
pub mod request;

pub use controller::HostController;
pub use request::{LaunchOutcome, LaunchRequest, LaunchRequestBuilder};
