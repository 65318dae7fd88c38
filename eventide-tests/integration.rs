//! Integration tests for Eventide
//!
//! These tests drive the kernel through its public API only: scheduler
//! backends against each other, the descriptor bridge against real pipes,
//! and the timers on top of a running simulator.

#[path = "style.rs"]
mod style;

#[path = "integration/ordering_properties.rs"]
mod ordering_properties;

#[path = "integration/fd_bridge.rs"]
mod fd_bridge;

#[path = "integration/teardown.rs"]
mod teardown;

#[path = "integration/timers.rs"]
mod timers;
