//! Terminal input service for the crossterm display server.
//!
//! Reads `crossterm::EventStream` and turns terminal keys, mouse reports,
//! focus changes and resizes into windowing-server events addressed to the
//! top-level window of the session whose band the pointer is in. While a
//! button is held every pointer event goes to the band that received the
//! press (an implicit grab), so drags that leave the window keep reporting
//! coordinates relative to it.

mod async_service;
mod key_token;

pub use async_service::{AsyncInputShutdown, is_interrupt};

use async_service::spawn_term_event_task;
use core_display::term::{SharedRoutes, SharedScreen};
use core_events::Inbound;
use std::sync::atomic::AtomicU64;
use tokio::task::JoinHandle;

pub static INPUT_STARTS: AtomicU64 = AtomicU64::new(0);
pub static INPUT_STOP_SIGNAL: AtomicU64 = AtomicU64::new(0);
pub static INPUT_STOP_CHANNEL: AtomicU64 = AtomicU64::new(0);
pub static INPUT_STOP_STREAM: AtomicU64 = AtomicU64::new(0);
pub static INPUT_STOP_ERROR: AtomicU64 = AtomicU64::new(0);
pub static KEY_EVENTS: AtomicU64 = AtomicU64::new(0);
pub static POINTER_EVENTS: AtomicU64 = AtomicU64::new(0);

/// Spawn the terminal input task.
///
/// Returns the `JoinHandle` for the background task alongside a shutdown
/// handle that requests immediate termination.
pub fn spawn_term_input(
    sender: tokio::sync::mpsc::Sender<Inbound>,
    routes: SharedRoutes,
    screen: SharedScreen,
) -> (JoinHandle<()>, AsyncInputShutdown) {
    spawn_term_event_task(sender, routes, screen)
}
