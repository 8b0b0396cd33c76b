//! # Event Bus Module
//!
//! Typed publish/subscribe channel owned by each controller session.
//!
//! ## Overview
//!
//! - Publishers emit [`SessionEvent`]s without knowing subscribers
//! - Subscribers pick categories with an [`EventFilter`] and get a
//!   [`SubscriptionId`] back for unsubscribing
//! - Async consumers can poll a broadcast receiver instead
//!
//! ## Usage
//!
//! ```rust
//! use cncwire_core::event_bus::{EventBus, EventCategory, EventFilter, SessionEvent};
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Data]),
//!     |event| {
//!         if let SessionEvent::Raw { line } = event {
//!             println!("<< {}", line);
//!         }
//!     },
//! );
//!
//! bus.publish(SessionEvent::Raw { line: "ok".to_string() });
//! bus.unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
