//! Structural change notifications.

use crate::network::connection::{Connection, PropertyLink};
use crate::network::id::ProcessorId;

/// Receives notifications about structural network changes. `will_*` fires
/// before a mutation is applied, `did_*` after it is fully applied. Every
/// method defaults to doing nothing.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkObserver {
    fn will_add_processor(&mut self, _processor: ProcessorId) {}
    fn did_add_processor(&mut self, _processor: ProcessorId) {}
    fn will_remove_processor(&mut self, _processor: ProcessorId) {}
    fn did_remove_processor(&mut self, _processor: ProcessorId) {}

    fn will_add_connection(&mut self, _connection: Connection) {}
    fn did_add_connection(&mut self, _connection: Connection) {}
    fn will_remove_connection(&mut self, _connection: Connection) {}
    fn did_remove_connection(&mut self, _connection: Connection) {}

    fn will_add_link(&mut self, _link: PropertyLink) {}
    fn did_add_link(&mut self, _link: PropertyLink) {}
    fn will_remove_link(&mut self, _link: PropertyLink) {}
    fn did_remove_link(&mut self, _link: PropertyLink) {}

    /// A property value changed.
    fn on_network_changed(&mut self) {}

    /// The outermost network lock was released.
    fn on_network_unlocked(&mut self) {}
}
