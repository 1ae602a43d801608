//! Communication medium abstraction.

use crate::types::TagReading;

/// A medium (e.g. a tag or radio medium) updated once per tick, after the
/// physics engines.
///
/// Propagation models live entirely inside the implementation. The space
/// hands each medium the enabled tags currently indexed in it.
pub trait Medium: Send {
    /// Returns the medium's ID.
    fn id(&self) -> &str;
    
    /// Updates the medium for the current tick.
    fn update(&mut self, tags: &[TagReading]);
    
    /// Restores the medium to its post-initialization state.
    fn reset(&mut self) {}
}
