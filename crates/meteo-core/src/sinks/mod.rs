//! Output sinks
//!
//! A sink turns a [`Reading`] into something a person can see. It renders
//! failed readings too, as `Error <name>`, so a broken sensor stays visible.

mod console;
mod display;
pub mod format;

pub use console::ConsoleSink;
pub use display::{CharacterDisplay, DisplaySink, ROWS};

use crate::error::{Error, Result};
use crate::reading::Reading;

pub trait Sink {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Show one reading, successful or failed.
    fn render(&mut self, reading: &Reading) -> Result<()>;

    /// Show an error that has no reading attached (initialization, routing).
    fn report(&mut self, error: &Error) -> Result<()>;

    /// Paged sinks show one reading at a time, so a batch of readings written
    /// in a single call would only leave the last one visible.
    fn is_paged(&self) -> bool {
        false
    }
}
