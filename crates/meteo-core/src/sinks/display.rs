use log::{debug, error};

use super::Sink;
use super::format::{Body, ROW_WIDTH, Title, fit};
use crate::error::{Error, Result};
use crate::reading::{OutputKind, Reading};

/// Rows of the character display
pub const ROWS: usize = 2;

type Row = heapless::String<ROW_WIDTH>;

/// A 16x2 character display.
pub trait CharacterDisplay {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Replace row `row` with `text`, which is exactly 16 characters wide.
    fn write_row(&mut self, row: usize, text: &str) -> Result<()>;
}

/// Paged sink showing one reading at a time: title on the first row, value on
/// the second.
///
/// The whole frame is built before anything is written, and only rows that
/// changed since the last frame are sent to the display.
pub struct DisplaySink<D> {
    display: D,
    shown: Option<[Row; ROWS]>,
}

impl<D: CharacterDisplay> DisplaySink<D> {
    pub fn new(display: D) -> Self {
        Self {
            display,
            shown: None,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    fn commit(&mut self, frame: [Row; ROWS]) -> Result<()> {
        let shown = self.shown.take();
        for (index, row) in frame.iter().enumerate() {
            if shown.as_ref().is_some_and(|shown| shown[index] == *row) {
                continue;
            }
            if let Err(e) = self.display.write_row(index, row) {
                error!("Display row {} failed: {}", index, e);
                return Err(Error::OutputFailed(OutputKind::Display));
            }
        }
        debug!("Display: {:?} / {:?}", frame[0].as_str(), frame[1].as_str());
        self.shown = Some(frame);
        Ok(())
    }
}

impl<D: CharacterDisplay> Sink for DisplaySink<D> {
    fn init(&mut self) -> Result<()> {
        self.shown = None;
        self.display
            .init()
            .map_err(|_| Error::OutputFailed(OutputKind::Display))
    }

    fn render(&mut self, reading: &Reading) -> Result<()> {
        let frame = [
            fit(format_args!("{}", Title(reading))),
            fit(format_args!("{}", Body(reading))),
        ];
        self.commit(frame)
    }

    fn report(&mut self, error: &Error) -> Result<()> {
        let frame = [fit(format_args!("Error")), fit(format_args!("{}", error))];
        self.commit(frame)
    }

    fn is_paged(&self) -> bool {
        true
    }
}
