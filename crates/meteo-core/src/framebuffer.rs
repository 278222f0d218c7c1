//! Monochrome framebuffer with per-pixel change detection.
//!
//! [`PixelLcd`] draws the two text rows of the character display into a RAM
//! buffer. Only the rectangle containing changed pixels is flushed to the
//! panel, so redrawing unchanged text costs nothing.

extern crate alloc;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::mono_font::MonoTextStyleBuilder;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::{Baseline, Text};
use log::debug;

use crate::error::{Error, Result};
use crate::reading::OutputKind;
use crate::sinks::CharacterDisplay;
use crate::sinks::ROWS;
use crate::sinks::format::ROW_WIDTH;

const CELL_WIDTH_PX: usize = 6;
const CELL_HEIGHT_PX: usize = 10;

pub const LCD_WIDTH_PX: usize = ROW_WIDTH * CELL_WIDTH_PX;
pub const LCD_HEIGHT_PX: usize = ROWS * CELL_HEIGHT_PX;

const PIXEL_COUNT: usize = LCD_WIDTH_PX * LCD_HEIGHT_PX;

/// Bounding box of pixels that have changed since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyRect {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl DirtyRect {
    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn from_point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }
}

/// `DrawTarget<Color = BinaryColor>` the size of a 16x2 character panel.
pub struct FrameBuffer {
    pixels: Vec<BinaryColor>,
    dirty: Option<DirtyRect>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// A blank buffer. Nothing is dirty until a pixel changes.
    pub fn new() -> Self {
        Self {
            pixels: vec![BinaryColor::Off; PIXEL_COUNT],
            dirty: None,
        }
    }

    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, color: BinaryColor) {
        let idx = y * LCD_WIDTH_PX + x;
        if self.pixels[idx] != color {
            self.pixels[idx] = color;
            match &mut self.dirty {
                Some(rect) => rect.expand(x, y),
                None => self.dirty = Some(DirtyRect::from_point(x, y)),
            }
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<BinaryColor> {
        if x < LCD_WIDTH_PX && y < LCD_HEIGHT_PX {
            Some(self.pixels[y * LCD_WIDTH_PX + x])
        } else {
            None
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Flush the dirty region to `display`, then reset the dirty state.
    ///
    /// Returns the flushed area, `None` if nothing changed.
    pub fn flush<D>(&mut self, display: &mut D) -> core::result::Result<Option<Rectangle>, D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let Some(rect) = self.dirty.take() else {
            return Ok(None);
        };

        let width = rect.max_x - rect.min_x + 1;
        let height = rect.max_y - rect.min_y + 1;

        debug!(
            "Flushing {}x{} dirty region at ({}, {})",
            width, height, rect.min_x, rect.min_y
        );

        let area = Rectangle::new(
            Point::new(rect.min_x as i32, rect.min_y as i32),
            Size::new(width as u32, height as u32),
        );

        let pixels = &self.pixels;
        let pixel_iter = (rect.min_y..=rect.max_y).flat_map(move |y| {
            let row_start = y * LCD_WIDTH_PX + rect.min_x;
            pixels[row_start..row_start + width].iter().copied()
        });

        display.fill_contiguous(&area, pixel_iter)?;
        Ok(Some(area))
    }

    /// Render the buffer as text, `#` for lit pixels.
    pub fn to_ascii(&self) -> String {
        let mut out = String::with_capacity((LCD_WIDTH_PX + 1) * LCD_HEIGHT_PX);
        for row in self.pixels.chunks(LCD_WIDTH_PX) {
            out.extend(row.iter().map(|pixel| if pixel.is_on() { '#' } else { ' ' }));
            out.push('\n');
        }
        out
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(LCD_WIDTH_PX as u32, LCD_HEIGHT_PX as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            let x = coord.x;
            let y = coord.y;
            if x >= 0 && y >= 0 && (x as usize) < LCD_WIDTH_PX && (y as usize) < LCD_HEIGHT_PX {
                self.set_pixel(x as usize, y as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(
        &mut self,
        area: &Rectangle,
        color: Self::Color,
    ) -> core::result::Result<(), Self::Error> {
        let x_start = (area.top_left.x.max(0) as usize).min(LCD_WIDTH_PX);
        let y_start = (area.top_left.y.max(0) as usize).min(LCD_HEIGHT_PX);
        let x_end = (x_start.saturating_add(area.size.width as usize)).min(LCD_WIDTH_PX);
        let y_end = (y_start.saturating_add(area.size.height as usize)).min(LCD_HEIGHT_PX);

        for y in y_start..y_end {
            for x in x_start..x_end {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }
}

/// Character display drawn with a 6x10 font into a [`FrameBuffer`].
#[derive(Default)]
pub struct PixelLcd {
    frame: FrameBuffer,
}

impl PixelLcd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut FrameBuffer {
        &mut self.frame
    }
}

impl CharacterDisplay for PixelLcd {
    fn init(&mut self) -> Result<()> {
        // Infallible target
        let _ = self.frame.clear(BinaryColor::Off);
        Ok(())
    }

    fn write_row(&mut self, row: usize, text: &str) -> Result<()> {
        if row >= ROWS {
            return Err(Error::OutputFailed(OutputKind::Display));
        }

        // Opaque background, so glyphs overwrite whatever was there before
        let style = MonoTextStyleBuilder::new()
            .font(&FONT_6X10)
            .text_color(BinaryColor::On)
            .background_color(BinaryColor::Off)
            .build();
        let origin = Point::new(0, (row * CELL_HEIGHT_PX) as i32);
        let _ = Text::with_baseline(text, origin, style, Baseline::Top).draw(&mut self.frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_matches_character_grid() {
        let frame = FrameBuffer::new();
        assert_eq!(frame.size(), Size::new(96, 20));
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_identical_text_leaves_buffer_clean() {
        let mut lcd = PixelLcd::new();
        let mut panel = FrameBuffer::new();

        lcd.write_row(0, "Temperature     ").unwrap();
        let area = lcd.frame_mut().flush(&mut panel).unwrap();
        assert!(area.is_some_and(|area| area.top_left.y < CELL_HEIGHT_PX as i32));

        lcd.write_row(0, "Temperature     ").unwrap();
        assert!(!lcd.frame().is_dirty());
        assert_eq!(lcd.frame_mut().flush(&mut panel), Ok(None));
        assert_eq!(panel.to_ascii(), lcd.frame().to_ascii());
    }

    #[test]
    fn test_second_row_only_dirties_lower_half() {
        let mut lcd = PixelLcd::new();
        lcd.write_row(1, "21.0 C").unwrap();

        let mut panel = FrameBuffer::new();
        let area = lcd.frame_mut().flush(&mut panel).unwrap().unwrap();
        assert!(area.top_left.y >= CELL_HEIGHT_PX as i32);
    }

    #[test]
    fn test_rows_out_of_range_fail() {
        let mut lcd = PixelLcd::new();
        assert_eq!(
            lcd.write_row(ROWS, "x"),
            Err(Error::OutputFailed(OutputKind::Display))
        );
    }

    #[test]
    fn test_ascii_dimensions() {
        let text = FrameBuffer::new().to_ascii();
        assert_eq!(text.lines().count(), LCD_HEIGHT_PX);
        assert!(text.lines().all(|line| line.len() == LCD_WIDTH_PX));
    }
}
