//! Monochrome bitmap display (e.g. an SSD1306 OLED on I²C).

use rover_types::RoverError;

/// A monochrome pixel display with an in-memory frame buffer.
///
/// `clear` and `set_pixel` only touch the buffer; `flush` pushes it to the
/// panel.
pub trait BitmapDisplay: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn clear(&mut self);

    fn set_pixel(&mut self, x: u32, y: u32, on: bool);

    fn flush(&mut self) -> Result<(), RoverError>;

    fn reset(&mut self) -> Result<(), RoverError>;

    fn power_off(&mut self) -> Result<(), RoverError>;
}
