//! sdcard-spi - Bus transport
//!
//! The byte-level seam between the protocol engine and the hardware: a
//! serial bus handle plus the chip select line, with bus-speed
//! reconfiguration and millisecond delays folded in so the whole driver can
//! be exercised against a simulated bus in host tests.

use crate::Error;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// The idle (fill) byte: all bits set, clocked whenever the card needs bus
/// clocks without meaningful data, and written once with chip select
/// deasserted before and after each transaction so a shared bus is released
/// cleanly.
pub const FILL: u8 = 0xFF;

/// Byte-level access to the card.
///
/// Implementations own the bus handle and the chip select line for the
/// lifetime of one card session. No retries happen at this layer; any
/// hardware fault propagates as [`Error::Transport`].
pub trait Transport {
    /// Reconfigure the bus clock. The card is brought up at a ~100 kHz
    /// bootstrap clock and switched to the operating clock once
    /// initialization completes.
    fn configure(&mut self, speed_hz: u32) -> Result<(), Error>;

    /// Drive chip select active (low).
    fn select(&mut self) -> Result<(), Error>;

    /// Drive chip select inactive (high).
    fn deselect(&mut self) -> Result<(), Error>;

    /// Write raw bytes, discarding whatever the card clocks back.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Clock out one [`FILL`] byte and return the byte the card drove back.
    fn receive(&mut self) -> Result<u8, Error>;

    /// Fill `buffer` from the card, clocking `fill` out for every byte.
    fn read_into(&mut self, buffer: &mut [u8], fill: u8) -> Result<(), Error>;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u8);
}

/// Glue for HALs whose SPI peripheral can be reclocked after construction.
///
/// `embedded-hal` 0.2 has no portable way to change an SPI peripheral's
/// clock, but this protocol requires two rates (bootstrap, then operating).
/// Implement this on your HAL's SPI type, or on a newtype around it.
pub trait SetSpeed {
    /// The HAL-level error type.
    type Error;

    /// Reclock the peripheral to (at most) `speed_hz`.
    fn set_speed(&mut self, speed_hz: u32) -> Result<(), Self::Error>;
}

/// [`Transport`] over an `embedded-hal` SPI peripheral and a GPIO chip
/// select pin.
///
/// Chip Select must be a separate pin because the power-up handshake clocks
/// bytes with CS deasserted (which is what puts the card into SPI mode).
pub struct SpiTransport<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
}

impl<SPI, CS, D> SpiTransport<SPI, CS, D>
where
    SPI: Transfer<u8> + SetSpeed,
    CS: OutputPin,
    D: DelayMs<u8>,
{
    /// Wrap an SPI peripheral, chip select pin and delay provider.
    pub fn new(spi: SPI, cs: CS, delay: D) -> Self {
        SpiTransport { spi, cs, delay }
    }

    /// Tear the transport down and hand the peripherals back.
    pub fn release(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }

    fn transfer_byte(&mut self, out: u8) -> Result<u8, Error> {
        self.spi
            .transfer(&mut [out])
            .map(|b| b[0])
            .map_err(|_e| Error::Transport)
    }
}

impl<SPI, CS, D> Transport for SpiTransport<SPI, CS, D>
where
    SPI: Transfer<u8> + SetSpeed,
    CS: OutputPin,
    D: DelayMs<u8>,
{
    fn configure(&mut self, speed_hz: u32) -> Result<(), Error> {
        self.spi.set_speed(speed_hz).map_err(|_e| Error::Transport)
    }

    fn select(&mut self) -> Result<(), Error> {
        self.cs.set_low().map_err(|_e| Error::Transport)
    }

    fn deselect(&mut self) -> Result<(), Error> {
        self.cs.set_high().map_err(|_e| Error::Transport)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        for &b in bytes {
            self.transfer_byte(b)?;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<u8, Error> {
        self.transfer_byte(FILL)
    }

    fn read_into(&mut self, buffer: &mut [u8], fill: u8) -> Result<(), Error> {
        for b in buffer.iter_mut() {
            *b = self.transfer_byte(fill)?;
        }
        Ok(())
    }

    fn delay_ms(&mut self, ms: u8) {
        self.delay.delay_ms(ms);
    }
}

impl<T> Transport for &mut T
where
    T: Transport,
{
    fn configure(&mut self, speed_hz: u32) -> Result<(), Error> {
        (*self).configure(speed_hz)
    }

    fn select(&mut self) -> Result<(), Error> {
        (*self).select()
    }

    fn deselect(&mut self) -> Result<(), Error> {
        (*self).deselect()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        (*self).write(bytes)
    }

    fn receive(&mut self) -> Result<u8, Error> {
        (*self).receive()
    }

    fn read_into(&mut self, buffer: &mut [u8], fill: u8) -> Result<(), Error> {
        (*self).read_into(buffer, fill)
    }

    fn delay_ms(&mut self, ms: u8) {
        (*self).delay_ms(ms)
    }
}
