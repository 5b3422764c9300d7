//! # sdcard-spi
//!
//! > An SPI-mode SD/MMC block device driver for Embedded Rust
//!
//! This crate drives an SD or MMC card attached to a generic SPI bus plus a
//! chip select line, and exposes it through a narrow [`BlockDevice`] contract
//! that filesystem layers (FAT, littlefs-style log-structured stores, ...)
//! can consume. It is written in pure-Rust, is `#![no_std]` and does not use
//! `alloc`; transfers work in fixed 512-byte blocks on caller-owned buffers.
//!
//! The driver is fully synchronous and blocking: every operation holds the
//! calling context until the bus transaction completes or one of the
//! documented poll bounds expires. It assumes exclusive ownership of the SPI
//! handle and the chip select pin; if the bus is shared with other devices,
//! serialize access *between* transactions at a higher layer.
//!
//! ## Using the crate
//!
//! ```rust,ignore
//! use sdcard_spi::{SdCard, SdBlockDevice, SpiTransport, BlockIdx};
//!
//! // spi: embedded_hal::blocking::spi::Transfer<u8> + sdcard_spi::SetSpeed
//! // cs:  embedded_hal::digital::v2::OutputPin
//! // delay: embedded_hal::blocking::delay::DelayMs<u8>
//! let bus = SpiTransport::new(spi, cs, delay);
//! let card = match SdCard::acquire(bus, 1_320_000) {
//!     Ok(card) => card,
//!     Err((e, _bus)) => panic!("init failed: {:?}", e),
//! };
//! let mut dev = SdBlockDevice::new(card);
//! let mut buf = [0u8; 512];
//! dev.read_blocks(BlockIdx(0), &mut buf)?;
//! ```
//!
//! ## Features
//!
//! * `log` (default): log driver activity via the `log` crate.
//! * `defmt-log`: by turning off the default features and enabling
//!   `defmt-log` you can configure this crate to log messages over defmt
//!   instead.
//! * `refcell-blockdevice` (default): `BlockDevice` impls for
//!   `RefCell`-wrapped devices, so one card can back several consumers.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is
//! enabled.

#![cfg_attr(not(test), no_std)]


pub mod blockdevice;
pub mod csd;
pub mod proto;
pub mod sdcard;
pub mod transport;

pub use crate::blockdevice::{Block, BlockCount, BlockDevice, BlockIdx, MemoryBlockDevice};
pub use crate::csd::{Csd, CsdV1, CsdV2};
pub use crate::sdcard::device::{DeviceOp, SdBlockDevice};
pub use crate::sdcard::SdCard;
pub use crate::transport::{SetSpeed, SpiTransport, Transport};

/// The errors this crate can produce.
///
/// Initialization-phase errors leave the card session unusable; discard it
/// and acquire a fresh one. Transfer-phase errors may be retried per
/// operation, but the card is left in an unspecified state (a multi-block
/// write interrupted mid-sequence may need the stop token before it honours
/// further commands), so re-initialization is the safe recovery.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The SPI peripheral or the chip select pin reported a hardware fault
    Transport,
    /// The reset handshake (CMD0) never reached idle state
    CardNotFound,
    /// The version probe (CMD8) matched neither a v1 nor a v2 card
    UnknownVersion,
    /// The ACMD41 negotiation loop exhausted its retry budget
    InitTimeout,
    /// The CSD structure bits matched neither known register layout
    UnsupportedCsdFormat,
    /// The card rejected SET_BLOCKLEN(512)
    BlockLengthRejected,
    /// A command's status byte signalled failure
    CommandRejected {
        /// The rejected command index
        command: u8,
        /// The raw R1 status byte
        status: u8,
    },
    /// No valid status byte arrived within the poll window for this command
    TimeoutCommand(u8),
    /// No start-of-data token arrived within the poll window
    TimeoutDataToken,
    /// The data response after a write was not the "accepted" pattern
    WriteRejected,
    /// The card stayed busy past the poll window
    TimeoutWaitNotBusy,
    /// The card never reported erase completion
    TimeoutErase,
    /// Caller-supplied buffer length was not a positive multiple of 512
    InvalidArgument,
    /// Block number at or beyond the card's capacity
    OutOfRange,
}
