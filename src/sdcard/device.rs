//! sdcard-spi - Block device adapter
//!
//! Wraps an [`SdCard`] session in the generic [`BlockDevice`] contract and
//! the control surface (initialize, sync, capacity queries, erase) that
//! filesystem drivers expect from a removable block device.

use super::SdCard;
use crate::blockdevice::{Block, BlockCount, BlockDevice, BlockIdx};
use crate::transport::Transport;
use crate::Error;

/// The control operations a consumer may invoke besides plain block I/O.
///
/// The set is closed: there is no "unknown op" failure mode because
/// unknown operations cannot be expressed.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    /// Re-run card initialization from scratch
    Initialize,
    /// Release the device; nothing to do for this driver
    Shutdown,
    /// Flush pending writes; a no-op, the driver is fully synchronous and
    /// keeps no write-back cache
    Sync,
    /// Query the total number of 512-byte blocks
    BlockCount,
    /// Query the block size (always 512)
    BlockSize,
    /// Erase one block; needed by log-structured filesystems
    Erase(BlockIdx),
}

/// A block device backed by one SD/MMC card session.
pub struct SdBlockDevice<T>
where
    T: Transport,
{
    card: SdCard<T>,
}

impl<T> SdBlockDevice<T>
where
    T: Transport,
{
    /// Wrap an initialized card.
    pub fn new(card: SdCard<T>) -> Self {
        SdBlockDevice { card }
    }

    /// Access the underlying card session.
    pub fn card(&mut self) -> &mut SdCard<T> {
        &mut self.card
    }

    /// Unwrap the card session again.
    pub fn free(self) -> SdCard<T> {
        self.card
    }

    /// Erase one block. Fails with [`Error::OutOfRange`] before any bus
    /// activity if `block` is at or beyond the card capacity.
    pub fn erase_block(&mut self, block: BlockIdx) -> Result<(), Error> {
        self.card.erase(block)
    }

    /// Perform a control operation. Query operations return their value;
    /// everything else returns 0 on success.
    pub fn control(&mut self, op: DeviceOp) -> Result<u32, Error> {
        match op {
            DeviceOp::Initialize => {
                self.card.reinit()?;
                Ok(0)
            }
            DeviceOp::Shutdown => Ok(0),
            DeviceOp::Sync => Ok(0),
            DeviceOp::BlockCount => Ok(self.card.num_blocks().0),
            DeviceOp::BlockSize => Ok(Block::LEN_U32),
            DeviceOp::Erase(block) => {
                self.card.erase(block)?;
                Ok(0)
            }
        }
    }
}

impl<T> BlockDevice for SdBlockDevice<T>
where
    T: Transport,
{
    type Error = Error;

    fn read_blocks(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.card.read(start, buffer)
    }

    fn write_blocks(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Self::Error> {
        self.card.write(start, buffer)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        Ok(self.card.num_blocks())
    }
}
