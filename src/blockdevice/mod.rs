//! sdcard-spi - Block device support
//!
//! Generic code for handling block devices: the fixed 512-byte block unit,
//! block-address newtypes, and the narrow trait a filesystem layer programs
//! against.

#[cfg(feature = "refcell-blockdevice")]
mod refcell;

use core::ops::{Deref, DerefMut};

/// A single 512-byte sector, aligned for use as a transfer buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    /// The 512 bytes in this block.
    pub contents: [u8; Block::LEN],
}

impl Block {
    /// All blocks are this many bytes; so is every transfer.
    pub const LEN: usize = 512;

    /// `Block::LEN` as a `u32`, for block-number arithmetic.
    pub const LEN_U32: u32 = 512;

    /// A new block, zero-filled.
    pub fn new() -> Block {
        Block {
            contents: [0u8; Block::LEN],
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new()
    }
}

impl Deref for Block {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.contents
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.contents
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(fmt, "Block:")?;
        for line in self.contents.chunks(32) {
            for b in line {
                write!(fmt, "{:02x}", b)?;
            }
            writeln!(fmt)?;
        }
        Ok(())
    }
}

/// The zero-based index of a block on a device.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockIdx(pub u32);

/// A number of blocks.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockCount(pub u32);

impl BlockIdx {
    /// The byte offset this block starts at on a byte-addressed device.
    pub fn into_bytes(self) -> u64 {
        u64::from(self.0) * Block::LEN as u64
    }
}

impl BlockCount {
    /// Whether `idx` names a block inside a device of this size.
    pub fn contains(self, idx: BlockIdx) -> bool {
        idx.0 < self.0
    }
}

/// Represents a block device - a device which can read and write 512-byte
/// blocks (or sectors). Only supports devices which are <= 2 TiB in size.
///
/// Buffers must be an exact, non-zero multiple of [`Block::LEN`] bytes;
/// implementations reject anything else before touching the hardware.
pub trait BlockDevice {
    /// The errors the device can return. Must be debug formattable.
    type Error: core::fmt::Debug;

    /// Read one or more blocks, starting at the given block index.
    fn read_blocks(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Write one or more blocks, starting at the given block index.
    fn write_blocks(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Self::Error>;

    /// Determine how many blocks this device can hold.
    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error>;
}

impl<T> BlockDevice for &mut T
where
    T: BlockDevice,
{
    type Error = T::Error;

    fn read_blocks(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Self::Error> {
        (*self).read_blocks(start, buffer)
    }

    fn write_blocks(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Self::Error> {
        (*self).write_blocks(start, buffer)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        (*self).num_blocks()
    }
}

/// A [`BlockDevice`] over a chunk of RAM. The reference implementation of
/// the trait, and the stand-in device for host tests.
#[derive(Debug)]
pub struct MemoryBlockDevice<'a> {
    memory: &'a mut [u8],
}

impl<'a> MemoryBlockDevice<'a> {
    /// Wrap a byte slice. The slice length fixes the device capacity.
    pub fn new(memory: &'a mut [u8]) -> Self {
        Self { memory }
    }

    fn byte_range(&self, start: BlockIdx, len: usize) -> Result<core::ops::Range<usize>, crate::Error> {
        if len == 0 || len % Block::LEN != 0 {
            return Err(crate::Error::InvalidArgument);
        }
        let offset = start.0 as usize * Block::LEN;
        let end = offset + len;
        if end > self.memory.len() {
            return Err(crate::Error::OutOfRange);
        }
        Ok(offset..end)
    }
}

impl<'a> BlockDevice for MemoryBlockDevice<'a> {
    type Error = crate::Error;

    fn read_blocks(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.byte_range(start, buffer.len())?;
        buffer.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn write_blocks(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Self::Error> {
        let range = self.byte_range(start, buffer.len())?;
        self.memory[range].copy_from_slice(buffer);
        Ok(())
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount((self.memory.len() / Block::LEN) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn memory_device_round_trip() {
        let mut memory = vec![0u8; 4 * Block::LEN];
        let mut dev = MemoryBlockDevice::new(&mut memory);
        assert_eq!(dev.num_blocks(), Ok(BlockCount(4)));

        let mut block = Block::new();
        for (i, b) in block.iter_mut().enumerate() {
            *b = i as u8;
        }
        dev.write_blocks(BlockIdx(2), &block).unwrap();

        let mut readback = Block::new();
        dev.read_blocks(BlockIdx(2), &mut readback).unwrap();
        assert_eq!(readback, block);

        // Neighbours untouched.
        dev.read_blocks(BlockIdx(1), &mut readback).unwrap();
        assert_eq!(&readback.contents[..], &[0u8; Block::LEN][..]);
    }

    #[test]
    fn memory_device_validates_lengths() {
        let mut memory = vec![0u8; 4 * Block::LEN];
        let mut dev = MemoryBlockDevice::new(&mut memory);
        let mut buf = [0u8; 100];
        assert_eq!(
            dev.read_blocks(BlockIdx(0), &mut buf),
            Err(Error::InvalidArgument)
        );
        assert_eq!(dev.write_blocks(BlockIdx(0), &buf), Err(Error::InvalidArgument));
        assert_eq!(dev.read_blocks(BlockIdx(0), &mut []), Err(Error::InvalidArgument));
    }

    #[test]
    fn memory_device_rejects_out_of_range() {
        let mut memory = vec![0u8; 4 * Block::LEN];
        let mut dev = MemoryBlockDevice::new(&mut memory);
        let mut block = Block::new();
        assert_eq!(
            dev.read_blocks(BlockIdx(4), &mut block),
            Err(Error::OutOfRange)
        );
        let two = [0u8; 2 * Block::LEN];
        assert_eq!(dev.write_blocks(BlockIdx(3), &two), Err(Error::OutOfRange));
    }
}
