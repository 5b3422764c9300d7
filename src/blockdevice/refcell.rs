//! [`BlockDevice`] impls for `RefCell`-wrapped devices, so a single card
//! can back more than one consumer. The borrow is taken per call; callers
//! remain responsible for not overlapping transactions.

use super::{BlockCount, BlockDevice, BlockIdx};

impl<T> BlockDevice for core::cell::RefCell<T>
where
    T: BlockDevice,
{
    type Error = T::Error;

    fn read_blocks(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.borrow_mut().read_blocks(start, buffer)
    }

    fn write_blocks(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Self::Error> {
        self.borrow_mut().write_blocks(start, buffer)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        self.borrow_mut().num_blocks()
    }
}

impl<T> BlockDevice for &core::cell::RefCell<T>
where
    T: BlockDevice,
{
    type Error = T::Error;

    fn read_blocks(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.borrow_mut().read_blocks(start, buffer)
    }

    fn write_blocks(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Self::Error> {
        self.borrow_mut().write_blocks(start, buffer)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        self.borrow_mut().num_blocks()
    }
}
