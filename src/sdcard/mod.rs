//! sdcard-spi - SD/MMC protocol engine
//!
//! Implements the SD/MMC protocol in SPI mode on a [`Transport`]: the
//! command/response engine, the power-up and capacity-discovery state
//! machine, and block data transfer with its framing tokens.
//!
//! This is optimised for readability and debugability, not performance.

pub mod device;

use crate::blockdevice::{Block, BlockCount, BlockIdx};
use crate::csd::Csd;
use crate::proto::*;
use crate::transport::{Transport, FILL};
use crate::Error;

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

/// How the card interprets the 32-bit address of a transfer command.
///
/// Fixed during initialization and immutable afterwards; every block-number
/// to address translation of a session must use the mode fixed at that
/// time.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressMode {
    /// Legacy cards take byte offsets (multiplier 512)
    Byte,
    /// High-capacity cards take block indexes (multiplier 1)
    Block,
}

impl AddressMode {
    /// What a block number is multiplied by to form a command argument.
    pub fn multiplier(self) -> u32 {
        match self {
            AddressMode::Byte => Block::LEN_U32,
            AddressMode::Block => 1,
        }
    }
}

/// One attached card: the transport it is reached over, plus the session
/// state negotiated during initialization (addressing mode, capacity,
/// operating clock).
pub struct SdCard<T>
where
    T: Transport,
{
    bus: T,
    mode: AddressMode,
    num_blocks: BlockCount,
    speed_hz: u32,
}

impl<T> SdCard<T>
where
    T: Transport,
{
    /// Take ownership of the bus and drive the card through its power-up
    /// handshake, version negotiation and capacity discovery, leaving the
    /// bus at `speed_hz`.
    ///
    /// On failure the transport is handed back alongside the error so the
    /// caller can retry or repurpose the bus. There is no partial retry: a
    /// failed initialization is retried in full or not at all.
    pub fn acquire(bus: T, speed_hz: u32) -> Result<Self, (Error, T)> {
        let mut card = SdCard {
            bus,
            mode: AddressMode::Byte,
            num_blocks: BlockCount(0),
            speed_hz,
        };
        match card.init_card() {
            Ok(()) => Ok(card),
            Err(e) => Err((e, card.bus)),
        }
    }

    /// Re-run the full initialization state machine on the existing bus.
    pub fn reinit(&mut self) -> Result<(), Error> {
        self.init_card()
    }

    /// Tear the session down and hand the transport back.
    pub fn release(self) -> T {
        self.bus
    }

    /// Total number of 512-byte blocks on the card.
    pub fn num_blocks(&self) -> BlockCount {
        self.num_blocks
    }

    /// The addressing mode negotiated for this session.
    pub fn address_mode(&self) -> AddressMode {
        self.mode
    }

    fn init_card(&mut self) -> Result<(), Error> {
        trace!("reset card");
        self.bus.configure(INITIAL_SPEED_HZ)?;

        // Wake-up clocks with chip select deasserted; this is what puts the
        // card into SPI mode.
        self.bus.deselect()?;
        self.bus.write(&[FILL; POWER_UP_IDLE_BYTES])?;

        let mut reset = false;
        for attempt in 0..RESET_ATTEMPTS {
            match self.cmd(CMD0, 0, CRC_CMD0) {
                Ok(status) if status == R1Status::IDLE_STATE.bits() => {
                    reset = true;
                    break;
                }
                Ok(status) => {
                    warn!("CMD0 attempt {}: status {:x}", attempt, status);
                }
                Err(Error::TimeoutCommand(_)) => {
                    warn!("CMD0 attempt {}: no response", attempt);
                }
                Err(e) => return Err(e),
            }
        }
        if !reset {
            return Err(Error::CardNotFound);
        }

        // The voltage/check-pattern echo distinguishes protocol versions:
        // a legacy card flags SEND_IF_COND as illegal.
        let mut echo = [0u8; 4];
        let status = self.cmd_read(CMD8, CMD8_CHECK_PATTERN, CRC_CMD8, &mut echo)?;
        if status == R1Status::IDLE_STATE.bits() {
            self.init_card_v2()?;
        } else if status == (R1Status::IDLE_STATE | R1Status::ILLEGAL_COMMAND).bits() {
            self.init_card_v1()?;
        } else {
            return Err(Error::UnknownVersion);
        }
        debug!("card negotiated, {:?} addressing", self.mode);

        // The CSD register arrives as a 16-byte data block with the card
        // still selected after the command.
        let status = self.cmd_hold(CMD9, 0, CRC_NONE)?;
        if status != R1_READY_STATE {
            self.bus.deselect()?;
            self.bus.write(&[FILL])?;
            return Err(Error::CommandRejected {
                command: CMD9,
                status,
            });
        }
        let mut raw = [0u8; 16];
        self.read_data(&mut raw)?;
        let csd = Csd::parse(raw)?;
        self.num_blocks = csd.block_count();
        debug!("card capacity: {} blocks", self.num_blocks.0);

        let status = self.cmd(CMD16, Block::LEN_U32, CRC_NONE)?;
        if status != R1_READY_STATE {
            return Err(Error::BlockLengthRejected);
        }

        self.bus.configure(self.speed_hz)?;
        Ok(())
    }

    /// Negotiate a legacy (v1) card. These are always byte addressed.
    fn init_card_v1(&mut self) -> Result<(), Error> {
        trace!("negotiating v1 card");
        for _ in 0..INIT_ATTEMPTS {
            self.bus.delay_ms(INIT_RETRY_DELAY_MS);
            self.cmd(CMD55, 0, CRC_NONE)?;
            if self.cmd(ACMD41, 0, CRC_NONE)? == R1_READY_STATE {
                self.mode = AddressMode::Byte;
                return Ok(());
            }
        }
        Err(Error::InitTimeout)
    }

    /// Negotiate a v2 card, announcing high-capacity support; the OCR then
    /// tells us whether the card actually is block addressed.
    fn init_card_v2(&mut self) -> Result<(), Error> {
        trace!("negotiating v2 card");
        for _ in 0..INIT_ATTEMPTS {
            self.bus.delay_ms(INIT_RETRY_DELAY_MS);
            let mut ocr = [0u8; 4];
            self.cmd_read(CMD58, 0, CRC_NONE, &mut ocr)?;
            self.cmd(CMD55, 0, CRC_NONE)?;
            if self.cmd(ACMD41, HIGH_CAPACITY, CRC_NONE)? == R1_READY_STATE {
                self.cmd_read(CMD58, 0, CRC_NONE, &mut ocr)?;
                self.mode = if ocr[0] & OCR_BLOCK_ADDRESSING == 0 {
                    AddressMode::Byte
                } else {
                    AddressMode::Block
                };
                return Ok(());
            }
        }
        Err(Error::InitTimeout)
    }

    /// Send a command frame, poll for the R1 status byte, release the card.
    fn cmd(&mut self, command: u8, arg: u32, crc: u8) -> Result<u8, Error> {
        self.cmd_inner(command, arg, crc, false, true, &mut [])
    }

    /// As [`Self::cmd`], but leave the card selected because a data phase
    /// follows immediately.
    fn cmd_hold(&mut self, command: u8, arg: u32, crc: u8) -> Result<u8, Error> {
        self.cmd_inner(command, arg, crc, false, false, &mut [])
    }

    /// As [`Self::cmd`], but clock `reply.len()` trailing response bytes
    /// (R3/R7 format responses) before releasing.
    fn cmd_read(
        &mut self,
        command: u8,
        arg: u32,
        crc: u8,
        reply: &mut [u8],
    ) -> Result<u8, Error> {
        self.cmd_inner(command, arg, crc, false, true, reply)
    }

    /// End a multiple-block read. STOP_TRANSMISSION is followed by one
    /// stuff byte that must be drained before the status poll.
    fn stop_transmission(&mut self) -> Result<u8, Error> {
        self.cmd_inner(CMD12, 0, CRC_CMD12, true, true, &mut [])
    }

    fn cmd_inner(
        &mut self,
        command: u8,
        arg: u32,
        crc: u8,
        skip_stuff_byte: bool,
        release: bool,
        reply: &mut [u8],
    ) -> Result<u8, Error> {
        self.bus.select()?;

        let frame = [
            0x40 | command,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
            crc,
        ];
        self.bus.write(&frame)?;

        if skip_stuff_byte {
            let _ = self.bus.receive()?;
        }

        // A response byte with bit 7 clear must arrive within the poll
        // window; the window is part of the protocol timing, not a tunable.
        for _ in 0..CMD_TIMEOUT {
            let status = self.bus.receive()?;
            if status & R1_INVALID_MASK == 0 {
                for b in reply.iter_mut() {
                    *b = self.bus.receive()?;
                }
                if release {
                    self.bus.deselect()?;
                    self.bus.write(&[FILL])?;
                }
                return Ok(status);
            }
        }

        self.bus.deselect()?;
        self.bus.write(&[FILL])?;
        Err(Error::TimeoutCommand(command))
    }

    /// Receive one data block: wait for the start token, fill `buffer`,
    /// clock past the two trailing CRC bytes. The payload CRC is
    /// deliberately not verified; the command layer's fixed CRCs are all
    /// the checking SPI mode requires.
    fn read_data(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        self.bus.select()?;

        let mut started = false;
        for _ in 0..CMD_TIMEOUT {
            if self.bus.receive()? == DATA_START_BLOCK {
                started = true;
                break;
            }
            self.bus.delay_ms(DATA_TOKEN_POLL_MS);
        }
        if !started {
            self.bus.deselect()?;
            return Err(Error::TimeoutDataToken);
        }

        self.bus.read_into(buffer, FILL)?;
        self.bus.write(&[FILL, FILL])?;

        self.bus.deselect()?;
        self.bus.write(&[FILL])?;
        Ok(())
    }

    /// Send one data block behind `token` and wait for the card to both
    /// accept it and finish programming it.
    fn write_data(&mut self, token: u8, buffer: &[u8]) -> Result<(), Error> {
        self.bus.select()?;
        self.bus.write(&[token])?;
        self.bus.write(buffer)?;
        self.bus.write(&[FILL, FILL])?;

        let response = self.bus.receive()?;
        if response & DATA_RES_MASK != DATA_RES_ACCEPTED {
            warn!("data response {:x}", response);
            self.bus.deselect()?;
            self.bus.write(&[FILL])?;
            return Err(Error::WriteRejected);
        }

        let result = self.wait_not_busy();
        self.bus.deselect()?;
        self.bus.write(&[FILL])?;
        result
    }

    /// Send a bare control token (the multi-block stop token) and wait out
    /// the busy window it triggers.
    fn write_control_token(&mut self, token: u8) -> Result<(), Error> {
        self.bus.select()?;
        self.bus.write(&[token, FILL])?;
        let result = self.wait_not_busy();
        self.bus.deselect()?;
        self.bus.write(&[FILL])?;
        result
    }

    /// The card holds the data line at zero while programming.
    fn wait_not_busy(&mut self) -> Result<(), Error> {
        for _ in 0..BUSY_POLL_ATTEMPTS {
            if self.bus.receive()? != 0 {
                return Ok(());
            }
        }
        Err(Error::TimeoutWaitNotBusy)
    }

    fn check_buffer(buffer_len: usize) -> Result<u32, Error> {
        if buffer_len == 0 || buffer_len % Block::LEN != 0 {
            return Err(Error::InvalidArgument);
        }
        Ok((buffer_len / Block::LEN) as u32)
    }

    fn check_range(&self, start: BlockIdx, nblocks: u32) -> Result<(), Error> {
        match start.0.checked_add(nblocks) {
            Some(end) if end <= self.num_blocks.0 => Ok(()),
            _ => Err(Error::OutOfRange),
        }
    }

    /// A block number as a command argument. In byte mode the multiply can
    /// exceed 32 bits for blocks a degenerate CSD claims to have; such
    /// blocks are unreachable, not a wrong address.
    fn block_address(&self, block: BlockIdx) -> Result<u32, Error> {
        block
            .0
            .checked_mul(self.mode.multiplier())
            .ok_or(Error::OutOfRange)
    }

    /// Read one or more blocks into `buffer`, whose length selects between
    /// a single-block and a multiple-block transfer. Validation happens
    /// before any bus activity.
    pub fn read(&mut self, start: BlockIdx, buffer: &mut [u8]) -> Result<(), Error> {
        let nblocks = Self::check_buffer(buffer.len())?;
        self.check_range(start, nblocks)?;
        let address = self.block_address(start)?;
        trace!("read {} blocks from {}", nblocks, start.0);

        // Release the shared bus before starting the transaction.
        self.bus.write(&[FILL])?;

        if nblocks == 1 {
            let status = self.cmd_hold(CMD17, address, CRC_NONE)?;
            if status != R1_READY_STATE {
                self.bus.deselect()?;
                return Err(Error::CommandRejected {
                    command: CMD17,
                    status,
                });
            }
            self.read_data(buffer)?;
        } else {
            let status = self.cmd_hold(CMD18, address, CRC_NONE)?;
            if status != R1_READY_STATE {
                self.bus.deselect()?;
                return Err(Error::CommandRejected {
                    command: CMD18,
                    status,
                });
            }
            for chunk in buffer.chunks_exact_mut(Block::LEN) {
                self.read_data(chunk)?;
            }
            let status = self.stop_transmission()?;
            if status != R1_READY_STATE {
                return Err(Error::CommandRejected {
                    command: CMD12,
                    status,
                });
            }
        }
        Ok(())
    }

    /// Write one or more blocks from `buffer`, single vs multiple selected
    /// by the buffer length. Validation happens before any bus activity.
    pub fn write(&mut self, start: BlockIdx, buffer: &[u8]) -> Result<(), Error> {
        let nblocks = Self::check_buffer(buffer.len())?;
        self.check_range(start, nblocks)?;
        let address = self.block_address(start)?;
        trace!("write {} blocks from {}", nblocks, start.0);

        self.bus.write(&[FILL])?;

        if nblocks == 1 {
            let status = self.cmd(CMD24, address, CRC_NONE)?;
            if status != R1_READY_STATE {
                return Err(Error::CommandRejected {
                    command: CMD24,
                    status,
                });
            }
            self.write_data(DATA_START_BLOCK, buffer)?;
        } else {
            let status = self.cmd(CMD25, address, CRC_NONE)?;
            if status != R1_READY_STATE {
                return Err(Error::CommandRejected {
                    command: CMD25,
                    status,
                });
            }
            for chunk in buffer.chunks_exact(Block::LEN) {
                self.write_data(WRITE_MULTIPLE_TOKEN, chunk)?;
            }
            self.write_control_token(STOP_TRAN_TOKEN)?;
        }
        Ok(())
    }

    /// Erase one block via the three-command select/execute sequence, then
    /// poll the status register until the card reports completion.
    pub fn erase(&mut self, block: BlockIdx) -> Result<(), Error> {
        if !self.num_blocks.contains(block) {
            return Err(Error::OutOfRange);
        }
        trace!("erase block {}", block.0);

        // Erase boundaries are byte addresses on every card type, so the
        // reachable erase range tops out at 2^23 blocks.
        let address = block
            .0
            .checked_mul(Block::LEN_U32)
            .ok_or(Error::OutOfRange)?;
        for &command in &[CMD32, CMD33] {
            let status = self.cmd(command, address, CRC_NONE)?;
            if status != R1_READY_STATE {
                return Err(Error::CommandRejected { command, status });
            }
        }
        let status = self.cmd(CMD38, 0, CRC_NONE)?;
        if status != R1_READY_STATE {
            return Err(Error::CommandRejected {
                command: CMD38,
                status,
            });
        }

        for _ in 0..ERASE_POLL_ATTEMPTS {
            if self.cmd(CMD13, 0, CRC_NONE)? == R1_READY_STATE {
                return Ok(());
            }
        }
        Err(Error::TimeoutErase)
    }
}
