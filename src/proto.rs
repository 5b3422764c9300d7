//! sdcard-spi - SD/MMC wire protocol constants
//!
//! Command indices, framing tokens, R1 status bits and the poll/timing
//! bounds of SPI mode. The bounds are calibrated to real card settle times;
//! treat them as part of the protocol, not as tunables.

use bitflags::bitflags;

bitflags! {
    /// Bits of the R1 status byte. A response byte is only valid when
    /// bit 7 is clear.
    pub struct R1Status: u8 {
        /// Card is in the idle state, running its initialization
        const IDLE_STATE = 1 << 0;
        /// An erase sequence was cleared before executing
        const ERASE_RESET = 1 << 1;
        /// Command not legal for the current card state
        const ILLEGAL_COMMAND = 1 << 2;
        /// Command CRC check failed
        const CRC_ERROR = 1 << 3;
        /// Error in the sequence of erase commands
        const ERASE_SEQUENCE_ERROR = 1 << 4;
        /// Misaligned address for the command
        const ADDRESS_ERROR = 1 << 5;
        /// Command argument outside the card's range
        const PARAMETER_ERROR = 1 << 6;
    }
}

/// R1 status once initialization has finished: no bits set.
pub const R1_READY_STATE: u8 = 0x00;
/// Bit 7 of a response byte; must be clear for the byte to be a status.
pub const R1_INVALID_MASK: u8 = 0x80;

/// GO_IDLE_STATE - reset the card into SPI mode
pub const CMD0: u8 = 0;
/// SEND_IF_COND - voltage/version probe, distinguishes v1 from v2 cards
pub const CMD8: u8 = 8;
/// SEND_CSD - read the 16-byte card-specific data register
pub const CMD9: u8 = 9;
/// STOP_TRANSMISSION - end a multiple-block read
pub const CMD12: u8 = 12;
/// SEND_STATUS - read the card status register
pub const CMD13: u8 = 13;
/// SET_BLOCKLEN - fix the block length for following transfers
pub const CMD16: u8 = 16;
/// READ_SINGLE_BLOCK
pub const CMD17: u8 = 17;
/// READ_MULTIPLE_BLOCK
pub const CMD18: u8 = 18;
/// WRITE_BLOCK
pub const CMD24: u8 = 24;
/// WRITE_MULTIPLE_BLOCK
pub const CMD25: u8 = 25;
/// ERASE_WR_BLK_START - first block to erase
pub const CMD32: u8 = 32;
/// ERASE_WR_BLK_END - last block to erase
pub const CMD33: u8 = 33;
/// ERASE - execute the selected erase range
pub const CMD38: u8 = 38;
/// APP_CMD - prefix announcing an application-specific command
pub const CMD55: u8 = 55;
/// READ_OCR - read the operating conditions register
pub const CMD58: u8 = 58;
/// SD_SEND_OP_COND - start initialization (follows CMD55)
pub const ACMD41: u8 = 41;

/// Start-of-data token for single-block transfers and every read block
pub const DATA_START_BLOCK: u8 = 0xFE;
/// Per-block token of a multiple-block write
pub const WRITE_MULTIPLE_TOKEN: u8 = 0xFC;
/// Token ending a multiple-block write
pub const STOP_TRAN_TOKEN: u8 = 0xFD;

/// Low five bits of the data response byte
pub const DATA_RES_MASK: u8 = 0x1F;
/// Data response pattern for "data accepted"
pub const DATA_RES_ACCEPTED: u8 = 0x05;

/// CMD8 check pattern: 2.7-3.6 V, echo byte 0xAA
pub const CMD8_CHECK_PATTERN: u32 = 0x1AA;
/// ACMD41 argument bit announcing host support for high-capacity cards
pub const HIGH_CAPACITY: u32 = 0x4000_0000;
/// OCR bit (first returned byte) flagging a block-addressed card
pub const OCR_BLOCK_ADDRESSING: u8 = 0x40;

/// CRC checking is off in SPI mode, so commands carry fixed CRC bytes: only
/// CMD0 and CMD8 (sent before CRC can be disabled) need real values.
pub const CRC_CMD0: u8 = 0x95;
/// CRC byte for CMD8 with the standard 0x1AA argument
pub const CRC_CMD8: u8 = 0x87;
/// Placeholder CRC byte for CMD12
pub const CRC_CMD12: u8 = 0xFF;
/// Placeholder CRC byte for every other command
pub const CRC_NONE: u8 = 0x00;

/// Poll attempts for a command's status byte and for the start-of-data
/// token.
pub const CMD_TIMEOUT: u32 = 100;
/// Spacing of start-of-data token polls, milliseconds.
pub const DATA_TOKEN_POLL_MS: u8 = 1;
/// CMD0 attempts before concluding no card is present.
pub const RESET_ATTEMPTS: u32 = 5;
/// ACMD41 negotiation attempts (v1 and v2 paths).
pub const INIT_ATTEMPTS: u32 = 100;
/// Spacing of ACMD41 negotiation attempts, milliseconds.
pub const INIT_RETRY_DELAY_MS: u8 = 50;
/// Busy polls tolerated after a write before giving up on the card.
pub const BUSY_POLL_ATTEMPTS: u32 = 32_000;
/// SEND_STATUS polls tolerated after an erase. The original driver waits
/// forever here; see DESIGN.md for why this crate bounds it.
pub const ERASE_POLL_ATTEMPTS: u32 = 10_000;

/// Bootstrap clock used until the card leaves the identification phase.
pub const INITIAL_SPEED_HZ: u32 = 100_000;
/// Idle bytes clocked with chip select deasserted to wake the card.
pub const POWER_UP_IDLE_BYTES: usize = 16;
