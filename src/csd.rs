//! sdcard-spi - Card-Specific Data register
//!
//! The CSD is a fixed 16-byte metadata block read once during
//! initialization. The top two bits of byte 0 select one of two
//! incompatible field layouts, so the register is modelled as a tagged
//! union with per-variant accessors rather than raw bit offsets at the call
//! sites.

use crate::blockdevice::{Block, BlockCount};
use crate::Error;

/// Build an accessor for a big-endian bit field scattered across CSD
/// bytes. Parts are listed most-significant first as
/// `(byte offset, right shift, bit width)`.
macro_rules! csd_field {
    ($(#[$meta:meta])* $name:ident, $ty:ty, [ $( ($offset:expr, $shift:expr, $bits:expr) ),+ ]) => {
        $(#[$meta])*
        pub fn $name(&self) -> $ty {
            let mut value: $ty = 0;
            $(
                value <<= $bits;
                value |= ((self.data[$offset] >> $shift) as $ty) & ((1 << $bits) - 1);
            )+
            value
        }
    };
}

/// A parsed CSD register, structure version 0 ("v1", the legacy <=2 GB
/// layout).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CsdV1 {
    /// The raw register contents.
    pub data: [u8; 16],
}

impl CsdV1 {
    csd_field!(
        /// Maximum read block length, as a power of two.
        read_bl_len, u8, [(5, 0, 4)]
    );

    csd_field!(
        /// Device size, 12 bits.
        c_size, u32, [(6, 0, 2), (7, 0, 8), (8, 6, 2)]
    );

    csd_field!(
        /// Device size multiplier, 3 bits.
        c_size_mult, u8, [(9, 0, 2), (10, 7, 1)]
    );

    /// Usable card capacity in bytes.
    pub fn card_capacity_bytes(&self) -> u64 {
        u64::from(self.c_size() + 1)
            << (u32::from(self.c_size_mult()) + 2 + u32::from(self.read_bl_len()))
    }

    /// Usable card capacity in 512-byte blocks.
    pub fn block_count(&self) -> BlockCount {
        BlockCount((self.card_capacity_bytes() / Block::LEN as u64) as u32)
    }
}

/// A parsed CSD register, structure version 1 ("v2", the high-capacity
/// layout).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CsdV2 {
    /// The raw register contents.
    pub data: [u8; 16],
}

impl CsdV2 {
    csd_field!(
        /// Device size. v2 cards encode capacity directly in 512 KiB
        /// units; only the low 16 bits are read, matching cards up to
        /// 32 GB.
        c_size, u32, [(8, 0, 8), (9, 0, 8)]
    );

    /// Usable card capacity in bytes.
    pub fn card_capacity_bytes(&self) -> u64 {
        u64::from(self.block_count().0) * Block::LEN as u64
    }

    /// Usable card capacity in 512-byte blocks.
    pub fn block_count(&self) -> BlockCount {
        BlockCount((self.c_size() + 1) * 1024)
    }
}

/// The Card-Specific Data register, parsed into whichever of the two known
/// layouts its structure bits select.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Csd {
    /// Structure version 0
    V1(CsdV1),
    /// Structure version 1
    V2(CsdV2),
}

impl Csd {
    /// Parse a raw CSD block. Fails with [`Error::UnsupportedCsdFormat`]
    /// when the structure bits name a layout this driver does not know.
    pub fn parse(data: [u8; 16]) -> Result<Csd, Error> {
        match data[0] >> 6 {
            0 => Ok(Csd::V1(CsdV1 { data })),
            1 => Ok(Csd::V2(CsdV2 { data })),
            _ => Err(Error::UnsupportedCsdFormat),
        }
    }

    /// Usable card capacity in bytes.
    pub fn card_capacity_bytes(&self) -> u64 {
        match self {
            Csd::V1(csd) => csd.card_capacity_bytes(),
            Csd::V2(csd) => csd.card_capacity_bytes(),
        }
    }

    /// Usable card capacity in 512-byte blocks.
    pub fn block_count(&self) -> BlockCount {
        match self {
            Csd::V1(csd) => csd.block_count(),
            Csd::V2(csd) => csd.block_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // 128 MB SDSC card: read_bl_len 9, c_size 0xAAA (2730), c_size_mult 5.
    const CSD_V1: [u8; 16] = hex!("00 26 00 32 5f 59 82 aa 82 02 bd bf 92 80 40 91");

    // ~7.4 GB SDHC card: c_size 0x3B37 (15159).
    const CSD_V2: [u8; 16] = hex!("40 0e 00 32 5b 59 00 00 3b 37 7f 80 0a 40 40 6d");

    #[test]
    fn parses_structure_v1() {
        let csd = match Csd::parse(CSD_V1).unwrap() {
            Csd::V1(csd) => csd,
            other => panic!("wrong variant: {:?}", other),
        };
        assert_eq!(csd.read_bl_len(), 9);
        assert_eq!(csd.c_size(), 0xAAA);
        assert_eq!(csd.c_size_mult(), 5);
        // (2730 + 1) * 2^(5 + 2) * 2^9
        assert_eq!(csd.card_capacity_bytes(), 2731 * 128 * 512);
        assert_eq!(csd.block_count(), BlockCount(2731 * 128));
    }

    #[test]
    fn parses_structure_v2() {
        let csd = match Csd::parse(CSD_V2).unwrap() {
            Csd::V2(csd) => csd,
            other => panic!("wrong variant: {:?}", other),
        };
        assert_eq!(csd.c_size(), 0x3B37);
        assert_eq!(csd.block_count(), BlockCount(15160 * 1024));
        assert_eq!(csd.card_capacity_bytes(), 15160 * 1024 * 512);
    }

    #[test]
    fn rejects_unknown_structure_bits() {
        let mut data = CSD_V2;
        data[0] = 0x80;
        assert_eq!(Csd::parse(data), Err(Error::UnsupportedCsdFormat));
        data[0] = 0xC0;
        assert_eq!(Csd::parse(data), Err(Error::UnsupportedCsdFormat));
    }
}
