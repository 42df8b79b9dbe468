//! CRC-32 as stored in ZIP containers.
//!
//! Computed MSB-first over bit-reversed input with polynomial `0x04C11DB7`,
//! then reversed again, which yields the usual reflected ZIP checksum without
//! a lookup table.

const POLYNOMIAL: u32 = 0x04c1_1db7;

/// Incremental CRC-32 state.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self { state: 0xffff_ffff }
    }

    /// Feeds more bytes.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let mut bits = u32::from(byte.reverse_bits()) << 24;
            for _ in 0..8 {
                if (self.state ^ bits) & 0x8000_0000 != 0 {
                    self.state = (self.state << 1) ^ POLYNOMIAL;
                } else {
                    self.state <<= 1;
                }
                bits <<= 1;
            }
        }
    }

    /// Returns the checksum of everything fed so far.
    pub fn finalize(&self) -> u32 {
        (!self.state).reverse_bits()
    }
}

/// Computes the CRC-32 of a buffer.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}
