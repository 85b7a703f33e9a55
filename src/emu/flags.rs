//
// flags.rs --- Processor status flags.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// The packed processor-status byte.
    ///
    /// The bit layout is internal to this emulator and is not
    /// wire-compatible with the hardware's status byte: Carry sits in
    /// bit 0 up through Negative in bit 6, and bit 7 is unused and
    /// always zero. Raw save/restore (PHP/PLP/RTI) goes through
    /// [`Status::bits`] and [`Status::from_bits_truncate`], which
    /// masks the unused bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: u8 {
        const CARRY     = 0b0000_0001;
        const ZERO      = 0b0000_0010;
        const INTERRUPT = 0b0000_0100;
        const DECIMAL   = 0b0000_1000;
        const BREAK     = 0b0001_0000;
        const OVERFLOW  = 0b0010_0000;
        const NEGATIVE  = 0b0100_0000;
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}{}{}{}{}",
               if self.contains(Status::NEGATIVE)  { "N" } else { "" },
               if self.contains(Status::OVERFLOW)  { "V" } else { "" },
               if self.contains(Status::BREAK)     { "B" } else { "" },
               if self.contains(Status::DECIMAL)   { "D" } else { "" },
               if self.contains(Status::INTERRUPT) { "I" } else { "" },
               if self.contains(Status::ZERO)      { "Z" } else { "" },
               if self.contains(Status::CARRY)     { "C" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions() {
        assert_eq!(Status::CARRY.bits(), 1 << 0);
        assert_eq!(Status::ZERO.bits(), 1 << 1);
        assert_eq!(Status::INTERRUPT.bits(), 1 << 2);
        assert_eq!(Status::DECIMAL.bits(), 1 << 3);
        assert_eq!(Status::BREAK.bits(), 1 << 4);
        assert_eq!(Status::OVERFLOW.bits(), 1 << 5);
        assert_eq!(Status::NEGATIVE.bits(), 1 << 6);
    }

    #[test]
    fn unused_bit_is_masked() {
        let flags = Status::from_bits_truncate(0xFF);
        assert_eq!(flags.bits(), 0x7F);
    }

    #[test]
    fn raw_round_trip() {
        let mut flags = Status::empty();
        flags.insert(Status::CARRY | Status::NEGATIVE);

        let saved = flags.bits();
        flags = Status::from_bits_truncate(0);
        assert!(flags.is_empty());

        flags = Status::from_bits_truncate(saved);
        assert!(flags.contains(Status::CARRY));
        assert!(flags.contains(Status::NEGATIVE));
        assert!(!flags.contains(Status::ZERO));
    }

    #[test]
    fn display_letters() {
        let mut flags = Status::empty();
        flags.insert(Status::NEGATIVE | Status::ZERO | Status::CARRY);
        assert_eq!(flags.to_string(), "NZC");
    }
}
