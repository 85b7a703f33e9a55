//
// cpu.rs --- 6502 CPU core.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

//! A 6502 CPU core.
//!
//! ## Implementation Notes
//!
//! Dispatch is driven by a fixed 256-entry table mapping each opcode
//! byte to its mnemonic, addressing mode and base cycle cost; the
//! table is built at compile time and never mutated. Addressing modes
//! are resolved by `CPU::operand_addr`, which fetches operand bytes
//! and computes the effective address with wrapping 16-bit arithmetic
//! (8-bit where the mode is zero-page relative).
//!
//! Timing is coarse: each instruction consumes its documented base
//! cycle count from the [`Clock`], taken branches one more. The
//! page-crossing penalty of the real part is not modelled.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::emu::clock::Clock;
use crate::emu::flags::Status;
use crate::emu::hooks::Hook;
use crate::emu::mem::Memory;
use crate::emu::regs::Regs;

/// How an instruction finds its operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

/// Instruction mnemonics, the tag half of a dispatch table entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Op {
    Lda, Ldx, Ldy,
    Sta, Stx, Sty,
    Adc, Sbc,
    And, Ora, Eor,
    Cmp, Cpx, Cpy, Bit,
    Asl, Lsr, Rol, Ror,
    Inc, Dec, Inx, Iny, Dex, Dey,
    Tax, Txa, Tay, Tya, Tsx, Txs,
    Pha, Pla, Php, Plp,
    Jmp, Jsr, Rts, Rti,
    Bpl, Bmi, Bvc, Bvs, Bcc, Bcs, Bne, Beq,
    Clc, Sec, Cli, Sei, Clv, Cld, Sed,
    Nop, Brk,
}

#[derive(Copy, Clone)]
struct OpEntry {
    op: Op,
    mode: AddrMode,
    cycles: u8,
}

const fn e(op: Op, mode: AddrMode, cycles: u8) -> Option<OpEntry> {
    Some(OpEntry { op, mode, cycles })
}

/// The documented 6502 instruction set, indexed by opcode byte.
/// Entries left `None` are unrecognized opcodes and halt the CPU.
const OPCODES: [Option<OpEntry>; 256] = opcode_table();

#[rustfmt::skip]
const fn opcode_table() -> [Option<OpEntry>; 256] {
    use AddrMode::*;
    use Op::*;

    let mut t: [Option<OpEntry>; 256] = [None; 256];

    // Load
    t[0xA9] = e(Lda, Immediate, 2);
    t[0xA5] = e(Lda, ZeroPage, 3);
    t[0xB5] = e(Lda, ZeroPageX, 4);
    t[0xAD] = e(Lda, Absolute, 4);
    t[0xBD] = e(Lda, AbsoluteX, 4);
    t[0xB9] = e(Lda, AbsoluteY, 4);
    t[0xA1] = e(Lda, IndirectX, 6);
    t[0xB1] = e(Lda, IndirectY, 5);
    t[0xA2] = e(Ldx, Immediate, 2);
    t[0xA6] = e(Ldx, ZeroPage, 3);
    t[0xB6] = e(Ldx, ZeroPageY, 4);
    t[0xAE] = e(Ldx, Absolute, 4);
    t[0xBE] = e(Ldx, AbsoluteY, 4);
    t[0xA0] = e(Ldy, Immediate, 2);
    t[0xA4] = e(Ldy, ZeroPage, 3);
    t[0xB4] = e(Ldy, ZeroPageX, 4);
    t[0xAC] = e(Ldy, Absolute, 4);
    t[0xBC] = e(Ldy, AbsoluteX, 4);

    // Store
    t[0x85] = e(Sta, ZeroPage, 3);
    t[0x95] = e(Sta, ZeroPageX, 4);
    t[0x8D] = e(Sta, Absolute, 4);
    t[0x9D] = e(Sta, AbsoluteX, 5);
    t[0x99] = e(Sta, AbsoluteY, 5);
    t[0x81] = e(Sta, IndirectX, 6);
    t[0x91] = e(Sta, IndirectY, 6);
    t[0x86] = e(Stx, ZeroPage, 3);
    t[0x96] = e(Stx, ZeroPageY, 4);
    t[0x8E] = e(Stx, Absolute, 4);
    t[0x84] = e(Sty, ZeroPage, 3);
    t[0x94] = e(Sty, ZeroPageX, 4);
    t[0x8C] = e(Sty, Absolute, 4);

    // Arithmetic
    t[0x69] = e(Adc, Immediate, 2);
    t[0x65] = e(Adc, ZeroPage, 3);
    t[0x75] = e(Adc, ZeroPageX, 4);
    t[0x6D] = e(Adc, Absolute, 4);
    t[0x7D] = e(Adc, AbsoluteX, 4);
    t[0x79] = e(Adc, AbsoluteY, 4);
    t[0x61] = e(Adc, IndirectX, 6);
    t[0x71] = e(Adc, IndirectY, 5);
    t[0xE9] = e(Sbc, Immediate, 2);
    t[0xE5] = e(Sbc, ZeroPage, 3);
    t[0xF5] = e(Sbc, ZeroPageX, 4);
    t[0xED] = e(Sbc, Absolute, 4);
    t[0xFD] = e(Sbc, AbsoluteX, 4);
    t[0xF9] = e(Sbc, AbsoluteY, 4);
    t[0xE1] = e(Sbc, IndirectX, 6);
    t[0xF1] = e(Sbc, IndirectY, 5);

    // Bitwise
    t[0x29] = e(And, Immediate, 2);
    t[0x25] = e(And, ZeroPage, 3);
    t[0x35] = e(And, ZeroPageX, 4);
    t[0x2D] = e(And, Absolute, 4);
    t[0x3D] = e(And, AbsoluteX, 4);
    t[0x39] = e(And, AbsoluteY, 4);
    t[0x21] = e(And, IndirectX, 6);
    t[0x31] = e(And, IndirectY, 5);
    t[0x09] = e(Ora, Immediate, 2);
    t[0x05] = e(Ora, ZeroPage, 3);
    t[0x15] = e(Ora, ZeroPageX, 4);
    t[0x0D] = e(Ora, Absolute, 4);
    t[0x1D] = e(Ora, AbsoluteX, 4);
    t[0x19] = e(Ora, AbsoluteY, 4);
    t[0x01] = e(Ora, IndirectX, 6);
    t[0x11] = e(Ora, IndirectY, 5);
    t[0x49] = e(Eor, Immediate, 2);
    t[0x45] = e(Eor, ZeroPage, 3);
    t[0x55] = e(Eor, ZeroPageX, 4);
    t[0x4D] = e(Eor, Absolute, 4);
    t[0x5D] = e(Eor, AbsoluteX, 4);
    t[0x59] = e(Eor, AbsoluteY, 4);
    t[0x41] = e(Eor, IndirectX, 6);
    t[0x51] = e(Eor, IndirectY, 5);

    // Compare and bit test
    t[0xC9] = e(Cmp, Immediate, 2);
    t[0xC5] = e(Cmp, ZeroPage, 3);
    t[0xD5] = e(Cmp, ZeroPageX, 4);
    t[0xCD] = e(Cmp, Absolute, 4);
    t[0xDD] = e(Cmp, AbsoluteX, 4);
    t[0xD9] = e(Cmp, AbsoluteY, 4);
    t[0xC1] = e(Cmp, IndirectX, 6);
    t[0xD1] = e(Cmp, IndirectY, 5);
    t[0xE0] = e(Cpx, Immediate, 2);
    t[0xE4] = e(Cpx, ZeroPage, 3);
    t[0xEC] = e(Cpx, Absolute, 4);
    t[0xC0] = e(Cpy, Immediate, 2);
    t[0xC4] = e(Cpy, ZeroPage, 3);
    t[0xCC] = e(Cpy, Absolute, 4);
    t[0x24] = e(Bit, ZeroPage, 3);
    t[0x2C] = e(Bit, Absolute, 4);

    // Shift and rotate
    t[0x0A] = e(Asl, Accumulator, 2);
    t[0x06] = e(Asl, ZeroPage, 5);
    t[0x16] = e(Asl, ZeroPageX, 6);
    t[0x0E] = e(Asl, Absolute, 6);
    t[0x1E] = e(Asl, AbsoluteX, 7);
    t[0x4A] = e(Lsr, Accumulator, 2);
    t[0x46] = e(Lsr, ZeroPage, 5);
    t[0x56] = e(Lsr, ZeroPageX, 6);
    t[0x4E] = e(Lsr, Absolute, 6);
    t[0x5E] = e(Lsr, AbsoluteX, 7);
    t[0x2A] = e(Rol, Accumulator, 2);
    t[0x26] = e(Rol, ZeroPage, 5);
    t[0x36] = e(Rol, ZeroPageX, 6);
    t[0x2E] = e(Rol, Absolute, 6);
    t[0x3E] = e(Rol, AbsoluteX, 7);
    t[0x6A] = e(Ror, Accumulator, 2);
    t[0x66] = e(Ror, ZeroPage, 5);
    t[0x76] = e(Ror, ZeroPageX, 6);
    t[0x6E] = e(Ror, Absolute, 6);
    t[0x7E] = e(Ror, AbsoluteX, 7);

    // Increment and decrement
    t[0xE6] = e(Inc, ZeroPage, 5);
    t[0xF6] = e(Inc, ZeroPageX, 6);
    t[0xEE] = e(Inc, Absolute, 6);
    t[0xFE] = e(Inc, AbsoluteX, 7);
    t[0xC6] = e(Dec, ZeroPage, 5);
    t[0xD6] = e(Dec, ZeroPageX, 6);
    t[0xCE] = e(Dec, Absolute, 6);
    t[0xDE] = e(Dec, AbsoluteX, 7);
    t[0xE8] = e(Inx, Implied, 2);
    t[0xC8] = e(Iny, Implied, 2);
    t[0xCA] = e(Dex, Implied, 2);
    t[0x88] = e(Dey, Implied, 2);

    // Register transfers
    t[0xAA] = e(Tax, Implied, 2);
    t[0x8A] = e(Txa, Implied, 2);
    t[0xA8] = e(Tay, Implied, 2);
    t[0x98] = e(Tya, Implied, 2);
    t[0xBA] = e(Tsx, Implied, 2);
    t[0x9A] = e(Txs, Implied, 2);

    // Stack
    t[0x48] = e(Pha, Implied, 3);
    t[0x68] = e(Pla, Implied, 4);
    t[0x08] = e(Php, Implied, 3);
    t[0x28] = e(Plp, Implied, 4);

    // Jumps and subroutines
    t[0x4C] = e(Jmp, Absolute, 3);
    t[0x6C] = e(Jmp, Indirect, 5);
    t[0x20] = e(Jsr, Absolute, 6);
    t[0x60] = e(Rts, Implied, 6);
    t[0x40] = e(Rti, Implied, 6);

    // Branches
    t[0x10] = e(Bpl, Relative, 2);
    t[0x30] = e(Bmi, Relative, 2);
    t[0x50] = e(Bvc, Relative, 2);
    t[0x70] = e(Bvs, Relative, 2);
    t[0x90] = e(Bcc, Relative, 2);
    t[0xB0] = e(Bcs, Relative, 2);
    t[0xD0] = e(Bne, Relative, 2);
    t[0xF0] = e(Beq, Relative, 2);

    // Flag operations
    t[0x18] = e(Clc, Implied, 2);
    t[0x38] = e(Sec, Implied, 2);
    t[0x58] = e(Cli, Implied, 2);
    t[0x78] = e(Sei, Implied, 2);
    t[0xB8] = e(Clv, Implied, 2);
    t[0xD8] = e(Cld, Implied, 2);
    t[0xF8] = e(Sed, Implied, 2);

    // Everything else
    t[0xEA] = e(Nop, Implied, 2);
    t[0x00] = e(Brk, Implied, 7);

    t
}

/////////////////////////////////////////////////////////////////////
// CPU Emulation

/// The 6502 CPU core.
pub struct CPU {
    pub mem: Memory,
    pub regs: Regs,
    pub flags: Status,
    clock: Clock,
    pre_hooks: Vec<Box<dyn Hook>>,
    post_hooks: Vec<Box<dyn Hook>>,
}

impl CPU {
    /// Create a CPU with zeroed memory, registers and flags, and a
    /// no-wait clock.
    ///
    /// # Examples
    ///
    /// ```
    /// use m6502::emu::CPU;
    ///
    /// let mut cpu = CPU::new();
    /// cpu.mem.load_bytes(&[0xA9, 0xFF], 0x0600);
    /// cpu.regs.pc = 0x0600;
    /// cpu.step();
    /// assert_eq!(cpu.regs.a, 0xFF);
    /// ```
    pub fn new() -> CPU {
        CPU::with_clock(Clock::default())
    }

    /// Create a CPU paced by `clock`.
    pub fn with_clock(clock: Clock) -> CPU {
        CPU {
            mem: Memory::new(),
            regs: Regs::new(),
            flags: Status::empty(),
            clock,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    /// The pacing clock. Clone the returned handle to reconfigure the
    /// tick duration or kill a pending wait from another thread.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Bulk-reset memory, flags and/or registers, then optionally set
    /// the program counter.
    pub fn setup(
        &mut self,
        clear_mem: bool,
        clear_flags: bool,
        clear_regs: bool,
        pc: Option<u16>,
    ) -> &mut CPU {
        if clear_mem {
            self.mem.reset();
        }
        if clear_flags {
            self.flags = Status::empty();
        }
        if clear_regs {
            self.regs = Regs::new();
        }
        if let Some(pc) = pc {
            self.regs.pc = pc;
        }
        self
    }

    /// Register a hook to run before every instruction, after the
    /// ones already registered.
    pub fn add_pre_hook<H: Hook + 'static>(&mut self, hook: H) {
        self.pre_hooks.push(Box::new(hook));
    }

    /// Register a hook to run after every instruction, after the ones
    /// already registered.
    pub fn add_post_hook<H: Hook + 'static>(&mut self, hook: H) {
        self.post_hooks.push(Box::new(hook));
    }

    /// Execute the instruction at the program counter.
    ///
    /// Fetches the opcode (advancing PC), runs the pre-instruction
    /// hooks, dispatches, runs the post-instruction hooks, and
    /// consumes the instruction's ticks from the clock. Returns
    /// `false` when the CPU halts: either the opcode was BRK or it
    /// was unrecognized. Halting is a signal, not an error; drive the
    /// CPU past it by resetting state with [`CPU::setup`].
    pub fn step(&mut self) -> bool {
        let pc = self.regs.pc;
        let opcode = self.fetch_byte();
        trace!("fetch {:02X} at {:04X}", opcode, pc);

        self.run_pre_hooks(opcode);
        let cont = self.execute(opcode);
        self.run_post_hooks(opcode);
        cont
    }

    /// Execute the next `n` instructions starting at the current
    /// value of the program counter.
    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Run until the CPU halts.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Run until the PC equals `pc_stop` or the CPU halts.
    pub fn run_until(&mut self, pc_stop: u16) {
        while self.regs.pc != pc_stop && self.step() {}
    }

    /// Run a shared CPU to halt on a background thread, then invoke
    /// `on_finished`.
    ///
    /// The mutex is taken once per instruction, so it is the lock
    /// that serializes stepping: another thread calling `step` on the
    /// same handle interleaves at instruction boundaries, never
    /// mid-instruction. Hooks run under the lock. To stop a run
    /// promptly, kill any pending wait through a [`Clock`] handle
    /// cloned beforehand; there is no way to cancel an instruction
    /// once its fetch has begun.
    ///
    /// Intended for fire-and-forget use. Callers that need to inspect
    /// intermediate state should drive [`CPU::step`] themselves.
    pub fn execute_async<F>(cpu: Arc<Mutex<CPU>>, on_finished: F) -> thread::JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::spawn(move || {
            while cpu.lock().step() {}
            on_finished();
        })
    }

    fn run_pre_hooks(&mut self, opcode: u8) {
        let mut hooks = std::mem::take(&mut self.pre_hooks);
        for hook in &mut hooks {
            hook.execute(self, opcode);
        }
        // Keep any hooks registered while the list was running.
        let added = std::mem::replace(&mut self.pre_hooks, hooks);
        self.pre_hooks.extend(added);
    }

    fn run_post_hooks(&mut self, opcode: u8) {
        let mut hooks = std::mem::take(&mut self.post_hooks);
        for hook in &mut hooks {
            hook.execute(self, opcode);
        }
        let added = std::mem::replace(&mut self.post_hooks, hooks);
        self.post_hooks.extend(added);
    }
}

impl Default for CPU {
    fn default() -> CPU {
        CPU::new()
    }
}

/////////////////////////////////////////////////////////////////////
// Fetching and Addressing Modes

impl CPU {
    /// Read the byte at `pc`, then advance `pc` by 1.
    fn fetch_byte(&mut self) -> u8 {
        let addr = self.regs.bump_pc();
        self.mem.get(addr)
    }

    /// Read a little-endian word at `pc`, then advance `pc` by 2.
    fn fetch_word(&mut self) -> u16 {
        let lo = u16::from(self.fetch_byte());
        let hi = u16::from(self.fetch_byte());
        (hi << 8) | lo
    }

    /// Resolve the effective address for a memory-operand mode,
    /// consuming the operand bytes at `pc`.
    fn operand_addr(&mut self, mode: AddrMode) -> u16 {
        match mode {
            AddrMode::ZeroPage => u16::from(self.fetch_byte()),
            AddrMode::ZeroPageX => u16::from(self.fetch_byte().wrapping_add(self.regs.x)),
            AddrMode::ZeroPageY => u16::from(self.fetch_byte().wrapping_add(self.regs.y)),
            AddrMode::Absolute => self.fetch_word(),
            AddrMode::AbsoluteX => self.fetch_word().wrapping_add(u16::from(self.regs.x)),
            AddrMode::AbsoluteY => self.fetch_word().wrapping_add(u16::from(self.regs.y)),
            AddrMode::Indirect => {
                let ptr = self.fetch_word();
                self.mem.get_word(ptr)
            }
            AddrMode::IndirectX => {
                let zp = self.fetch_byte().wrapping_add(self.regs.x);
                self.mem.get_word(u16::from(zp))
            }
            AddrMode::IndirectY => {
                let zp = u16::from(self.fetch_byte());
                self.mem.get_word(zp).wrapping_add(u16::from(self.regs.y))
            }
            AddrMode::Implied | AddrMode::Accumulator | AddrMode::Immediate | AddrMode::Relative => {
                panic!("addressing mode {:?} has no memory operand", mode)
            }
        }
    }

    /// Fetch the operand value for a value-consuming instruction.
    fn operand_value(&mut self, mode: AddrMode) -> u8 {
        match mode {
            AddrMode::Immediate => self.fetch_byte(),
            AddrMode::Accumulator => self.regs.a,
            _ => {
                let addr = self.operand_addr(mode);
                self.mem.get(addr)
            }
        }
    }

    /// Push a byte onto the stack in page `$0100`.
    fn push(&mut self, val: u8) {
        self.mem.put(0x0100 + u16::from(self.regs.sp), val);
        self.regs.dec_sp();
    }

    /// Pop a byte from the stack in page `$0100`.
    fn pop(&mut self) -> u8 {
        self.regs.inc_sp();
        self.mem.get(0x0100 + u16::from(self.regs.sp))
    }

    /// Push a word, high byte first.
    fn push_word(&mut self, val: u16) {
        self.push((val >> 8) as u8);
        self.push(val as u8);
    }

    /// Pop a word pushed with `push_word`.
    fn pop_word(&mut self) -> u16 {
        let lo = u16::from(self.pop());
        let hi = u16::from(self.pop());
        (hi << 8) | lo
    }
}

/////////////////////////////////////////////////////////////////////
// Instruction Set

impl CPU {
    /// Dispatch one opcode. Returns `false` when the CPU halts.
    fn execute(&mut self, opcode: u8) -> bool {
        let Some(entry) = OPCODES[opcode as usize] else {
            debug!("halt: unrecognized opcode {:02X} at {:04X}",
                   opcode, self.regs.pc.wrapping_sub(1));
            return false;
        };

        let mut cycles = u32::from(entry.cycles);
        let mut halted = false;

        match entry.op {
            // Load
            Op::Lda => {
                let val = self.operand_value(entry.mode);
                self.regs.a = val;
                self.set_nz(val);
            }
            Op::Ldx => {
                let val = self.operand_value(entry.mode);
                self.regs.x = val;
                self.set_nz(val);
            }
            Op::Ldy => {
                let val = self.operand_value(entry.mode);
                self.regs.y = val;
                self.set_nz(val);
            }

            // Store
            Op::Sta => {
                let addr = self.operand_addr(entry.mode);
                self.mem.put(addr, self.regs.a);
            }
            Op::Stx => {
                let addr = self.operand_addr(entry.mode);
                self.mem.put(addr, self.regs.x);
            }
            Op::Sty => {
                let addr = self.operand_addr(entry.mode);
                self.mem.put(addr, self.regs.y);
            }

            // Arithmetic
            Op::Adc => {
                let val = self.operand_value(entry.mode);
                self.adc(val);
            }
            Op::Sbc => {
                let val = self.operand_value(entry.mode);
                self.sbc(val);
            }

            // Bitwise
            Op::And => {
                let res = self.regs.a & self.operand_value(entry.mode);
                self.regs.a = res;
                self.set_nz(res);
            }
            Op::Ora => {
                let res = self.regs.a | self.operand_value(entry.mode);
                self.regs.a = res;
                self.set_nz(res);
            }
            Op::Eor => {
                let res = self.regs.a ^ self.operand_value(entry.mode);
                self.regs.a = res;
                self.set_nz(res);
            }

            // Compare and bit test
            Op::Cmp => {
                let val = self.operand_value(entry.mode);
                let reg = self.regs.a;
                self.compare(reg, val);
            }
            Op::Cpx => {
                let val = self.operand_value(entry.mode);
                let reg = self.regs.x;
                self.compare(reg, val);
            }
            Op::Cpy => {
                let val = self.operand_value(entry.mode);
                let reg = self.regs.y;
                self.compare(reg, val);
            }
            Op::Bit => {
                let val = self.operand_value(entry.mode);
                self.flags.set(Status::NEGATIVE, val & 0x80 != 0);
                self.flags.set(Status::OVERFLOW, val & 0x40 != 0);
                self.flags.set(Status::ZERO, self.regs.a & val == 0);
            }

            // Shift and rotate
            Op::Asl => self.modify(entry.mode, CPU::asl),
            Op::Lsr => self.modify(entry.mode, CPU::lsr),
            Op::Rol => self.modify(entry.mode, CPU::rol),
            Op::Ror => self.modify(entry.mode, CPU::ror),

            // Increment and decrement
            Op::Inc => self.modify(entry.mode, CPU::inc),
            Op::Dec => self.modify(entry.mode, CPU::dec),
            Op::Inx => {
                let res = self.regs.x.wrapping_add(1);
                self.regs.x = res;
                self.set_nz(res);
            }
            Op::Iny => {
                let res = self.regs.y.wrapping_add(1);
                self.regs.y = res;
                self.set_nz(res);
            }
            Op::Dex => {
                let res = self.regs.x.wrapping_sub(1);
                self.regs.x = res;
                self.set_nz(res);
            }
            Op::Dey => {
                let res = self.regs.y.wrapping_sub(1);
                self.regs.y = res;
                self.set_nz(res);
            }

            // Register transfers
            Op::Tax => {
                let val = self.regs.a;
                self.regs.x = val;
                self.set_nz(val);
            }
            Op::Txa => {
                let val = self.regs.x;
                self.regs.a = val;
                self.set_nz(val);
            }
            Op::Tay => {
                let val = self.regs.a;
                self.regs.y = val;
                self.set_nz(val);
            }
            Op::Tya => {
                let val = self.regs.y;
                self.regs.a = val;
                self.set_nz(val);
            }
            Op::Tsx => {
                let val = self.regs.sp;
                self.regs.x = val;
                self.set_nz(val);
            }
            Op::Txs => {
                // The only transfer that leaves the flags alone.
                self.regs.sp = self.regs.x;
            }

            // Stack
            Op::Pha => {
                let val = self.regs.a;
                self.push(val);
            }
            Op::Pla => {
                let val = self.pop();
                self.regs.a = val;
                self.set_nz(val);
            }
            Op::Php => {
                let val = self.flags.bits();
                self.push(val);
            }
            Op::Plp => {
                let val = self.pop();
                self.flags = Status::from_bits_truncate(val);
            }

            // Jumps and subroutines
            Op::Jmp => {
                self.regs.pc = self.operand_addr(entry.mode);
            }
            Op::Jsr => {
                let target = self.fetch_word();
                let ret = self.regs.pc.wrapping_sub(1);
                self.push_word(ret);
                self.regs.pc = target;
            }
            Op::Rts => {
                self.regs.pc = self.pop_word().wrapping_add(1);
            }
            Op::Rti => {
                let val = self.pop();
                self.flags = Status::from_bits_truncate(val);
                self.regs.pc = self.pop_word();
            }

            // Branches
            Op::Bpl => {
                let cond = !self.flags.contains(Status::NEGATIVE);
                cycles += self.branch_if(cond);
            }
            Op::Bmi => {
                let cond = self.flags.contains(Status::NEGATIVE);
                cycles += self.branch_if(cond);
            }
            Op::Bvc => {
                let cond = !self.flags.contains(Status::OVERFLOW);
                cycles += self.branch_if(cond);
            }
            Op::Bvs => {
                let cond = self.flags.contains(Status::OVERFLOW);
                cycles += self.branch_if(cond);
            }
            Op::Bcc => {
                let cond = !self.flags.contains(Status::CARRY);
                cycles += self.branch_if(cond);
            }
            Op::Bcs => {
                let cond = self.flags.contains(Status::CARRY);
                cycles += self.branch_if(cond);
            }
            Op::Bne => {
                let cond = !self.flags.contains(Status::ZERO);
                cycles += self.branch_if(cond);
            }
            Op::Beq => {
                let cond = self.flags.contains(Status::ZERO);
                cycles += self.branch_if(cond);
            }

            // Flag operations
            Op::Clc => self.flags.remove(Status::CARRY),
            Op::Sec => self.flags.insert(Status::CARRY),
            Op::Cli => self.flags.remove(Status::INTERRUPT),
            Op::Sei => self.flags.insert(Status::INTERRUPT),
            Op::Clv => self.flags.remove(Status::OVERFLOW),
            Op::Cld => self.flags.remove(Status::DECIMAL),
            Op::Sed => self.flags.insert(Status::DECIMAL),

            Op::Nop => {}

            Op::Brk => {
                // Push the return address and a status byte with
                // Break set, mark the live flags, and halt. There is
                // no interrupt vector to chain to in this model, so
                // the halt is deterministic. Unrecognized opcodes
                // halt without any of this.
                let ret = self.regs.pc.wrapping_add(1);
                self.push_word(ret);
                let val = (self.flags | Status::BREAK).bits();
                self.push(val);
                self.flags.insert(Status::BREAK | Status::INTERRUPT);
                debug!("halt: BRK at {:04X}", self.regs.pc.wrapping_sub(1));
                halted = true;
            }
        }

        self.clock.consume_ticks(cycles);
        !halted
    }

    /// Set the negative and zero flags from an 8-bit result.
    fn set_nz(&mut self, val: u8) {
        self.flags.set(Status::ZERO, val == 0);
        self.flags.set(Status::NEGATIVE, val & 0x80 != 0);
    }

    /// Run a read-modify-write operation against the accumulator or
    /// the resolved memory operand.
    fn modify(&mut self, mode: AddrMode, f: fn(&mut CPU, u8) -> u8) {
        if mode == AddrMode::Accumulator {
            let val = self.regs.a;
            let res = f(self, val);
            self.regs.a = res;
        } else {
            let addr = self.operand_addr(mode);
            let val = self.mem.get(addr);
            let res = f(self, val);
            self.mem.put(addr, res);
        }
    }

    /// Add with carry, in binary or decimal mode per the D flag.
    fn adc(&mut self, val: u8) {
        if self.flags.contains(Status::DECIMAL) {
            self.adc_decimal(val);
        } else {
            self.adc_binary(val);
        }
    }

    /// Subtract with carry. Binary subtraction is addition of the
    /// one's complement, with identical flag rules.
    fn sbc(&mut self, val: u8) {
        if self.flags.contains(Status::DECIMAL) {
            self.sbc_decimal(val);
        } else {
            self.adc_binary(!val);
        }
    }

    /// Binary add with carry-in.
    ///
    /// Condition Codes:
    ///
    ///   C - Set from the ninth bit of the sum.
    ///   V - Set when both operands share a sign that differs from
    ///       the result's sign.
    ///   N - Set if the result is negative; cleared otherwise.
    ///   Z - Set if the result is zero; cleared otherwise.
    fn adc_binary(&mut self, val: u8) {
        let a = self.regs.a;
        let carry = u16::from(self.flags.contains(Status::CARRY));
        let sum = u16::from(a) + u16::from(val) + carry;
        let res = sum as u8;

        self.flags.set(Status::CARRY, sum > 0xFF);
        self.flags.set(Status::OVERFLOW, (a ^ res) & (val ^ res) & 0x80 != 0);
        self.regs.a = res;
        self.set_nz(res);
    }

    /// Decimal add with carry-in, using the standard nibble-correction
    /// algorithm: adjust an out-of-range low nibble by 6, take N and V
    /// from the intermediate sum, adjust the high nibble by 0x60, take
    /// C from the corrected sum and Z from the binary sum.
    fn adc_decimal(&mut self, val: u8) {
        let a = u16::from(self.regs.a);
        let m = u16::from(val);
        let carry = u16::from(self.flags.contains(Status::CARRY));

        let bin = a + m + carry;

        let mut lo = (a & 0x0F) + (m & 0x0F) + carry;
        if lo > 0x09 {
            lo = ((lo + 0x06) & 0x0F) + 0x10;
        }

        let mut sum = (a & 0xF0) + (m & 0xF0) + lo;
        self.flags.set(Status::NEGATIVE, sum & 0x80 != 0);
        self.flags.set(Status::OVERFLOW, (a ^ sum) & (m ^ sum) & 0x80 != 0);
        if sum > 0x9F {
            sum += 0x60;
        }

        self.flags.set(Status::CARRY, sum > 0xFF);
        self.flags.set(Status::ZERO, bin & 0xFF == 0);
        self.regs.a = sum as u8;
    }

    /// Decimal subtract with carry-in. All four flags follow the
    /// binary subtraction; only the stored result is BCD-adjusted.
    fn sbc_decimal(&mut self, val: u8) {
        let a = self.regs.a;
        let carry = i16::from(self.flags.contains(Status::CARRY));

        let mut lo = i16::from(a & 0x0F) - i16::from(val & 0x0F) + carry - 1;
        if lo < 0 {
            lo = ((lo - 0x06) & 0x0F) - 0x10;
        }
        let mut res = i16::from(a & 0xF0) - i16::from(val & 0xF0) + lo;
        if res < 0 {
            res -= 0x60;
        }

        let bin = u16::from(a) + u16::from(!val) + u16::from(self.flags.contains(Status::CARRY));
        let bres = bin as u8;
        self.flags.set(Status::CARRY, bin > 0xFF);
        self.flags.set(Status::OVERFLOW, (a ^ bres) & (!val ^ bres) & 0x80 != 0);
        self.set_nz(bres);

        self.regs.a = (res & 0xFF) as u8;
    }

    /// Compare a register against an operand without modifying it.
    ///
    /// Condition Codes:
    ///
    ///   C - Set if the register is greater than or equal to the
    ///       operand (no borrow).
    ///   N, Z - Set from the 8-bit difference.
    fn compare(&mut self, reg: u8, val: u8) {
        self.flags.set(Status::CARRY, reg >= val);
        self.set_nz(reg.wrapping_sub(val));
    }

    /// Shift left one bit. Bit 7 goes to carry, bit 0 is zero-filled.
    fn asl(&mut self, val: u8) -> u8 {
        let res = val << 1;
        self.flags.set(Status::CARRY, val & 0x80 != 0);
        self.set_nz(res);
        res
    }

    /// Shift right one bit. Bit 0 goes to carry, bit 7 is zero-filled.
    fn lsr(&mut self, val: u8) -> u8 {
        let res = val >> 1;
        self.flags.set(Status::CARRY, val & 0x01 != 0);
        self.set_nz(res);
        res
    }

    /// Rotate left through the carry bit. This is a 9-bit rotation.
    fn rol(&mut self, val: u8) -> u8 {
        let lo = u8::from(self.flags.contains(Status::CARRY));
        let res = (val << 1) | lo;
        self.flags.set(Status::CARRY, val & 0x80 != 0);
        self.set_nz(res);
        res
    }

    /// Rotate right through the carry bit. This is a 9-bit rotation.
    fn ror(&mut self, val: u8) -> u8 {
        let hi = if self.flags.contains(Status::CARRY) { 0x80 } else { 0x00 };
        let res = (val >> 1) | hi;
        self.flags.set(Status::CARRY, val & 0x01 != 0);
        self.set_nz(res);
        res
    }

    /// Increment a memory operand. The carry bit is not affected.
    fn inc(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.set_nz(res);
        res
    }

    /// Decrement a memory operand. The carry bit is not affected.
    fn dec(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.set_nz(res);
        res
    }

    /// Consume the relative offset and, if `cond` holds, displace the
    /// PC by it as a signed 8-bit value. Returns the extra cycle a
    /// taken branch costs.
    fn branch_if(&mut self, cond: bool) -> u32 {
        let offset = self.fetch_byte();
        if !cond {
            return 0;
        }
        self.regs.pc = self.regs.pc.wrapping_add(i16::from(offset as i8) as u16);
        1
    }
}

/// Macro used to check flags after executing an instruction.
#[cfg(test)]
macro_rules! assert_flags {
    ($cpu:expr => $($flag:ident: $val:expr),* $(,)?) => (
        $(assert_eq!($cpu.flags.contains(Status::$flag), $val,
                     concat!("flag ", stringify!($flag)));)*
    );
}

#[cfg(test)]
#[path = "cpu_test.rs"]
mod tests;
