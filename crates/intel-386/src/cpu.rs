//! CPU state, prefix handling and instruction stepping.

use std::fmt;

use emu_core::{Bus, Cpu};

use crate::operand::{Operand, OperandKind, Width};
use crate::registers::Registers;

/// Repeat prefix attached to the current instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rep {
    /// F3: REP / REPE.
    Repe,
    /// F2: REPNE.
    Repne,
}

/// The Intel 80386 CPU core.
///
/// Executes one whole instruction per [`Cpu::step`]. Fetch, decode and
/// data accesses all go through the bus passed to `step`; the core owns
/// registers only.
#[derive(Debug)]
pub struct Cpu386 {
    /// Register file.
    pub regs: Registers,

    /// Halt latch, set by HLT.
    halted: bool,

    /// Address of the first byte of the current instruction (prefixes
    /// included), for tracing.
    pub(crate) instr_start: u32,

    /// Repeat prefix of the current instruction.
    pub(crate) rep: Option<Rep>,

    /// Retired-instruction count.
    retired: u64,
}

impl Default for Cpu386 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu386 {
    /// Create a CPU in reset state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            halted: false,
            instr_start: 0,
            rep: None,
            retired: 0,
        }
    }

    /// Number of instructions retired since reset.
    #[must_use]
    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// Read a register at the given width. Byte indices follow the 8-bit
    /// view rule (4-7 are the high bytes of 0-3).
    pub(crate) fn read_reg(&self, w: Width, i: u8) -> u32 {
        match w {
            Width::Byte => u32::from(self.regs.reg8(i)),
            Width::Word => u32::from(self.regs.reg16(i)),
            Width::Long => self.regs.reg32(i),
        }
    }

    /// Write a register at the given width, preserving the rest.
    pub(crate) fn write_reg(&mut self, w: Width, i: u8, value: u32) {
        match w {
            Width::Byte => self.regs.set_reg8(i, value as u8),
            Width::Word => self.regs.set_reg16(i, value as u16),
            Width::Long => self.regs.set_reg32(i, value),
        }
    }

    /// Write a result back to a decoded operand.
    pub(crate) fn write_operand<B: Bus>(&mut self, bus: &mut B, op: &Operand, value: u32) {
        match op.kind {
            OperandKind::Reg(i) => self.write_reg(op.w, i, value),
            OperandKind::Mem(addr) => bus.write(addr, op.w.bytes(), value & op.w.mask()),
            OperandKind::Imm => unreachable!("write to an immediate operand"),
        }
    }

    /// Emit one disassembly trace line for the current instruction.
    pub(crate) fn trace_asm(&self, args: fmt::Arguments<'_>) {
        log::trace!(target: "asm", "{:#010x}: {args}", self.instr_start);
    }

    /// Execute one instruction, returning its total encoded length
    /// (prefixes included), or 0 when EIP was replaced outright.
    fn step_instr<B: Bus>(&mut self, bus: &mut B) -> u32 {
        self.instr_start = self.regs.eip;
        self.rep = None;
        let mut w = Width::Long;

        // Prefixes. 66 selects the 16-bit instantiation; F2/F3 repeat
        // string instructions. 67 (address size) is not used by the
        // supported guests.
        let mut prefix_len = 0;
        loop {
            match bus.read(self.regs.eip, 1) as u8 {
                0x66 => w = Width::Word,
                0xF3 => self.rep = Some(Rep::Repe),
                0xF2 => self.rep = Some(Rep::Repne),
                _ => break,
            }
            self.regs.eip = self.regs.eip.wrapping_add(1);
            prefix_len += 1;
        }

        let opcode = bus.read(self.regs.eip, 1) as u8;
        let len = if opcode == 0x0F {
            // Consume the escape byte like a prefix so the second byte
            // decodes exactly like a one-byte opcode.
            self.regs.eip = self.regs.eip.wrapping_add(1);
            prefix_len += 1;
            let opcode2 = bus.read(self.regs.eip, 1) as u8;
            self.execute_0f(bus, opcode2, w)
        } else {
            self.execute(bus, opcode, w)
        };

        self.retired += 1;
        if len == 0 {
            // EIP was replaced outright (ret, jmp/call through r/m).
            0
        } else {
            self.regs.eip = self.regs.eip.wrapping_add(len);
            prefix_len + len
        }
    }
}

impl Cpu for Cpu386 {
    type Registers = Registers;

    fn step<B: Bus>(&mut self, bus: &mut B) -> u32 {
        self.step_instr(bus)
    }

    fn pc(&self) -> u32 {
        self.regs.eip
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    fn reset(&mut self) {
        self.regs = Registers::new();
        self.halted = false;
        self.instr_start = 0;
        self.rep = None;
        self.retired = 0;
    }
}

impl Cpu386 {
    /// Latch the halt state. Cleared only by reset.
    pub(crate) fn halt(&mut self) {
        self.halted = true;
    }
}
