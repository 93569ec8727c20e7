//! Logic instruction execution: TEST and the shift group.

use emu_core::Bus;

use crate::alu;
use crate::cpu::Cpu386;
use crate::operand::Width;
use crate::registers::ECX;

/// Shift-count source for the C0/C1/D0-D3 group.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ShiftCount {
    /// Immediate byte after ModR/M.
    Imm8,
    /// Constant 1.
    One,
    /// The CL register.
    Cl,
}

impl Cpu386 {
    /// TEST r/m, reg (84/85): AND without writeback.
    pub(crate) fn op_test_r2rm<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_r2rm(bus, w, true);
        alu::logic(&mut self.regs.eflags, w, i.dest.val & i.src.val);
        self.trace_asm(format_args!("test{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// TEST accumulator, imm (A8/A9).
    pub(crate) fn op_test_i2a<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_i2a(bus, w);
        alu::logic(&mut self.regs.eflags, w, i.dest.val & i.src.val);
        self.trace_asm(format_args!("test{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// The shift group: the ModR/M `reg` field selects the operation,
    /// `count` tells where the shift count comes from. Counts are masked
    /// to 5 bits as the hardware does.
    pub(crate) fn op_shift_group<B: Bus>(
        &mut self,
        bus: &mut B,
        w: Width,
        count: ShiftCount,
    ) -> u32 {
        let i = self.dec_rm(bus, w, true);
        let (n, len) = match count {
            ShiftCount::Imm8 => (
                self.fetch(bus, self.regs.eip.wrapping_add(i.len), Width::Byte),
                i.len + 1,
            ),
            ShiftCount::One => (1, i.len),
            ShiftCount::Cl => (u32::from(self.regs.reg8(ECX)), i.len),
        };
        let n = n & 0x1F;

        let fl = &mut self.regs.eflags;
        let (mnemonic, result) = match i.ext {
            4 => ("shl", alu::shl(fl, w, i.dest.val, n)),
            5 => ("shr", alu::shr(fl, w, i.dest.val, n)),
            7 => ("sar", alu::sar(fl, w, i.dest.val, n)),
            ext => panic!(
                "unimplemented shift form /{ext} at {:#010x}",
                self.instr_start
            ),
        };
        self.write_operand(bus, &i.dest, result);
        self.trace_asm(format_args!("{mnemonic}{} ${n},{}", w.suffix(), i.dest));
        len
    }
}
