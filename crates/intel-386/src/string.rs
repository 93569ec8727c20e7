//! String instruction execution: LODS/STOS/MOVS/SCAS/CMPS.
//!
//! ESI and EDI are the cursors, stepped by ±width per iteration according
//! to DF. A repeat prefix turns one instruction into an ECX-counted loop;
//! SCAS and CMPS additionally stop on the ZF test their REPE/REPNE prefix
//! selects.

use emu_core::Bus;

use crate::alu;
use crate::cpu::{Cpu386, Rep};
use crate::flags::{DF, ZF};
use crate::operand::Width;
use crate::registers::{ECX, EDI, ESI};

/// The five string operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringOp {
    Lods,
    Stos,
    Movs,
    Scas,
    Cmps,
}

impl StringOp {
    const fn mnemonic(self) -> &'static str {
        match self {
            StringOp::Lods => "lods",
            StringOp::Stos => "stos",
            StringOp::Movs => "movs",
            StringOp::Scas => "scas",
            StringOp::Cmps => "cmps",
        }
    }

    /// Does a repeat prefix test ZF after each iteration?
    const fn repeats_on_flags(self) -> bool {
        matches!(self, StringOp::Scas | StringOp::Cmps)
    }
}

impl Cpu386 {
    /// Execute one string instruction, honouring a repeat prefix.
    pub(crate) fn op_string<B: Bus>(&mut self, bus: &mut B, op: StringOp, w: Width) -> u32 {
        match self.rep {
            None => self.string_once(bus, op, w),
            Some(rep) => {
                while self.regs.reg32(ECX) != 0 {
                    self.string_once(bus, op, w);
                    self.regs
                        .set_reg32(ECX, self.regs.reg32(ECX).wrapping_sub(1));
                    if op.repeats_on_flags() {
                        let zf = self.regs.eflags.is_set(ZF);
                        if (rep == Rep::Repe && !zf) || (rep == Rep::Repne && zf) {
                            break;
                        }
                    }
                }
            }
        }
        self.trace_asm(format_args!("{}{}", op.mnemonic(), w.suffix()));
        1
    }

    /// One iteration: move/compare the element, then step the cursors.
    fn string_once<B: Bus>(&mut self, bus: &mut B, op: StringOp, w: Width) {
        let esi = self.regs.reg32(ESI);
        let edi = self.regs.reg32(EDI);
        match op {
            StringOp::Lods => {
                let v = bus.read(esi, w.bytes());
                self.write_reg(w, 0, v);
                self.step_cursor(ESI, w);
            }
            StringOp::Stos => {
                bus.write(edi, w.bytes(), self.read_reg(w, 0));
                self.step_cursor(EDI, w);
            }
            StringOp::Movs => {
                let v = bus.read(esi, w.bytes());
                bus.write(edi, w.bytes(), v);
                self.step_cursor(ESI, w);
                self.step_cursor(EDI, w);
            }
            StringOp::Scas => {
                let v = bus.read(edi, w.bytes());
                let a = self.read_reg(w, 0);
                alu::sub(&mut self.regs.eflags, w, a, v, 0);
                self.step_cursor(EDI, w);
            }
            StringOp::Cmps => {
                let a = bus.read(esi, w.bytes());
                let b = bus.read(edi, w.bytes());
                alu::sub(&mut self.regs.eflags, w, a, b, 0);
                self.step_cursor(ESI, w);
                self.step_cursor(EDI, w);
            }
        }
    }

    /// Step ESI or EDI by ±width per DF.
    fn step_cursor(&mut self, cursor: u8, w: Width) {
        let delta = if self.regs.eflags.is_set(DF) {
            w.bytes().wrapping_neg()
        } else {
            w.bytes()
        };
        self.regs
            .set_reg32(cursor, self.regs.reg32(cursor).wrapping_add(delta));
    }
}
