//! Control flow: CALL/RET, JMP, and the conditional family
//! (Jcc/SETcc/CMOVcc) sharing one predicate table.
//!
//! Relative forms add their displacement to EIP and report their length;
//! the dispatcher's advance then lands on `next instruction + offset`.
//! Absolute forms (RET, JMP/CALL through r/m) replace EIP and report 0.

use emu_core::Bus;

use crate::cpu::Cpu386;
use crate::flags::{CC_NAMES, condition};
use crate::operand::Width;
use crate::registers::ESP;

impl Cpu386 {
    /// CALL rel (E8): push the return address, then displace EIP.
    pub(crate) fn op_call_rel<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let len = 1 + w.bytes();
        let offset = w.sign_extend(self.fetch(bus, self.regs.eip.wrapping_add(1), w));
        let return_addr = self.regs.eip.wrapping_add(len);
        self.push(bus, Width::Long, return_addr);
        self.regs.eip = self.regs.eip.wrapping_add(offset);
        self.trace_asm(format_args!(
            "call {:#x}",
            return_addr.wrapping_add(offset)
        ));
        len
    }

    /// CALL r/m (FF /2): absolute target.
    pub(crate) fn op_call_rm<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm(bus, w, true);
        let return_addr = self.regs.eip.wrapping_add(i.len);
        self.push(bus, Width::Long, return_addr);
        self.regs.eip = i.dest.val;
        self.trace_asm(format_args!("call *{}", i.dest));
        0
    }

    /// RET (C3) and RET imm16 (C2): pop EIP, optionally release caller
    /// arguments.
    pub(crate) fn op_ret<B: Bus>(&mut self, bus: &mut B, pop_imm: bool) -> u32 {
        let extra = if pop_imm {
            self.fetch(bus, self.regs.eip.wrapping_add(1), Width::Word)
        } else {
            0
        };
        let target = self.pop(bus, Width::Long);
        let esp = self.regs.reg32(ESP);
        self.regs.set_reg32(ESP, esp.wrapping_add(extra));
        self.regs.eip = target;
        if pop_imm {
            self.trace_asm(format_args!("ret ${extra:#x}"));
        } else {
            self.trace_asm(format_args!("ret"));
        }
        0
    }

    /// JMP rel8 (EB) / rel16-32 (E9); `imm_w` is the offset's width.
    pub(crate) fn op_jmp_rel<B: Bus>(&mut self, bus: &mut B, imm_w: Width) -> u32 {
        let len = 1 + imm_w.bytes();
        let offset = imm_w.sign_extend(self.fetch(bus, self.regs.eip.wrapping_add(1), imm_w));
        let target = self.regs.eip.wrapping_add(len).wrapping_add(offset);
        self.regs.eip = self.regs.eip.wrapping_add(offset);
        self.trace_asm(format_args!("jmp {target:#x}"));
        len
    }

    /// JMP r/m (FF /4): absolute target.
    pub(crate) fn op_jmp_rm<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm(bus, w, true);
        self.regs.eip = i.dest.val;
        self.trace_asm(format_args!("jmp *{}", i.dest));
        0
    }

    /// Jcc rel8 (70-7F).
    pub(crate) fn op_jcc_short<B: Bus>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let cc = opcode & 0xF;
        let offset =
            Width::Byte.sign_extend(self.fetch(bus, self.regs.eip.wrapping_add(1), Width::Byte));
        let target = self.regs.eip.wrapping_add(2).wrapping_add(offset);
        if condition(cc, self.regs.eflags) {
            self.regs.eip = self.regs.eip.wrapping_add(offset);
        }
        self.trace_asm(format_args!("j{} {target:#x}", CC_NAMES[cc as usize]));
        2
    }

    /// Jcc rel16-32 (0F 80-8F), offset width per the operand-size prefix.
    pub(crate) fn op_jcc_near<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        let cc = opcode & 0xF;
        let len = 1 + w.bytes();
        let offset = w.sign_extend(self.fetch(bus, self.regs.eip.wrapping_add(1), w));
        let target = self.regs.eip.wrapping_add(len).wrapping_add(offset);
        if condition(cc, self.regs.eflags) {
            self.regs.eip = self.regs.eip.wrapping_add(offset);
        }
        self.trace_asm(format_args!("j{} {target:#x}", CC_NAMES[cc as usize]));
        len
    }

    /// SETcc r/m8 (0F 90-9F): store the predicate as 0 or 1.
    pub(crate) fn op_setcc<B: Bus>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        let cc = opcode & 0xF;
        let i = self.dec_rm(bus, Width::Byte, false);
        let value = u32::from(condition(cc, self.regs.eflags));
        self.write_operand(bus, &i.dest, value);
        self.trace_asm(format_args!("set{} {}", CC_NAMES[cc as usize], i.dest));
        i.len
    }

    /// CMOVcc reg, r/m (0F 40-4F): conditional register load.
    pub(crate) fn op_cmovcc<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        let cc = opcode & 0xF;
        let i = self.dec_rm2r(bus, w);
        if condition(cc, self.regs.eflags) {
            self.write_reg(w, i.ext, i.src.val);
        }
        self.trace_asm(format_args!(
            "cmov{}{} {},{}",
            CC_NAMES[cc as usize],
            w.suffix(),
            i.src,
            i.dest
        ));
        i.len
    }
}
