//! Data movement: MOV in all its forms, XCHG, LEA, MOVZX/MOVSX, and the
//! stack operations PUSH/POP/LEAVE.
//!
//! None of these touch the flags.

use emu_core::Bus;

use crate::cpu::Cpu386;
use crate::operand::{Operand, OperandKind, Width};
use crate::registers::{EBP, ESP, REGS32};

impl Cpu386 {
    // ================================================================
    // MOV
    // ================================================================

    /// MOV r/m, reg (88/89).
    pub(crate) fn op_mov_r2rm<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_r2rm(bus, w, false);
        self.write_operand(bus, &i.dest, i.src.val);
        self.trace_asm(format_args!("mov{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// MOV reg, r/m (8A/8B).
    pub(crate) fn op_mov_rm2r<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm2r(bus, w);
        self.write_reg(w, i.ext, i.src.val);
        self.trace_asm(format_args!("mov{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// MOV r/m, imm (C6/C7).
    pub(crate) fn op_mov_i2rm<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_i2rm(bus, w, w, false);
        self.write_operand(bus, &i.dest, i.src.val);
        self.trace_asm(format_args!("mov{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// MOV reg, imm with the register in the opcode (B0-BF).
    pub(crate) fn op_mov_i2r<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        let r = opcode & 7;
        let val = self.fetch(bus, self.regs.eip.wrapping_add(1), w);
        self.write_reg(w, r, val);
        self.trace_asm(format_args!(
            "mov{} ${val:#x},{}",
            w.suffix(),
            Operand::reg(w, r, val)
        ));
        1 + w.bytes()
    }

    /// MOV between the accumulator and an absolute address (A0-A3).
    pub(crate) fn op_mov_moffs<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        let addr = self.fetch(bus, self.regs.eip.wrapping_add(1), Width::Long);
        if opcode & 2 == 0 {
            // A0/A1: load accumulator
            let val = bus.read(addr, w.bytes());
            self.write_reg(w, 0, val);
            self.trace_asm(format_args!("mov{} {addr:#x},%{}", w.suffix(), acc_name(w)));
        } else {
            // A2/A3: store accumulator
            let val = self.read_reg(w, 0);
            bus.write(addr, w.bytes(), val);
            self.trace_asm(format_args!("mov{} %{},{addr:#x}", w.suffix(), acc_name(w)));
        }
        5
    }

    /// XCHG r/m, reg (86/87).
    pub(crate) fn op_xchg<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_r2rm(bus, w, true);
        self.write_reg(w, i.ext, i.dest.val);
        self.write_operand(bus, &i.dest, i.src.val);
        self.trace_asm(format_args!("xchg{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// LEA (8D): store the effective address, no memory access.
    pub(crate) fn op_lea<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm(bus, w, false);
        let OperandKind::Mem(addr) = i.dest.kind else {
            panic!("lea with a register operand at {:#010x}", self.instr_start);
        };
        self.write_reg(w, i.ext, addr);
        self.trace_asm(format_args!(
            "lea{} {},%{}",
            w.suffix(),
            i.dest,
            REGS32[i.ext as usize]
        ));
        i.len
    }

    /// MOVZX (0F B6/B7): zero-extend a narrower r/m into a register.
    pub(crate) fn op_movzx<B: Bus>(&mut self, bus: &mut B, src_w: Width, w: Width) -> u32 {
        let i = self.dec_rmw2r(bus, src_w, w);
        self.write_reg(w, i.ext, i.src.val);
        self.trace_asm(format_args!(
            "movz{}{} {},{}",
            src_w.suffix(),
            w.suffix(),
            i.src,
            i.dest
        ));
        i.len
    }

    /// MOVSX (0F BE/BF): sign-extend a narrower r/m into a register.
    pub(crate) fn op_movsx<B: Bus>(&mut self, bus: &mut B, src_w: Width, w: Width) -> u32 {
        let i = self.dec_rmw2r(bus, src_w, w);
        self.write_reg(w, i.ext, src_w.sign_extend(i.src.val) & w.mask());
        self.trace_asm(format_args!(
            "movs{}{} {},{}",
            src_w.suffix(),
            w.suffix(),
            i.src,
            i.dest
        ));
        i.len
    }

    // ================================================================
    // Stack
    // ================================================================

    /// Push a value of the given width.
    pub(crate) fn push<B: Bus>(&mut self, bus: &mut B, w: Width, value: u32) {
        let esp = self.regs.reg32(ESP).wrapping_sub(w.bytes());
        self.regs.set_reg32(ESP, esp);
        bus.write(esp, w.bytes(), value & w.mask());
    }

    /// Pop a value of the given width.
    pub(crate) fn pop<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let esp = self.regs.reg32(ESP);
        let value = bus.read(esp, w.bytes());
        self.regs.set_reg32(ESP, esp.wrapping_add(w.bytes()));
        value
    }

    /// PUSH reg (50-57).
    pub(crate) fn op_push_reg<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        let r = opcode & 7;
        let val = self.read_reg(w, r);
        self.push(bus, w, val);
        self.trace_asm(format_args!("push{} {}", w.suffix(), Operand::reg(w, r, val)));
        1
    }

    /// PUSH imm (68) or sign-extended imm8 (6A).
    pub(crate) fn op_push_imm<B: Bus>(&mut self, bus: &mut B, w: Width, imm_w: Width) -> u32 {
        let raw = self.fetch(bus, self.regs.eip.wrapping_add(1), imm_w);
        let val = if imm_w == w {
            raw
        } else {
            imm_w.sign_extend(raw) & w.mask()
        };
        self.push(bus, w, val);
        self.trace_asm(format_args!("push{} ${val:#x}", w.suffix()));
        1 + imm_w.bytes()
    }

    /// PUSH r/m (FF /6).
    pub(crate) fn op_push_rm<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm(bus, w, true);
        self.push(bus, w, i.dest.val);
        self.trace_asm(format_args!("push{} {}", w.suffix(), i.dest));
        i.len
    }

    /// POP reg (58-5F).
    pub(crate) fn op_pop_reg<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        let r = opcode & 7;
        let val = self.pop(bus, w);
        self.write_reg(w, r, val);
        self.trace_asm(format_args!("pop{} {}", w.suffix(), Operand::reg(w, r, val)));
        1
    }

    /// LEAVE (C9): tear down the current frame.
    pub(crate) fn op_leave<B: Bus>(&mut self, bus: &mut B) -> u32 {
        self.regs.set_reg32(ESP, self.regs.reg32(EBP));
        let ebp = self.pop(bus, Width::Long);
        self.regs.set_reg32(EBP, ebp);
        self.trace_asm(format_args!("leave"));
        1
    }
}

/// Accumulator name at a width, for traces.
fn acc_name(w: Width) -> &'static str {
    match w {
        Width::Byte => "al",
        Width::Word => "ax",
        Width::Long => "eax",
    }
}
