//! Opcode dispatch.
//!
//! One arm per opcode (or per opcode run sharing a handler); each handler
//! finishes decoding from the byte after the opcode and returns the
//! instruction length it consumed, opcode byte included. Absolute control
//! transfers return 0 after replacing EIP.

use emu_core::Bus;

use crate::arith::AluOp;
use crate::cpu::Cpu386;
use crate::logic::ShiftCount;
use crate::operand::Width;
use crate::string::StringOp;

impl Cpu386 {
    /// Execute a one-byte opcode. `w` is the operand width selected by the
    /// 66 prefix (long without it); byte-sized opcodes ignore it.
    pub(crate) fn execute<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        match opcode {
            // ==========================================================
            // Two-operand ALU: ADD/OR/ADC/SBB/AND/SUB/XOR/CMP
            // ==========================================================

            // op r/m8, r8
            0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
                self.op_alu_r2rm(bus, AluOp::from_ext(opcode >> 3), Width::Byte)
            }
            // op r/m, r
            0x01 | 0x09 | 0x11 | 0x19 | 0x21 | 0x29 | 0x31 | 0x39 => {
                self.op_alu_r2rm(bus, AluOp::from_ext(opcode >> 3), w)
            }
            // op r8, r/m8
            0x02 | 0x0A | 0x12 | 0x1A | 0x22 | 0x2A | 0x32 | 0x3A => {
                self.op_alu_rm2r(bus, AluOp::from_ext(opcode >> 3), Width::Byte)
            }
            // op r, r/m
            0x03 | 0x0B | 0x13 | 0x1B | 0x23 | 0x2B | 0x33 | 0x3B => {
                self.op_alu_rm2r(bus, AluOp::from_ext(opcode >> 3), w)
            }
            // op al, imm8
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                self.op_alu_i2a(bus, AluOp::from_ext(opcode >> 3), Width::Byte)
            }
            // op eax, imm
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                self.op_alu_i2a(bus, AluOp::from_ext(opcode >> 3), w)
            }

            // grp1 r/m8, imm8
            0x80 => self.op_alu_group_imm(bus, Width::Byte, Width::Byte),
            // grp1 r/m, imm
            0x81 => self.op_alu_group_imm(bus, w, w),
            // grp1 r/m, imm8 (sign-extended)
            0x83 => self.op_alu_group_imm(bus, w, Width::Byte),

            // ==========================================================
            // INC/DEC
            // ==========================================================

            // inc r / dec r
            0x40..=0x4F => self.op_inc_dec_reg(opcode, w),

            // ==========================================================
            // Stack
            // ==========================================================

            // push r
            0x50..=0x57 => self.op_push_reg(bus, opcode, w),
            // pop r
            0x58..=0x5F => self.op_pop_reg(bus, opcode, w),
            // push imm
            0x68 => self.op_push_imm(bus, w, w),
            // push imm8 (sign-extended)
            0x6A => self.op_push_imm(bus, w, Width::Byte),
            // leave
            0xC9 => self.op_leave(bus),

            // ==========================================================
            // IMUL (three-operand forms)
            // ==========================================================

            // imul r, r/m, imm
            0x69 => self.op_imul_imm(bus, w, w),
            // imul r, r/m, imm8 (sign-extended)
            0x6B => self.op_imul_imm(bus, w, Width::Byte),

            // ==========================================================
            // Conditional jumps (short)
            // ==========================================================

            // jcc rel8
            0x70..=0x7F => self.op_jcc_short(bus, opcode),

            // ==========================================================
            // TEST / XCHG
            // ==========================================================

            // test r/m8, r8
            0x84 => self.op_test_r2rm(bus, Width::Byte),
            // test r/m, r
            0x85 => self.op_test_r2rm(bus, w),
            // xchg r/m8, r8
            0x86 => self.op_xchg(bus, Width::Byte),
            // xchg r/m, r
            0x87 => self.op_xchg(bus, w),
            // test al, imm8
            0xA8 => self.op_test_i2a(bus, Width::Byte),
            // test eax, imm
            0xA9 => self.op_test_i2a(bus, w),

            // ==========================================================
            // MOV / LEA
            // ==========================================================

            // mov r/m8, r8
            0x88 => self.op_mov_r2rm(bus, Width::Byte),
            // mov r/m, r
            0x89 => self.op_mov_r2rm(bus, w),
            // mov r8, r/m8
            0x8A => self.op_mov_rm2r(bus, Width::Byte),
            // mov r, r/m
            0x8B => self.op_mov_rm2r(bus, w),
            // lea r, m
            0x8D => self.op_lea(bus, w),
            // mov al/eax, moffs and back
            0xA0 | 0xA2 => self.op_mov_moffs(bus, opcode, Width::Byte),
            0xA1 | 0xA3 => self.op_mov_moffs(bus, opcode, w),
            // mov r8, imm8
            0xB0..=0xB7 => self.op_mov_i2r(bus, opcode, Width::Byte),
            // mov r, imm
            0xB8..=0xBF => self.op_mov_i2r(bus, opcode, w),
            // mov r/m8, imm8
            0xC6 => self.op_mov_i2rm(bus, Width::Byte),
            // mov r/m, imm
            0xC7 => self.op_mov_i2rm(bus, w),

            // ==========================================================
            // Sign extension helpers
            // ==========================================================

            // cbw / cwde
            0x98 => self.op_cbw(w),
            // cwd / cdq
            0x99 => self.op_cwd(w),

            // ==========================================================
            // String operations
            // ==========================================================

            0xA4 => self.op_string(bus, StringOp::Movs, Width::Byte),
            0xA5 => self.op_string(bus, StringOp::Movs, w),
            0xA6 => self.op_string(bus, StringOp::Cmps, Width::Byte),
            0xA7 => self.op_string(bus, StringOp::Cmps, w),
            0xAA => self.op_string(bus, StringOp::Stos, Width::Byte),
            0xAB => self.op_string(bus, StringOp::Stos, w),
            0xAC => self.op_string(bus, StringOp::Lods, Width::Byte),
            0xAD => self.op_string(bus, StringOp::Lods, w),
            0xAE => self.op_string(bus, StringOp::Scas, Width::Byte),
            0xAF => self.op_string(bus, StringOp::Scas, w),

            // ==========================================================
            // Shifts
            // ==========================================================

            // shift r/m8, imm8
            0xC0 => self.op_shift_group(bus, Width::Byte, ShiftCount::Imm8),
            // shift r/m, imm8
            0xC1 => self.op_shift_group(bus, w, ShiftCount::Imm8),
            // shift r/m8, 1
            0xD0 => self.op_shift_group(bus, Width::Byte, ShiftCount::One),
            // shift r/m, 1
            0xD1 => self.op_shift_group(bus, w, ShiftCount::One),
            // shift r/m8, cl
            0xD2 => self.op_shift_group(bus, Width::Byte, ShiftCount::Cl),
            // shift r/m, cl
            0xD3 => self.op_shift_group(bus, w, ShiftCount::Cl),

            // ==========================================================
            // Control transfer
            // ==========================================================

            // ret imm16
            0xC2 => self.op_ret(bus, true),
            // ret
            0xC3 => self.op_ret(bus, false),
            // call rel
            0xE8 => self.op_call_rel(bus, w),
            // jmp rel
            0xE9 => self.op_jmp_rel(bus, w),
            // jmp rel8
            0xEB => self.op_jmp_rel(bus, Width::Byte),

            // ==========================================================
            // Misc
            // ==========================================================

            // nop
            0x90 => {
                self.trace_asm(format_args!("nop"));
                1
            }
            // hlt
            0xF4 => {
                self.halt();
                self.trace_asm(format_args!("hlt"));
                1
            }

            // grp3: test/not/neg/mul/imul/div/idiv
            0xF6 => self.op_group3(bus, Width::Byte),
            0xF7 => self.op_group3(bus, w),

            // grp4: inc/dec r/m8
            0xFE => {
                let ext = self.peek_modrm_ext(bus);
                match ext {
                    0 => self.op_inc_dec_rm(bus, Width::Byte, false),
                    1 => self.op_inc_dec_rm(bus, Width::Byte, true),
                    _ => panic!(
                        "unimplemented group-4 form /{ext} at {:#010x}",
                        self.instr_start
                    ),
                }
            }
            // grp5: inc/dec/call/jmp/push r/m
            0xFF => {
                let ext = self.peek_modrm_ext(bus);
                match ext {
                    0 => self.op_inc_dec_rm(bus, w, false),
                    1 => self.op_inc_dec_rm(bus, w, true),
                    2 => self.op_call_rm(bus, w),
                    4 => self.op_jmp_rm(bus, w),
                    6 => self.op_push_rm(bus, w),
                    _ => panic!(
                        "unimplemented group-5 form /{ext} at {:#010x}",
                        self.instr_start
                    ),
                }
            }

            _ => panic!(
                "unknown opcode {opcode:#04x} at {:#010x}",
                self.instr_start
            ),
        }
    }

    /// Execute a 0F-prefixed opcode. The escape byte has already been
    /// consumed, so handlers decode exactly like one-byte opcodes.
    pub(crate) fn execute_0f<B: Bus>(&mut self, bus: &mut B, opcode: u8, w: Width) -> u32 {
        match opcode {
            // cmovcc r, r/m
            0x40..=0x4F => self.op_cmovcc(bus, opcode, w),
            // jcc rel16/32
            0x80..=0x8F => self.op_jcc_near(bus, opcode, w),
            // setcc r/m8
            0x90..=0x9F => self.op_setcc(bus, opcode),
            // imul r, r/m
            0xAF => self.op_imul_rm2r(bus, w),
            // movzx r, r/m8
            0xB6 => self.op_movzx(bus, Width::Byte, w),
            // movzx r, r/m16
            0xB7 => self.op_movzx(bus, Width::Word, w),
            // movsx r, r/m8
            0xBE => self.op_movsx(bus, Width::Byte, w),
            // movsx r, r/m16
            0xBF => self.op_movsx(bus, Width::Word, w),

            _ => panic!(
                "unknown opcode 0f {opcode:#04x} at {:#010x}",
                self.instr_start
            ),
        }
    }

    /// Peek at the ModR/M `reg` field without consuming anything, for the
    /// group opcodes whose operation it selects.
    fn peek_modrm_ext<B: Bus>(&self, bus: &mut B) -> u8 {
        (bus.read(self.regs.eip.wrapping_add(1), 1) as u8 >> 3) & 7
    }
}
