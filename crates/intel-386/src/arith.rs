//! Arithmetic instruction execution: the ADD/OR/ADC/SBB/AND/SUB/XOR/CMP
//! group, INC/DEC, and the F6/F7 unary group (TEST/NOT/NEG/MUL/IMUL/
//! DIV/IDIV).

use emu_core::Bus;

use crate::alu;
use crate::cpu::Cpu386;
use crate::flags::{CF, OF};
use crate::operand::{Operand, Width};
use crate::registers::{EAX, EDX};

/// The eight two-operand ALU operations, in ModR/M `reg`-field order
/// (the order of the 80/81/83 immediate group).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    pub(crate) fn from_ext(ext: u8) -> Self {
        match ext {
            0 => AluOp::Add,
            1 => AluOp::Or,
            2 => AluOp::Adc,
            3 => AluOp::Sbb,
            4 => AluOp::And,
            5 => AluOp::Sub,
            6 => AluOp::Xor,
            7 => AluOp::Cmp,
            _ => unreachable!(),
        }
    }

    pub(crate) const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Or => "or",
            AluOp::Adc => "adc",
            AluOp::Sbb => "sbb",
            AluOp::And => "and",
            AluOp::Sub => "sub",
            AluOp::Xor => "xor",
            AluOp::Cmp => "cmp",
        }
    }

    /// CMP computes but never writes back.
    const fn writes_back(self) -> bool {
        !matches!(self, AluOp::Cmp)
    }
}

impl Cpu386 {
    /// Apply a two-operand ALU op, returning the masked result.
    fn alu_apply(&mut self, op: AluOp, w: Width, dst: u32, src: u32) -> u32 {
        let fl = &mut self.regs.eflags;
        let carry = u32::from(fl.is_set(CF));
        match op {
            AluOp::Add => alu::add(fl, w, dst, src, 0),
            AluOp::Adc => alu::add(fl, w, dst, src, carry),
            AluOp::Sub | AluOp::Cmp => alu::sub(fl, w, dst, src, 0),
            AluOp::Sbb => alu::sub(fl, w, dst, src, carry),
            AluOp::And => alu::logic(fl, w, dst & src),
            AluOp::Or => alu::logic(fl, w, dst | src),
            AluOp::Xor => alu::logic(fl, w, dst ^ src),
        }
    }

    /// Shared tail for the two-operand forms.
    fn alu_finish<B: Bus>(
        &mut self,
        bus: &mut B,
        op: AluOp,
        src: &Operand,
        dest: &Operand,
        len: u32,
    ) -> u32 {
        let result = self.alu_apply(op, dest.w, dest.val, src.val);
        if op.writes_back() {
            self.write_operand(bus, dest, result);
        }
        self.trace_asm(format_args!(
            "{}{} {src},{dest}",
            op.mnemonic(),
            dest.w.suffix()
        ));
        len
    }

    /// ALU op, register source into r/m destination (00/01/08/09...).
    pub(crate) fn op_alu_r2rm<B: Bus>(&mut self, bus: &mut B, op: AluOp, w: Width) -> u32 {
        let i = self.dec_r2rm(bus, w, true);
        self.alu_finish(bus, op, &i.src, &i.dest, i.len)
    }

    /// ALU op, r/m source into register destination (02/03/0A/0B...).
    pub(crate) fn op_alu_rm2r<B: Bus>(&mut self, bus: &mut B, op: AluOp, w: Width) -> u32 {
        let i = self.dec_rm2r(bus, w);
        self.alu_finish(bus, op, &i.src, &i.dest, i.len)
    }

    /// ALU op, immediate into the accumulator (04/05/0C/0D...).
    pub(crate) fn op_alu_i2a<B: Bus>(&mut self, bus: &mut B, op: AluOp, w: Width) -> u32 {
        let i = self.dec_i2a(bus, w);
        self.alu_finish(bus, op, &i.src, &i.dest, i.len)
    }

    /// The 80/81/83 immediate group; the ModR/M `reg` field selects the
    /// operation. `imm_w` is the immediate's encoded width (83 carries a
    /// sign-extended byte).
    pub(crate) fn op_alu_group_imm<B: Bus>(&mut self, bus: &mut B, w: Width, imm_w: Width) -> u32 {
        let i = self.dec_i2rm(bus, w, imm_w, true);
        let op = AluOp::from_ext(i.ext);
        self.alu_finish(bus, op, &i.src, &i.dest, i.len)
    }

    /// INC/DEC on a 32/16-bit register encoded in the opcode (40-4F).
    pub(crate) fn op_inc_dec_reg(&mut self, opcode: u8, w: Width) -> u32 {
        let r = opcode & 7;
        let dst = self.read_reg(w, r);
        let result = if opcode < 0x48 {
            alu::inc(&mut self.regs.eflags, w, dst)
        } else {
            alu::dec(&mut self.regs.eflags, w, dst)
        };
        self.write_reg(w, r, result);
        let mn = if opcode < 0x48 { "inc" } else { "dec" };
        self.trace_asm(format_args!(
            "{mn}{} {}",
            w.suffix(),
            Operand::reg(w, r, result)
        ));
        1
    }

    /// The FE/FF INC/DEC forms on r/m.
    pub(crate) fn op_inc_dec_rm<B: Bus>(&mut self, bus: &mut B, w: Width, dec: bool) -> u32 {
        let i = self.dec_rm(bus, w, true);
        let result = if dec {
            alu::dec(&mut self.regs.eflags, w, i.dest.val)
        } else {
            alu::inc(&mut self.regs.eflags, w, i.dest.val)
        };
        self.write_operand(bus, &i.dest, result);
        let mn = if dec { "dec" } else { "inc" };
        self.trace_asm(format_args!("{mn}{} {}", w.suffix(), i.dest));
        i.len
    }

    /// The F6/F7 group: TEST imm, NOT, NEG, MUL, IMUL, DIV, IDIV, selected
    /// by the ModR/M `reg` field.
    pub(crate) fn op_group3<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm(bus, w, true);
        let v = i.dest.val;
        match i.ext {
            // TEST r/m, imm
            0 => {
                let imm = self.fetch(bus, self.regs.eip.wrapping_add(i.len), w);
                alu::logic(&mut self.regs.eflags, w, v & imm);
                self.trace_asm(format_args!("test{} ${imm:#x},{}", w.suffix(), i.dest));
                i.len + w.bytes()
            }
            // NOT: no flags
            2 => {
                self.write_operand(bus, &i.dest, !v & w.mask());
                self.trace_asm(format_args!("not{} {}", w.suffix(), i.dest));
                i.len
            }
            // NEG
            3 => {
                let result = alu::neg(&mut self.regs.eflags, w, v);
                self.write_operand(bus, &i.dest, result);
                self.trace_asm(format_args!("neg{} {}", w.suffix(), i.dest));
                i.len
            }
            // MUL: unsigned widening multiply into (E)DX:(E)AX
            4 => {
                let acc = self.read_reg(w, EAX);
                let wide = u64::from(acc) * u64::from(v);
                self.mul_writeback(w, wide);
                let high = (wide >> w.bits()) as u32 & w.mask();
                let overflow = high != 0;
                self.regs.eflags.assign(CF, overflow);
                self.regs.eflags.assign(OF, overflow);
                self.trace_asm(format_args!("mul{} {}", w.suffix(), i.dest));
                i.len
            }
            // IMUL: signed widening multiply into (E)DX:(E)AX
            5 => {
                let acc = w.sign_extend(self.read_reg(w, EAX)) as i32;
                let wide = (i64::from(acc) * i64::from(w.sign_extend(v) as i32)) as u64;
                self.mul_writeback(w, wide);
                let low = wide as u32 & w.mask();
                let overflow = wide as i64 != i64::from(w.sign_extend(low) as i32);
                self.regs.eflags.assign(CF, overflow);
                self.regs.eflags.assign(OF, overflow);
                self.trace_asm(format_args!("imul{} {}", w.suffix(), i.dest));
                i.len
            }
            // DIV: unsigned divide of (E)DX:(E)AX
            6 => {
                assert!(v != 0, "divide by zero at {:#010x}", self.instr_start);
                let dividend = self.div_dividend(w);
                let quot = dividend / u64::from(v);
                let rem = dividend % u64::from(v);
                assert!(
                    quot <= u64::from(w.mask()),
                    "divide overflow at {:#010x}",
                    self.instr_start
                );
                self.div_writeback(w, quot as u32, rem as u32);
                self.trace_asm(format_args!("div{} {}", w.suffix(), i.dest));
                i.len
            }
            // IDIV: signed divide of (E)DX:(E)AX
            7 => {
                assert!(v != 0, "divide by zero at {:#010x}", self.instr_start);
                let dividend = self.div_dividend(w) as i64;
                let dividend = match w {
                    Width::Byte => i64::from(dividend as i16),
                    Width::Word => i64::from(dividend as i32),
                    Width::Long => dividend,
                };
                let divisor = i64::from(w.sign_extend(v) as i32);
                let quot = dividend / divisor;
                let rem = dividend % divisor;
                let limit = i64::from(w.sign_bit()) - 1;
                assert!(
                    quot <= limit && quot >= -limit - 1,
                    "divide overflow at {:#010x}",
                    self.instr_start
                );
                self.div_writeback(w, quot as u32 & w.mask(), rem as u32 & w.mask());
                self.trace_asm(format_args!("idiv{} {}", w.suffix(), i.dest));
                i.len
            }
            ext => panic!(
                "unimplemented group-3 form /{ext} at {:#010x}",
                self.instr_start
            ),
        }
    }

    /// Store a widening multiply result: byte form into AX, wider forms
    /// into (E)DX:(E)AX.
    fn mul_writeback(&mut self, w: Width, wide: u64) {
        if w == Width::Byte {
            self.regs.set_reg16(EAX, wide as u16);
        } else {
            self.write_reg(w, EAX, wide as u32 & w.mask());
            self.write_reg(w, EDX, (wide >> w.bits()) as u32 & w.mask());
        }
    }

    /// The divide input: AX for the byte form, (E)DX:(E)AX otherwise.
    fn div_dividend(&self, w: Width) -> u64 {
        if w == Width::Byte {
            u64::from(self.regs.reg16(EAX))
        } else {
            (u64::from(self.read_reg(w, EDX)) << w.bits()) | u64::from(self.read_reg(w, EAX))
        }
    }

    /// Store quotient and remainder: AL/AH for the byte form, otherwise
    /// (E)AX / (E)DX.
    fn div_writeback(&mut self, w: Width, quot: u32, rem: u32) {
        if w == Width::Byte {
            self.regs.set_reg8(0, quot as u8); // AL
            self.regs.set_reg8(4, rem as u8); // AH
        } else {
            self.write_reg(w, EAX, quot);
            self.write_reg(w, EDX, rem);
        }
    }

    /// Two-operand IMUL (0F AF): truncating signed multiply into a
    /// register.
    pub(crate) fn op_imul_rm2r<B: Bus>(&mut self, bus: &mut B, w: Width) -> u32 {
        let i = self.dec_rm2r(bus, w);
        let result = self.imul_truncating(w, i.dest.val, i.src.val);
        self.write_reg(w, i.ext, result);
        self.trace_asm(format_args!("imul{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// Three-operand IMUL (69/6B): r/m * imm into a register.
    pub(crate) fn op_imul_imm<B: Bus>(&mut self, bus: &mut B, w: Width, imm_w: Width) -> u32 {
        let i = self.dec_i2rm(bus, w, imm_w, true);
        let result = self.imul_truncating(w, i.dest.val, i.src.val);
        self.write_reg(w, i.ext, result);
        self.trace_asm(format_args!("imul{} {},{}", w.suffix(), i.src, i.dest));
        i.len
    }

    /// Truncating signed multiply; CF/OF report a lost high half.
    fn imul_truncating(&mut self, w: Width, a: u32, b: u32) -> u32 {
        let wide = i64::from(w.sign_extend(a) as i32) * i64::from(w.sign_extend(b) as i32);
        let result = wide as u32 & w.mask();
        let overflow = wide != i64::from(w.sign_extend(result) as i32);
        self.regs.eflags.assign(CF, overflow);
        self.regs.eflags.assign(OF, overflow);
        result
    }

    /// CBW/CWDE (98): sign-extend AL into AX, or AX into EAX.
    pub(crate) fn op_cbw(&mut self, w: Width) -> u32 {
        if w == Width::Word {
            let v = Width::Byte.sign_extend(u32::from(self.regs.reg8(0)));
            self.regs.set_reg16(EAX, v as u16);
            self.trace_asm(format_args!("cbtw"));
        } else {
            let v = Width::Word.sign_extend(u32::from(self.regs.reg16(EAX)));
            self.regs.set_reg32(EAX, v);
            self.trace_asm(format_args!("cwtl"));
        }
        1
    }

    /// CWD/CDQ (99): sign-fill (E)DX from (E)AX.
    pub(crate) fn op_cwd(&mut self, w: Width) -> u32 {
        let sign = self.read_reg(w, EAX) & w.sign_bit() != 0;
        let fill = if sign { w.mask() } else { 0 };
        self.write_reg(w, EDX, fill);
        self.trace_asm(format_args!("{}", if w == Width::Word { "cwtd" } else { "cltd" }));
        1
    }
}
