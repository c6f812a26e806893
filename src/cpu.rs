//! C7: the CPU — register file, memory map, and the fetch-decode-execute
//! loop (§4.7): pop opcode, match, loop until a terminal opcode returns,
//! dispatching against the parametric, opcode-parity-endian table built in
//! [`crate::isa`].

use log::trace;

use crate::config::VmConfig;
use crate::decode::decode;
use crate::error::{MemoryErr, VmFault, VmResult};
use crate::io::IoChannel;
use crate::isa::{Action, ArithOp, Cond, InstrTable, ShiftDir};
use crate::memmap::{MemoryMap, SpaceName};
use crate::numerical::{mask, to_signed, to_unsigned};
use crate::registers::{Flags, RegId, RegisterFile, Width};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Halted,
}

pub struct Machine {
    regs: RegisterFile,
    map: Option<MemoryMap>,
    table: InstrTable,
    config: VmConfig,
}

impl Machine {
    pub fn new(config: VmConfig) -> Self {
        Machine {
            regs: RegisterFile::new(config.char_bit, config.word_bits(), config.addr_bits()),
            map: None,
            table: crate::isa::build_table(),
            config,
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn map(&self) -> &MemoryMap {
        self.map.as_ref().expect("program image not loaded")
    }

    /// Load a program image into program space (§3 "program image"),
    /// (re)building the memory map now that the program's true size is
    /// known, then point `IP` at offset 0 (the entry point).
    pub fn load(&mut self, image: &[u64]) {
        let program_size = image.len().max(self.config.program_size);
        let mut map = MemoryMap::build(
            self.config.ram_size,
            program_size,
            self.config.stack_size,
            self.config.char_bit,
            &self.config.aliases,
        );
        {
            let mut program = map.space(SpaceName::Program);
            program.store_bytes(0, image).expect("image fits freshly sized program space");
        }
        // Only lock the array when nothing else aliases it for writing
        // (§4.3): a `ram`/`stack` alias must stay able to self-modify the
        // program image, and nothing ever stores through the `program`
        // name itself.
        if !map.program_aliased_with_writable() {
            map.space(SpaceName::Program).set_read_only(true);
        }
        map.lock_program();
        self.map = Some(map);
        self.regs.set_ip(0);
        self.regs.set_sp(0);
    }

    /// Run until `halt` or a fault (§4.7).
    pub fn run(&mut self, io: &mut dyn IoChannel) -> VmResult<StopReason> {
        loop {
            if let Some(reason) = self.step(io)? {
                return Ok(reason);
            }
        }
    }

    /// Execute exactly one fetch-decode-execute cycle. Returns `Ok(Some(_))`
    /// when the CPU has halted, `Ok(None)` to continue, `Err` on fault.
    pub fn step(&mut self, io: &mut dyn IoChannel) -> VmResult<Option<StopReason>> {
        let ip = self.regs.ip();
        if ip as usize >= self.map().space_len(SpaceName::Program) {
            return Err(VmFault::Memory {
                ip,
                source: MemoryErr::OutOfBounds {
                    addr: ip,
                    size: self.map().space_len(SpaceName::Program) as u64,
                },
            });
        }
        let decoded = decode(
            self.map.as_ref().unwrap(),
            &self.table,
            ip,
            self.config.word_size,
            self.config.addr_size,
            self.config.char_bit,
        )?;
        trace!("ip={ip} opcode={} text={}", decoded.instr.opcode, decoded.instr.text);

        let action = decoded.instr.action;
        let operands = decoded.operands.clone();
        let next_ip = decoded.next_ip;
        self.regs.set_ip(next_ip);

        self.execute(action, &operands, ip, next_ip, io)
    }

    fn reg_operand(&self, raw: u128) -> RegId {
        RegId::from_code(raw as u8).unwrap_or(RegId::A)
    }

    fn width_of(&self, w: Width) -> u32 {
        match w {
            Width::Byte => self.config.char_bit,
            Width::Word => self.config.word_bits(),
            Width::Addr => self.config.addr_bits(),
        }
    }

    fn execute(
        &mut self,
        action: Action,
        ops: &[u128],
        ip: u64,
        next_ip: u64,
        io: &mut dyn IoChannel,
    ) -> VmResult<Option<StopReason>> {
        let ip_for_fault = ip;
        match action {
            Action::MovI2R(w) => {
                let dst = self.reg_operand(ops[0]);
                self.regs.write(dst, w, ops[1]);
            }
            Action::MovR2R(w) => {
                let dst = self.reg_operand(ops[0]);
                let src = self.reg_operand(ops[1]);
                let v = self.regs.read(src, w);
                self.regs.write(dst, w, v);
            }
            Action::MovM2R(w) => {
                let dst = self.reg_operand(ops[0]);
                let addr = ops[1] as u64;
                let v = self.load_ram_width(addr, w, ip_for_fault)?;
                self.regs.write(dst, w, v);
            }
            Action::MovR2M(w) => {
                let addr = ops[0] as u64;
                let src = self.reg_operand(ops[1]);
                let v = self.regs.read(src, w);
                self.store_ram_width(addr, w, v, ip_for_fault)?;
            }
            Action::Load(w) => {
                let dst = self.reg_operand(ops[0]);
                let addr_reg = self.reg_operand(ops[1]);
                let addr = self.regs.read(addr_reg, Width::Addr) as u64;
                let v = self.load_ram_width(addr, w, ip_for_fault)?;
                self.regs.write(dst, w, v);
            }
            Action::Store(w) => {
                let addr_reg = self.reg_operand(ops[0]);
                let src = self.reg_operand(ops[1]);
                let addr = self.regs.read(addr_reg, Width::Addr) as u64;
                let v = self.regs.read(src, w);
                self.store_ram_width(addr, w, v, ip_for_fault)?;
            }
            Action::LoadProgram => {
                let dst = self.reg_operand(ops[0]);
                let addr_reg = self.reg_operand(ops[1]);
                let addr = self.regs.read(addr_reg, Width::Addr) as u64;
                let v = self
                    .map()
                    .space(SpaceName::Program)
                    .load_cell(addr)
                    .map_err(|e| VmFault::Memory { ip: ip_for_fault, source: e })?;
                self.regs.write(dst, Width::Byte, v as u128);
            }
            Action::ArithR2R(op, w) => {
                let dst = self.reg_operand(ops[0]);
                let src = self.reg_operand(ops[1]);
                let a = self.regs.read(dst, w);
                let b = self.regs.read(src, w);
                self.arith(dst, op, w, a, b, ip_for_fault)?;
            }
            Action::ArithI2R(op, w) => {
                let dst = self.reg_operand(ops[0]);
                let a = self.regs.read(dst, w);
                let b = ops[1];
                self.arith(dst, op, w, a, b, ip_for_fault)?;
            }
            Action::Not(w) => {
                let dst = self.reg_operand(ops[0]);
                let bits = self.width_of(w);
                let v = mask(!self.regs.read(dst, w), bits);
                self.set_logic_flags(v, bits);
                self.regs.write(dst, w, v);
            }
            Action::Neg(w) => {
                let dst = self.reg_operand(ops[0]);
                let bits = self.width_of(w);
                let a = to_signed(self.regs.read(dst, w), bits);
                let (result, carry, overflow) = negate(a, bits);
                let v = to_unsigned(result, bits);
                self.set_arith_flags(v, bits, carry, overflow);
                self.regs.write(dst, w, v);
            }
            Action::ShiftR2R(dir, w) => {
                let dst = self.reg_operand(ops[0]);
                let src = self.reg_operand(ops[1]);
                let amount = self.regs.read(src, w);
                self.shift(dst, dir, w, amount);
            }
            Action::ShiftI2R(dir, w) => {
                let dst = self.reg_operand(ops[0]);
                self.shift(dst, dir, w, ops[1]);
            }
            Action::CmpR2R(w) => {
                let dst = self.reg_operand(ops[0]);
                let src = self.reg_operand(ops[1]);
                let a = self.regs.read(dst, w);
                let b = self.regs.read(src, w);
                self.compare(w, a, b);
            }
            Action::CmpI2R(w) => {
                let dst = self.reg_operand(ops[0]);
                let a = self.regs.read(dst, w);
                self.compare(w, a, ops[1]);
            }
            Action::Jump(cond, relative) => {
                if self.flag_satisfies(cond) {
                    self.jump_to(ops[0], relative, next_ip);
                }
            }
            Action::Call(relative) => {
                let target = self.resolve_target(ops[0], relative, next_ip);
                self.push_word(next_ip as u128, ip_for_fault)?;
                self.regs.set_ip(target);
            }
            Action::Ret => {
                let ret = self.pop_word(ip_for_fault)?;
                self.regs.set_ip(ret as u64);
            }
            Action::Loop(relative) => {
                let bits = self.config.word_bits();
                let c = mask(self.regs.read(RegId::C, Width::Word).wrapping_sub(1), bits);
                self.regs.write(RegId::C, Width::Word, c);
                if c != 0 {
                    self.jump_to(ops[0], relative, next_ip);
                }
            }
            Action::Push => {
                let src = self.reg_operand(ops[0]);
                let v = self.regs.read(src, Width::Word);
                self.push_word(v, ip_for_fault)?;
            }
            Action::Pop => {
                let dst = self.reg_operand(ops[0]);
                let v = self.pop_word(ip_for_fault)?;
                self.regs.write(dst, Width::Word, v);
            }
            Action::In => {
                let bits = self.config.char_bit;
                match io.read_byte().unwrap_or(None) {
                    Some(b) => {
                        self.regs.write(RegId::A, Width::Byte, b as u128);
                    }
                    None => {
                        self.regs.write(RegId::A, Width::Byte, mask(u128::MAX, bits));
                        let mut f = self.regs.flags();
                        f.insert(Flags::CARRY);
                        self.regs.set_flags(f);
                    }
                }
            }
            Action::Out => {
                let bits = self.config.char_bit;
                let byte = mask(self.regs.read(RegId::A, Width::Byte), bits.min(8)) as u8;
                let _ = io.write_byte(byte);
            }
            Action::SeekReg => {
                let col_reg = self.reg_operand(ops[0]);
                let row_reg = self.reg_operand(ops[1]);
                let col = self.regs.read(col_reg, Width::Word) as u64;
                let row = self.regs.read(row_reg, Width::Word) as u64;
                io.seek(col, row);
            }
            Action::SeekImm => {
                io.seek(ops[0] as u64, ops[1] as u64);
            }
            Action::Halt => {
                let _ = io.flush();
                return Ok(Some(StopReason::Halted));
            }
        }
        Ok(None)
    }

    fn resolve_target(&self, raw: u128, relative: bool, next_ip: u64) -> u64 {
        if relative {
            let bits = self.config.addr_bits();
            let offset = to_signed(raw, bits);
            (next_ip as i128 + offset) as u64
        } else {
            raw as u64
        }
    }

    fn jump_to(&mut self, raw: u128, relative: bool, next_ip: u64) {
        let target = self.resolve_target(raw, relative, next_ip);
        self.regs.set_ip(target);
    }

    fn flag_satisfies(&self, cond: Cond) -> bool {
        let f = self.regs.flags();
        match cond {
            Cond::Always => true,
            Cond::Eq => f.contains(Flags::ZERO),
            Cond::Ne => !f.contains(Flags::ZERO),
            Cond::Below => f.contains(Flags::CARRY),
            Cond::BelowEq => f.contains(Flags::CARRY) || f.contains(Flags::ZERO),
            Cond::Above => !f.contains(Flags::CARRY) && !f.contains(Flags::ZERO),
            Cond::AboveEq => !f.contains(Flags::CARRY),
            Cond::Less => f.contains(Flags::SIGN) != f.contains(Flags::OVERFLOW),
            Cond::LessEq => {
                f.contains(Flags::ZERO) || (f.contains(Flags::SIGN) != f.contains(Flags::OVERFLOW))
            }
            Cond::Greater => {
                !f.contains(Flags::ZERO) && (f.contains(Flags::SIGN) == f.contains(Flags::OVERFLOW))
            }
            Cond::GreaterEq => f.contains(Flags::SIGN) == f.contains(Flags::OVERFLOW),
        }
    }

    fn load_ram_width(&self, addr: u64, w: Width, ip: u64) -> VmResult<u128> {
        let ram = self.map().space(SpaceName::Ram);
        let v = match w {
            Width::Byte => ram.load_cell(addr).map(|c| c as u128),
            Width::Word => ram.load_word(addr, self.config.word_size),
            Width::Addr => ram.load_word(addr, self.config.addr_size),
        };
        v.map_err(|e| VmFault::Memory { ip, source: e })
    }

    fn store_ram_width(&self, addr: u64, w: Width, value: u128, ip: u64) -> VmResult<()> {
        let mut ram = self.map().space(SpaceName::Ram);
        let r = match w {
            Width::Byte => ram.store_cell(addr, value as u64),
            Width::Word => ram.store_word(addr, self.config.word_size, value),
            Width::Addr => ram.store_word(addr, self.config.addr_size, value),
        };
        r.map_err(|e| VmFault::Memory { ip, source: e })
    }

    fn push_word(&mut self, value: u128, ip: u64) -> VmResult<()> {
        let sp = self.regs.sp();
        let stack_len = self.map().space_len(SpaceName::Stack) as u64;
        if sp + self.config.word_size as u64 > stack_len {
            return Err(VmFault::StackOverflow { ip });
        }
        self.map()
            .space(SpaceName::Stack)
            .store_word(sp, self.config.word_size, value)
            .map_err(|e| VmFault::Memory { ip, source: e })?;
        self.regs.set_sp(sp + self.config.word_size as u64);
        Ok(())
    }

    fn pop_word(&mut self, ip: u64) -> VmResult<u128> {
        let sp = self.regs.sp();
        let word_size = self.config.word_size as u64;
        if sp < word_size {
            return Err(VmFault::StackUnderflow { ip });
        }
        let new_sp = sp - word_size;
        let v = self
            .map()
            .space(SpaceName::Stack)
            .load_word(new_sp, self.config.word_size)
            .map_err(|e| VmFault::Memory { ip, source: e })?;
        self.regs.set_sp(new_sp);
        Ok(v)
    }

    fn arith(
        &mut self,
        dst: RegId,
        op: ArithOp,
        w: Width,
        a: u128,
        b: u128,
        ip: u64,
    ) -> VmResult<()> {
        let bits = self.width_of(w);
        let (result, carry, overflow) = match op {
            ArithOp::Add => add(a, b, bits),
            ArithOp::Sub => sub(a, b, bits),
            ArithOp::Mul => mul(a, b, bits),
            ArithOp::Div => {
                if b == 0 {
                    return Err(VmFault::DivByZero { ip });
                }
                div(a, b, bits)
            }
            ArithOp::Mod => {
                if b == 0 {
                    return Err(VmFault::DivByZero { ip });
                }
                rem(a, b, bits)
            }
            ArithOp::And => (mask(a & b, bits), false, false),
            ArithOp::Or => (mask(a | b, bits), false, false),
            ArithOp::Xor => (mask(a ^ b, bits), false, false),
        };
        self.set_arith_flags(result, bits, carry, overflow);
        self.regs.write(dst, w, result);
        Ok(())
    }

    fn shift(&mut self, dst: RegId, dir: ShiftDir, w: Width, amount: u128) {
        let bits = self.width_of(w);
        let v = mask(self.regs.read(dst, w), bits);
        // A shift by >= the operand width carries nothing meaningful out;
        // treat it like shifting by the full width (result all-zero).
        let amt = (amount as u32).min(bits);
        let (result, carry) = match dir {
            ShiftDir::Left => {
                let r = mask(v << amt.min(127), bits);
                let carry = amt > 0 && ((v >> (bits - amt)) & 1) == 1;
                (r, carry)
            }
            ShiftDir::Right => {
                let r = mask(v >> amt.min(127), bits);
                let carry = amt > 0 && ((v >> (amt - 1)) & 1) == 1;
                (r, carry)
            }
        };
        self.set_arith_flags(result, bits, carry, false);
        self.regs.write(dst, w, result);
    }

    fn compare(&mut self, w: Width, a: u128, b: u128) {
        let bits = self.width_of(w);
        let (result, carry, overflow) = sub(a, b, bits);
        self.set_arith_flags(result, bits, carry, overflow);
    }

    fn set_logic_flags(&mut self, result: u128, bits: u32) {
        self.set_arith_flags(result, bits, false, false);
    }

    fn set_arith_flags(&mut self, result: u128, bits: u32, carry: bool, overflow: bool) {
        let mut f = Flags::empty();
        if mask(result, bits) == 0 {
            f.insert(Flags::ZERO);
        }
        if bits > 0 && (result >> (bits - 1)) & 1 == 1 {
            f.insert(Flags::SIGN);
        }
        if carry {
            f.insert(Flags::CARRY);
        }
        if overflow {
            f.insert(Flags::OVERFLOW);
        }
        self.regs.set_flags(f);
    }
}

fn add(a: u128, b: u128, bits: u32) -> (u128, bool, bool) {
    let full = a.wrapping_add(b);
    let result = mask(full, bits);
    let carry = full != result;
    let sa = to_signed(a, bits);
    let sb = to_signed(b, bits);
    let signed_result = sa.wrapping_add(sb);
    let overflow = to_signed(result, bits) != signed_result;
    (result, carry, overflow)
}

fn sub(a: u128, b: u128, bits: u32) -> (u128, bool, bool) {
    let carry = a < b;
    let borrow = if bits >= 127 { u128::MAX } else { 1u128 << bits };
    let full = if carry { a.wrapping_add(borrow) } else { a }.wrapping_sub(b);
    let result = mask(full, bits);
    let sa = to_signed(a, bits);
    let sb = to_signed(b, bits);
    let overflow = to_signed(result, bits) != sa.wrapping_sub(sb);
    (result, carry, overflow)
}

fn mul(a: u128, b: u128, bits: u32) -> (u128, bool, bool) {
    let full = a.wrapping_mul(b);
    let result = mask(full, bits);
    let carry = mask(full, 127) != result || (full >> bits.min(127)) != 0;
    let sa = to_signed(a, bits);
    let sb = to_signed(b, bits);
    let overflow = to_signed(result, bits) != sa.wrapping_mul(sb);
    (result, carry, overflow)
}

/// Truncating division, sign of the dividend (§9 open question (a)).
fn div(a: u128, b: u128, bits: u32) -> (u128, bool, bool) {
    let sa = to_signed(a, bits);
    let sb = to_signed(b, bits);
    let q = sa.wrapping_div(sb);
    (to_unsigned(q, bits), false, false)
}

fn rem(a: u128, b: u128, bits: u32) -> (u128, bool, bool) {
    let sa = to_signed(a, bits);
    let sb = to_signed(b, bits);
    let r = sa.wrapping_rem(sb);
    (to_unsigned(r, bits), false, false)
}

fn negate(a: i128, bits: u32) -> (i128, bool, bool) {
    let result = a.wrapping_neg();
    let overflow = bits > 0 && a == -(1i128 << (bits - 1));
    let carry = a != 0;
    (result, carry, overflow)
}
