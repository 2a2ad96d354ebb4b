//! NCS instruction set: opcodes, operands and their wire encoding.
//!
//! Every instruction starts with an opcode byte and a type byte. The
//! operand that follows (if any) is big-endian. Jump, call and global
//! operands are symbolic while code is generated and only become byte
//! offsets when the serializer lays out the final code section.

use crate::types::{Type, TypePair};

/// Index of a function in the symbol table of its compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

/// Jump target local to one function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    CpDownSp,
    RsAdd(Type),
    CpTopSp,
    Const(Type),
    LogAnd,
    LogOr,
    Equal(TypePair),
    NotEqual(TypePair),
    Geq(TypePair),
    Gt(TypePair),
    Lt(TypePair),
    Leq(TypePair),
    Add(TypePair),
    Sub(TypePair),
    Mul(TypePair),
    Div(TypePair),
    Mod,
    Neg(Type),
    MovSp,
    Jmp,
    Jsr,
    Jz,
    Retn,
    Not,
    CpDownBp,
    CpTopBp,
    SaveBp,
    RestoreBp,
}

impl Op {
    pub fn opcode(self) -> u8 {
        match self {
            Op::CpDownSp => 0x01,
            Op::RsAdd(_) => 0x02,
            Op::CpTopSp => 0x03,
            Op::Const(_) => 0x04,
            Op::LogAnd => 0x06,
            Op::LogOr => 0x07,
            Op::Equal(_) => 0x0B,
            Op::NotEqual(_) => 0x0C,
            Op::Geq(_) => 0x0D,
            Op::Gt(_) => 0x0E,
            Op::Lt(_) => 0x0F,
            Op::Leq(_) => 0x10,
            Op::Add(_) => 0x14,
            Op::Sub(_) => 0x15,
            Op::Mul(_) => 0x16,
            Op::Div(_) => 0x17,
            Op::Mod => 0x18,
            Op::Neg(_) => 0x19,
            Op::MovSp => 0x1B,
            Op::Jmp => 0x1D,
            Op::Jsr => 0x1E,
            Op::Jz => 0x1F,
            Op::Retn => 0x20,
            Op::Not => 0x22,
            Op::CpDownBp => 0x26,
            Op::CpTopBp => 0x27,
            Op::SaveBp => 0x2A,
            Op::RestoreBp => 0x2B,
        }
    }

    pub fn type_byte(self) -> u8 {
        match self {
            Op::CpDownSp | Op::CpTopSp | Op::CpDownBp | Op::CpTopBp => 0x01,
            Op::RsAdd(ty) | Op::Const(ty) | Op::Neg(ty) => ty.unary_code().unwrap_or(0),
            Op::Equal(pair)
            | Op::NotEqual(pair)
            | Op::Geq(pair)
            | Op::Gt(pair)
            | Op::Lt(pair)
            | Op::Leq(pair)
            | Op::Add(pair)
            | Op::Sub(pair)
            | Op::Mul(pair)
            | Op::Div(pair) => pair.code(),
            Op::LogAnd | Op::LogOr | Op::Mod => TypePair::IntInt.code(),
            Op::Not => 0x03,
            Op::MovSp | Op::Jmp | Op::Jsr | Op::Jz | Op::Retn | Op::SaveBp | Op::RestoreBp => 0x00,
        }
    }

    /// Inverse of [`Op::opcode`] / [`Op::type_byte`].
    pub fn decode(opcode: u8, type_byte: u8) -> Option<Op> {
        let unary = || match type_byte {
            0x03 => Some(Type::Int),
            0x04 => Some(Type::Float),
            0x05 => Some(Type::String),
            0x06 => Some(Type::Object),
            _ => None,
        };
        let pair = || TypePair::from_code(type_byte);
        let op = match opcode {
            0x01 => Op::CpDownSp,
            0x02 => Op::RsAdd(unary()?),
            0x03 => Op::CpTopSp,
            0x04 => Op::Const(unary()?),
            0x06 => Op::LogAnd,
            0x07 => Op::LogOr,
            0x0B => Op::Equal(pair()?),
            0x0C => Op::NotEqual(pair()?),
            0x0D => Op::Geq(pair()?),
            0x0E => Op::Gt(pair()?),
            0x0F => Op::Lt(pair()?),
            0x10 => Op::Leq(pair()?),
            0x14 => Op::Add(pair()?),
            0x15 => Op::Sub(pair()?),
            0x16 => Op::Mul(pair()?),
            0x17 => Op::Div(pair()?),
            0x18 => Op::Mod,
            0x19 => Op::Neg(unary()?),
            0x1B => Op::MovSp,
            0x1D => Op::Jmp,
            0x1E => Op::Jsr,
            0x1F => Op::Jz,
            0x20 => Op::Retn,
            0x22 => Op::Not,
            0x26 => Op::CpDownBp,
            0x27 => Op::CpTopBp,
            0x2A => Op::SaveBp,
            0x2B => Op::RestoreBp,
            _ => return None,
        };
        Some(op)
    }

    /// Listing name, e.g. `CONSTI`, `ADDIF`, `JSR`.
    pub fn mnemonic(self) -> String {
        let (base, suffix) = match self {
            Op::CpDownSp => ("CPDOWNSP", ""),
            Op::RsAdd(ty) => ("RSADD", unary_suffix(ty)),
            Op::CpTopSp => ("CPTOPSP", ""),
            Op::Const(ty) => ("CONST", unary_suffix(ty)),
            Op::LogAnd => ("LOGAND", "II"),
            Op::LogOr => ("LOGOR", "II"),
            Op::Equal(pair) => ("EQUAL", pair_suffix(pair)),
            Op::NotEqual(pair) => ("NEQUAL", pair_suffix(pair)),
            Op::Geq(pair) => ("GEQ", pair_suffix(pair)),
            Op::Gt(pair) => ("GT", pair_suffix(pair)),
            Op::Lt(pair) => ("LT", pair_suffix(pair)),
            Op::Leq(pair) => ("LEQ", pair_suffix(pair)),
            Op::Add(pair) => ("ADD", pair_suffix(pair)),
            Op::Sub(pair) => ("SUB", pair_suffix(pair)),
            Op::Mul(pair) => ("MUL", pair_suffix(pair)),
            Op::Div(pair) => ("DIV", pair_suffix(pair)),
            Op::Mod => ("MOD", "II"),
            Op::Neg(ty) => ("NEG", unary_suffix(ty)),
            Op::MovSp => ("MOVSP", ""),
            Op::Jmp => ("JMP", ""),
            Op::Jsr => ("JSR", ""),
            Op::Jz => ("JZ", ""),
            Op::Retn => ("RETN", ""),
            Op::Not => ("NOT", "I"),
            Op::CpDownBp => ("CPDOWNBP", ""),
            Op::CpTopBp => ("CPTOPBP", ""),
            Op::SaveBp => ("SAVEBP", ""),
            Op::RestoreBp => ("RESTOREBP", ""),
        };
        format!("{base}{suffix}")
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jmp | Op::Jsr | Op::Jz)
    }
}

fn unary_suffix(ty: Type) -> &'static str {
    match ty {
        Type::Int => "I",
        Type::Float => "F",
        Type::String => "S",
        Type::Object => "O",
        Type::Void => "",
    }
}

fn pair_suffix(pair: TypePair) -> &'static str {
    match pair {
        TypePair::IntInt => "II",
        TypePair::FloatFloat => "FF",
        TypePair::ObjectObject => "OO",
        TypePair::StringString => "SS",
        TypePair::IntFloat => "IF",
        TypePair::FloatInt => "FI",
    }
}

/// Operand of an instruction record.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    Int(i32),
    Float(f32),
    Str(String),
    Object(i32),
    /// Stack-relative copy: byte offset from the top and byte count.
    Stack { offset: i32, size: u16 },
    /// Stack pointer adjustment in bytes.
    Offset(i32),
    Jump(Label),
    Call(FunctionId),
    /// Global variable slot, resolved against BP at layout time.
    Global(u32),
}

/// One fixed-size instruction record: the two variable fields of an
/// emitted instruction. Encoding details are derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub arg: Arg,
}

impl Instruction {
    pub fn new(op: Op, arg: Arg) -> Self {
        Instruction { op, arg }
    }

    pub fn simple(op: Op) -> Self {
        Instruction { op, arg: Arg::None }
    }

    pub fn rsadd(ty: Type) -> Self {
        Instruction::simple(Op::RsAdd(ty))
    }

    pub fn const_int(value: i32) -> Self {
        Instruction::new(Op::Const(Type::Int), Arg::Int(value))
    }

    pub fn const_float(value: f32) -> Self {
        Instruction::new(Op::Const(Type::Float), Arg::Float(value))
    }

    pub fn const_string(value: impl Into<String>) -> Self {
        Instruction::new(Op::Const(Type::String), Arg::Str(value.into()))
    }

    pub fn const_object(value: i32) -> Self {
        Instruction::new(Op::Const(Type::Object), Arg::Object(value))
    }

    pub fn cpdownsp(offset: i32, size: u16) -> Self {
        Instruction::new(Op::CpDownSp, Arg::Stack { offset, size })
    }

    pub fn cptopsp(offset: i32, size: u16) -> Self {
        Instruction::new(Op::CpTopSp, Arg::Stack { offset, size })
    }

    pub fn movsp(delta: i32) -> Self {
        Instruction::new(Op::MovSp, Arg::Offset(delta))
    }

    pub fn jmp(label: Label) -> Self {
        Instruction::new(Op::Jmp, Arg::Jump(label))
    }

    pub fn jz(label: Label) -> Self {
        Instruction::new(Op::Jz, Arg::Jump(label))
    }

    pub fn jsr(function: FunctionId) -> Self {
        Instruction::new(Op::Jsr, Arg::Call(function))
    }

    pub fn retn() -> Self {
        Instruction::simple(Op::Retn)
    }

    pub fn read_global(slot: u32) -> Self {
        Instruction::new(Op::CpTopBp, Arg::Global(slot))
    }

    pub fn write_global(slot: u32) -> Self {
        Instruction::new(Op::CpDownBp, Arg::Global(slot))
    }

    /// Encoded size in bytes, including the opcode and type byte.
    pub fn encoded_len(&self) -> usize {
        let operand = match &self.arg {
            Arg::Str(text) => 2 + string_len(text),
            Arg::Stack { .. } | Arg::Global(_) => 6,
            Arg::Int(_) | Arg::Float(_) | Arg::Object(_) => 4,
            Arg::Offset(_) | Arg::Jump(_) | Arg::Call(_) => 4,
            Arg::None => 0,
        };
        2 + operand
    }

    /// Appends the wire form to `out`. `resolved` supplies the byte
    /// value of symbolic operands (jump/call offsets, BP offsets of
    /// globals) and is ignored for everything else.
    pub fn encode(&self, resolved: i32, out: &mut Vec<u8>) {
        out.push(self.op.opcode());
        out.push(self.op.type_byte());
        match &self.arg {
            Arg::None => {}
            Arg::Int(value) | Arg::Object(value) | Arg::Offset(value) => {
                out.extend_from_slice(&value.to_be_bytes());
            }
            Arg::Float(value) => out.extend_from_slice(&value.to_bits().to_be_bytes()),
            Arg::Str(text) => {
                let len = string_len(text);
                out.extend_from_slice(&(len as u16).to_be_bytes());
                out.extend_from_slice(&text.as_bytes()[..len]);
            }
            Arg::Stack { offset, size } => {
                out.extend_from_slice(&offset.to_be_bytes());
                out.extend_from_slice(&size.to_be_bytes());
            }
            Arg::Global(_) => {
                out.extend_from_slice(&resolved.to_be_bytes());
                out.extend_from_slice(&4u16.to_be_bytes());
            }
            Arg::Jump(_) | Arg::Call(_) => out.extend_from_slice(&resolved.to_be_bytes()),
        }
    }
}

/// String constants carry a 16-bit length prefix.
fn string_len(text: &str) -> usize {
    text.len().min(u16::MAX as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(ins: &Instruction, resolved: i32) -> Vec<u8> {
        let mut out = Vec::new();
        ins.encode(resolved, &mut out);
        assert_eq!(out.len(), ins.encoded_len());
        out
    }

    #[test]
    fn encodes_const_int_big_endian() {
        assert_eq!(
            encoded(&Instruction::const_int(0x0102_0304), 0),
            vec![0x04, 0x03, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn encodes_string_with_length_prefix() {
        assert_eq!(
            encoded(&Instruction::const_string("hi"), 0),
            vec![0x04, 0x05, 0x00, 0x02, b'h', b'i']
        );
    }

    #[test]
    fn encodes_stack_copy() {
        assert_eq!(
            encoded(&Instruction::cpdownsp(-8, 4), 0),
            vec![0x01, 0x01, 0xFF, 0xFF, 0xFF, 0xF8, 0x00, 0x04]
        );
    }

    #[test]
    fn jumps_take_the_resolved_offset() {
        assert_eq!(
            encoded(&Instruction::jmp(Label(3)), -12),
            vec![0x1D, 0x00, 0xFF, 0xFF, 0xFF, 0xF4]
        );
        assert_eq!(
            encoded(&Instruction::read_global(0), -8),
            vec![0x27, 0x01, 0xFF, 0xFF, 0xFF, 0xF8, 0x00, 0x04]
        );
    }

    #[test]
    fn decode_inverts_opcode_and_type() {
        let ops = [
            Op::RsAdd(Type::Object),
            Op::Add(TypePair::FloatInt),
            Op::NotEqual(TypePair::StringString),
            Op::Neg(Type::Float),
            Op::RestoreBp,
            Op::Mod,
        ];
        for op in ops {
            assert_eq!(Op::decode(op.opcode(), op.type_byte()), Some(op));
        }
        assert_eq!(Op::decode(0x02, 0x99), None);
        assert_eq!(Op::decode(0x05, 0x00), None);
    }

    #[test]
    fn mnemonics_carry_type_suffixes() {
        assert_eq!(Op::Const(Type::String).mnemonic(), "CONSTS");
        assert_eq!(Op::Add(TypePair::IntFloat).mnemonic(), "ADDIF");
        assert_eq!(Op::LogAnd.mnemonic(), "LOGANDII");
        assert_eq!(Op::Retn.mnemonic(), "RETN");
    }
}
