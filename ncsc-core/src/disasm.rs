//! Decoding of NCS files back into an instruction listing.

use std::fmt::Write as _;

use crate::error::CoreError;
use crate::ncs::{HEADER_SIZE, NCS_MAGIC, SIZE_FIELD_OFFSET};
use crate::opcode::Op;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i32),
    Float(f32),
    Str(String),
    Stack { offset: i32, size: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInstruction {
    /// Byte offset from the start of the file.
    pub offset: usize,
    pub op: Op,
    pub operand: Operand,
}

impl DecodedInstruction {
    /// Integer operand, or the offset of a stack/BP copy.
    pub fn operand_int(&self) -> Option<i32> {
        match self.operand {
            Operand::Int(value) => Some(value),
            Operand::Stack { offset, .. } => Some(offset),
            _ => None,
        }
    }

    /// Absolute target of a jump or call.
    pub fn jump_target(&self) -> Option<usize> {
        if !self.op.is_jump() {
            return None;
        }
        let delta = self.operand_int()?;
        usize::try_from(self.offset as i64 + i64::from(delta)).ok()
    }
}

struct Reader<'b> {
    bytes: &'b [u8],
    position: usize,
}

impl<'b> Reader<'b> {
    fn take(&mut self, len: usize) -> Result<&'b [u8], CoreError> {
        let end = self.position + len;
        let slice = self
            .bytes
            .get(self.position..end)
            .ok_or_else(|| CoreError::decode(self.position, "unexpected end of file"))?;
        self.position = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CoreError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn i32(&mut self) -> Result<i32, CoreError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Checks the header and decodes every instruction after it.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<DecodedInstruction>, CoreError> {
    if bytes.len() < HEADER_SIZE || &bytes[..NCS_MAGIC.len()] != NCS_MAGIC {
        return Err(CoreError::decode(0, "missing NCS V1.0B header"));
    }
    let mut size = [0u8; 4];
    size.copy_from_slice(&bytes[SIZE_FIELD_OFFSET..HEADER_SIZE]);
    let size = u32::from_le_bytes(size) as usize;
    if size != bytes.len() {
        return Err(CoreError::decode(
            SIZE_FIELD_OFFSET,
            format!("size field says {size} bytes, file has {}", bytes.len()),
        ));
    }

    let mut reader = Reader {
        bytes,
        position: HEADER_SIZE,
    };
    let mut decoded = Vec::new();
    while reader.position < bytes.len() {
        let offset = reader.position;
        let opcode = reader.u8()?;
        let type_byte = reader.u8()?;
        let op = Op::decode(opcode, type_byte).ok_or_else(|| {
            CoreError::decode(offset, format!("unknown opcode {opcode:02X}/{type_byte:02X}"))
        })?;
        let operand = match op {
            Op::CpDownSp | Op::CpTopSp | Op::CpDownBp | Op::CpTopBp => {
                let offset = reader.i32()?;
                let size = reader.u16()?;
                Operand::Stack { offset, size }
            }
            Op::Const(Type::Float) => Operand::Float(f32::from_bits(reader.i32()? as u32)),
            Op::Const(Type::String) => {
                let len = reader.u16()? as usize;
                let text = reader.take(len)?;
                Operand::Str(String::from_utf8_lossy(text).into_owned())
            }
            Op::Const(_) | Op::MovSp | Op::Jmp | Op::Jsr | Op::Jz => Operand::Int(reader.i32()?),
            _ => Operand::None,
        };
        decoded.push(DecodedInstruction {
            offset,
            op,
            operand,
        });
    }
    Ok(decoded)
}

/// One line per instruction: offset, mnemonic, operands.
pub fn render(instructions: &[DecodedInstruction]) -> String {
    let mut out = String::new();
    for instruction in instructions {
        let _ = write!(out, "{:08X}  {:<10}", instruction.offset, instruction.op.mnemonic());
        let _ = match &instruction.operand {
            Operand::None => Ok(()),
            Operand::Int(_) if instruction.op.is_jump() => {
                let target = instruction.jump_target().unwrap_or_default();
                write!(out, "{target:08X}")
            }
            Operand::Int(value) => write!(out, "{value}"),
            Operand::Float(value) => write!(out, "{value}"),
            Operand::Str(text) => write!(out, "{text:?}"),
            Operand::Stack { offset, size } => write!(out, "{offset}, {size}"),
        };
        out.truncate(out.trim_end().len());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(code: &[u8]) -> Vec<u8> {
        let mut bytes = NCS_MAGIC.to_vec();
        let size = (HEADER_SIZE + code.len()) as u32;
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(code);
        bytes
    }

    #[test]
    fn decodes_stub_and_body() {
        let bytes = file(&[
            0x1E, 0x00, 0x00, 0x00, 0x00, 0x08, // JSR +8
            0x20, 0x00, // RETN
            0x04, 0x05, 0x00, 0x02, b'h', b'i', // CONSTS "hi"
            0x01, 0x01, 0xFF, 0xFF, 0xFF, 0xF8, 0x00, 0x04, // CPDOWNSP -8, 4
        ]);
        let decoded = disassemble(&bytes).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0].jump_target(), Some(21));
        assert_eq!(decoded[2].operand, Operand::Str("hi".to_string()));
        assert_eq!(decoded[3].operand_int(), Some(-8));

        let listing = render(&decoded);
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], "0000000D  JSR       00000015");
        assert_eq!(lines[1], "00000013  RETN");
        assert_eq!(lines[2], "00000015  CONSTS    \"hi\"");
        assert_eq!(lines[3], "0000001B  CPDOWNSP  -8, 4");
    }

    #[test]
    fn rejects_bad_headers_and_sizes() {
        assert!(disassemble(b"NCS V1.0").is_err());
        let mut bytes = file(&[0x20, 0x00]);
        bytes[9] = 0xFF;
        assert!(matches!(
            disassemble(&bytes),
            Err(CoreError::Decode { offset: 9, .. })
        ));
    }

    #[test]
    fn rejects_truncated_operands_and_unknown_opcodes() {
        assert!(matches!(
            disassemble(&file(&[0x04, 0x03, 0x00])),
            Err(CoreError::Decode { offset: 15, .. })
        ));
        assert!(matches!(
            disassemble(&file(&[0x05, 0x00])),
            Err(CoreError::Decode { offset: 13, .. })
        ));
    }
}
