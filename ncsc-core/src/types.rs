//! Value types of the NSS subset understood by the compiler.
//!
//! Every value occupies exactly one 4-byte stack cell in the target
//! virtual machine, so the type mostly decides which opcode variant
//! the code generator has to pick.

use std::fmt;

/// Size in bytes of one stack cell in the NCS virtual machine.
pub const CELL_SIZE: i32 = 4;

/// Represents the types of values and expressions in NSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int,
    Float,
    String,
    Object,
}

impl Type {
    /// Parses a type keyword as it appears in source.
    pub fn from_keyword(word: &str) -> Option<Type> {
        match word {
            "void" => Some(Type::Void),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "string" => Some(Type::String),
            "object" => Some(Type::Object),
            _ => None,
        }
    }

    /// Returns true if this type is `void`.
    pub fn is_void(self) -> bool {
        matches!(self, Type::Void)
    }

    /// Unary type code used by RSADD, CONST, NEG and friends.
    ///
    /// `void` has no stack representation and therefore no code.
    pub fn unary_code(self) -> Option<u8> {
        match self {
            Type::Void => None,
            Type::Int => Some(0x03),
            Type::Float => Some(0x04),
            Type::String => Some(0x05),
            Type::Object => Some(0x06),
        }
    }

    /// Number of bytes a value of this type occupies on the stack.
    pub fn stack_size(self) -> i32 {
        if self.is_void() { 0 } else { CELL_SIZE }
    }

    /// The type name preceded by its indefinite article, as used in
    /// the reference compiler's diagnostics ("a void", "an int").
    pub fn with_article(self) -> String {
        match self {
            Type::Int | Type::Object => format!("an {self}"),
            _ => format!("a {self}"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Void => "void",
            Type::Int => "int",
            Type::Float => "float",
            Type::String => "string",
            Type::Object => "object",
        };
        f.write_str(name)
    }
}

/// Binary operand-type pair, as encoded in the type byte of
/// arithmetic and comparison instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePair {
    IntInt,
    FloatFloat,
    ObjectObject,
    StringString,
    IntFloat,
    FloatInt,
}

impl TypePair {
    pub fn of(left: Type, right: Type) -> Option<TypePair> {
        match (left, right) {
            (Type::Int, Type::Int) => Some(TypePair::IntInt),
            (Type::Float, Type::Float) => Some(TypePair::FloatFloat),
            (Type::Object, Type::Object) => Some(TypePair::ObjectObject),
            (Type::String, Type::String) => Some(TypePair::StringString),
            (Type::Int, Type::Float) => Some(TypePair::IntFloat),
            (Type::Float, Type::Int) => Some(TypePair::FloatInt),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TypePair::IntInt => 0x20,
            TypePair::FloatFloat => 0x21,
            TypePair::ObjectObject => 0x22,
            TypePair::StringString => 0x23,
            TypePair::IntFloat => 0x25,
            TypePair::FloatInt => 0x26,
        }
    }

    pub fn from_code(code: u8) -> Option<TypePair> {
        match code {
            0x20 => Some(TypePair::IntInt),
            0x21 => Some(TypePair::FloatFloat),
            0x22 => Some(TypePair::ObjectObject),
            0x23 => Some(TypePair::StringString),
            0x25 => Some(TypePair::IntFloat),
            0x26 => Some(TypePair::FloatInt),
            _ => None,
        }
    }

    /// Result type of an arithmetic operation over this pair.
    pub fn arithmetic_result(self) -> Type {
        match self {
            TypePair::IntInt => Type::Int,
            TypePair::FloatFloat | TypePair::IntFloat | TypePair::FloatInt => Type::Float,
            TypePair::StringString => Type::String,
            TypePair::ObjectObject => Type::Object,
        }
    }
}
