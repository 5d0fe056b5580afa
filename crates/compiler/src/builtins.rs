//! Built-in intrinsic catalogue
//!
//! Intrinsics are recognized without declarations: `peek`/`poke` memory
//! access, the `sei`/`cli`/`nop`/... instruction escapes, byte extraction
//! (`lo`/`hi`), and the compile-time queries (`sizeof`, `length`). The
//! table here is the single source the type checker, the IL generator,
//! and the purity analysis consult; purity classes additionally come from
//! the target configuration so new targets can reclassify without code
//! changes.

use crate::types::{FunctionSignature, Type};

/// One intrinsic's signature and lowering class.
#[derive(Debug, Clone)]
pub struct Intrinsic {
    pub name: &'static str,
    pub params: Vec<Type>,
    pub return_type: Type,
    /// Folds to a constant during IL generation
    pub compile_time: bool,
}

impl Intrinsic {
    /// Source-level signature, for the type checker.
    pub fn signature(&self) -> FunctionSignature {
        FunctionSignature {
            param_types: self.params.clone(),
            param_names: (0..self.params.len()).map(|i| format!("arg{}", i)).collect(),
            return_type: self.return_type.clone(),
        }
    }
}

/// Look up a built-in intrinsic by name.
pub fn intrinsic(name: &str) -> Option<Intrinsic> {
    let def = |params: Vec<Type>, ret: Type, compile_time: bool, name: &'static str| Intrinsic {
        name,
        params,
        return_type: ret,
        compile_time,
    };
    Some(match name {
        "peek" => def(vec![Type::Word], Type::Byte, false, "peek"),
        "peekw" => def(vec![Type::Word], Type::Word, false, "peekw"),
        "poke" => def(vec![Type::Word, Type::Byte], Type::Void, false, "poke"),
        "pokew" => def(vec![Type::Word, Type::Word], Type::Void, false, "pokew"),
        "lo" => def(vec![Type::Word], Type::Byte, false, "lo"),
        "hi" => def(vec![Type::Word], Type::Byte, false, "hi"),
        "sei" => def(vec![], Type::Void, false, "sei"),
        "cli" => def(vec![], Type::Void, false, "cli"),
        "nop" => def(vec![], Type::Void, false, "nop"),
        "brk" => def(vec![], Type::Void, false, "brk"),
        "pha" => def(vec![], Type::Void, false, "pha"),
        "pla" => def(vec![], Type::Void, false, "pla"),
        "php" => def(vec![], Type::Void, false, "php"),
        "plp" => def(vec![], Type::Void, false, "plp"),
        "barrier" => def(vec![], Type::Void, false, "barrier"),
        "volatile_read" => def(vec![Type::Word], Type::Byte, false, "volatile_read"),
        "volatile_write" => def(vec![Type::Word, Type::Byte], Type::Void, false, "volatile_write"),
        // The argument type is checked loosely: sizeof/length accept any
        // value and fold at compile time
        "sizeof" => def(vec![Type::Unknown], Type::Word, true, "sizeof"),
        "length" | "len" => def(vec![Type::Unknown], Type::Word, true, "length"),
        _ => return None,
    })
}

/// Whether a name is a built-in intrinsic.
pub fn is_intrinsic(name: &str) -> bool {
    intrinsic(name).is_some()
}
