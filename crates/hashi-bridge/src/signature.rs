//! Type and method signature text
//!
//! Signatures use the compact descriptor grammar: one letter per primitive
//! (`Z B C S I J F D`, `V` for void), `Lpkg/Class;` for object types, `[`
//! prefix per array dimension, and `(args)ret` for methods. Parsing and
//! rendering round-trip exactly.

use crate::error::{BridgeError, BridgeResult};
use std::fmt;

/// A parsed type descriptor.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeSig {
    /// `Z`
    Bool,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `V` (method returns only)
    Void,
    /// `Lname;` with slash-separated name
    Object(String),
    /// `[elem`
    Array(Box<TypeSig>),
}

impl TypeSig {
    /// Parse a full type descriptor; trailing text is an error.
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let mut rest = text;
        let sig = parse_type(&mut rest, text)?;
        if !rest.is_empty() {
            return Err(BridgeError::BadSignature(text.to_owned()));
        }
        Ok(sig)
    }

    /// True for the eight primitive kinds (not void, not references).
    pub fn is_primitive(&self) -> bool {
        !matches!(self, TypeSig::Void | TypeSig::Object(_) | TypeSig::Array(_))
    }

    /// True for object and array types.
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeSig::Object(_) | TypeSig::Array(_))
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Bool => f.write_str("Z"),
            TypeSig::Byte => f.write_str("B"),
            TypeSig::Char => f.write_str("C"),
            TypeSig::Short => f.write_str("S"),
            TypeSig::Int => f.write_str("I"),
            TypeSig::Long => f.write_str("J"),
            TypeSig::Float => f.write_str("F"),
            TypeSig::Double => f.write_str("D"),
            TypeSig::Void => f.write_str("V"),
            TypeSig::Object(name) => write!(f, "L{name};"),
            TypeSig::Array(elem) => write!(f, "[{elem}"),
        }
    }
}

/// A parsed method descriptor: argument list and return type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodSig {
    /// Argument types, in declaration order.
    pub args: Vec<TypeSig>,
    /// Return type (possibly [`TypeSig::Void`]).
    pub ret: TypeSig,
}

impl MethodSig {
    /// Parse a `(args)ret` method descriptor.
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let mut rest = text
            .strip_prefix('(')
            .ok_or_else(|| BridgeError::BadSignature(text.to_owned()))?;
        let mut args = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            if rest.is_empty() {
                return Err(BridgeError::BadSignature(text.to_owned()));
            }
            let arg = parse_type(&mut rest, text)?;
            if arg == TypeSig::Void {
                return Err(BridgeError::BadSignature(text.to_owned()));
            }
            args.push(arg);
        }
        let ret = parse_type(&mut rest, text)?;
        if !rest.is_empty() {
            return Err(BridgeError::BadSignature(text.to_owned()));
        }
        Ok(MethodSig { args, ret })
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for arg in &self.args {
            write!(f, "{arg}")?;
        }
        write!(f, "){}", self.ret)
    }
}

fn parse_type(rest: &mut &str, whole: &str) -> BridgeResult<TypeSig> {
    let bad = || BridgeError::BadSignature(whole.to_owned());
    let mut chars = rest.chars();
    let head = chars.next().ok_or_else(bad)?;
    let sig = match head {
        'Z' => TypeSig::Bool,
        'B' => TypeSig::Byte,
        'C' => TypeSig::Char,
        'S' => TypeSig::Short,
        'I' => TypeSig::Int,
        'J' => TypeSig::Long,
        'F' => TypeSig::Float,
        'D' => TypeSig::Double,
        'V' => TypeSig::Void,
        'L' => {
            let body = chars.as_str();
            let end = body.find(';').ok_or_else(bad)?;
            let name = &body[..end];
            if name.is_empty() {
                return Err(bad());
            }
            *rest = &body[end + 1..];
            return Ok(TypeSig::Object(name.to_owned()));
        }
        '[' => {
            *rest = chars.as_str();
            let elem = parse_type(rest, whole)?;
            if elem == TypeSig::Void {
                return Err(bad());
            }
            return Ok(TypeSig::Array(Box::new(elem)));
        }
        _ => return Err(bad()),
    };
    *rest = chars.as_str();
    Ok(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_letters() {
        for (text, sig) in [
            ("Z", TypeSig::Bool),
            ("B", TypeSig::Byte),
            ("C", TypeSig::Char),
            ("S", TypeSig::Short),
            ("I", TypeSig::Int),
            ("J", TypeSig::Long),
            ("F", TypeSig::Float),
            ("D", TypeSig::Double),
            ("V", TypeSig::Void),
        ] {
            assert_eq!(TypeSig::parse(text).unwrap(), sig);
            assert_eq!(sig.to_string(), text);
        }
    }

    #[test]
    fn test_object_and_array() {
        let s = TypeSig::parse("Lrt/String;").unwrap();
        assert_eq!(s, TypeSig::Object("rt/String".into()));
        assert_eq!(s.to_string(), "Lrt/String;");

        let a = TypeSig::parse("[[I").unwrap();
        assert_eq!(
            a,
            TypeSig::Array(Box::new(TypeSig::Array(Box::new(TypeSig::Int))))
        );
        assert_eq!(a.to_string(), "[[I");

        let oa = TypeSig::parse("[Lrt/String;").unwrap();
        assert_eq!(oa.to_string(), "[Lrt/String;");
    }

    #[test]
    fn test_method_descriptor() {
        let m = MethodSig::parse("(ILrt/String;[J)V").unwrap();
        assert_eq!(m.args.len(), 3);
        assert_eq!(m.args[0], TypeSig::Int);
        assert_eq!(m.args[1], TypeSig::Object("rt/String".into()));
        assert_eq!(m.args[2], TypeSig::Array(Box::new(TypeSig::Long)));
        assert_eq!(m.ret, TypeSig::Void);
        assert_eq!(m.to_string(), "(ILrt/String;[J)V");

        let empty = MethodSig::parse("()Z").unwrap();
        assert!(empty.args.is_empty());
        assert_eq!(empty.to_string(), "()Z");
    }

    #[test]
    fn test_malformed_rejected() {
        for text in ["", "Q", "L;", "Lrt/String", "[", "[V", "IZ"] {
            assert!(matches!(TypeSig::parse(text), Err(BridgeError::BadSignature(_))), "{text}");
        }
        for text in ["", "()", "(", "I)V", "()VV", "(V)I"] {
            assert!(matches!(MethodSig::parse(text), Err(BridgeError::BadSignature(_))), "{text}");
        }
    }
}
