//! Parses the C parameter lists that describe vtable slots.
//!
//! A slot is declared the way it appears in a C header, e.g.
//! `void *This, REFIID riid, void **ppvObject`. Only parameters that travel in
//! a single integer register or stack word are representable, since every
//! trampoline receives its arguments as pointer-sized words.
//!
//! # Examples
//! ```
//! use dyncom::signature::{NativeType, Signature};
//!
//! let sig = Signature::parse("void *This, void *pUnkOuter, REFIID riid, void **ppv").unwrap();
//! assert_eq!(sig.arity(), 3);
//! assert_eq!(sig.params()[2].ty, NativeType::Pointer);
//! assert!(Signature::parse("void *This, double scale").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Most arguments a slot may take after `this`.
pub const MAX_ARITY: usize = 6;

/// Scalar types a trampoline can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Pointer,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Isize,
    Usize,
}

impl NativeType {
    /// Size in bytes of the value.
    pub fn size(self) -> usize {
        match self {
            NativeType::I8 | NativeType::U8 => 1,
            NativeType::I16 | NativeType::U16 => 2,
            NativeType::I32 | NativeType::U32 => 4,
            NativeType::I64 | NativeType::U64 => 8,
            NativeType::Pointer | NativeType::Isize | NativeType::Usize => {
                std::mem::size_of::<usize>()
            }
        }
    }

    /// Maps a C or Windows SDK type name (without pointer stars).
    fn from_c_name(name: &str) -> Option<Self> {
        let ty = match name {
            "REFIID" | "REFCLSID" | "REFGUID" | "LPVOID" | "PVOID" | "LPUNKNOWN" | "HANDLE"
            | "LPCWSTR" | "LPWSTR" | "LPCSTR" | "LPSTR" | "BSTR" => NativeType::Pointer,
            "char" | "signed char" | "int8_t" | "CHAR" => NativeType::I8,
            "unsigned char" | "uint8_t" | "BYTE" | "BOOLEAN" | "UCHAR" => NativeType::U8,
            "short" | "signed short" | "int16_t" | "SHORT" => NativeType::I16,
            "unsigned short" | "uint16_t" | "WORD" | "USHORT" | "WCHAR" | "wchar_t" => {
                NativeType::U16
            }
            "int" | "signed int" | "signed" | "int32_t" | "INT" | "LONG" | "BOOL" | "HRESULT" => {
                NativeType::I32
            }
            "unsigned int" | "unsigned" | "uint32_t" | "UINT" | "ULONG" | "DWORD" => NativeType::U32,
            "long" | "signed long" => Self::c_long(true),
            "unsigned long" => Self::c_long(false),
            "long long" | "signed long long" | "int64_t" | "LONGLONG" | "__int64" | "LONG64" => {
                NativeType::I64
            }
            "unsigned long long" | "uint64_t" | "ULONGLONG" | "ULONG64" | "DWORD64" => NativeType::U64,
            "size_t" | "uintptr_t" | "SIZE_T" | "ULONG_PTR" | "UINT_PTR" | "DWORD_PTR" => {
                NativeType::Usize
            }
            "ssize_t" | "intptr_t" | "ptrdiff_t" | "LONG_PTR" | "INT_PTR" => NativeType::Isize,
            _ => return None,
        };
        Some(ty)
    }

    fn c_long(signed: bool) -> Self {
        match (std::mem::size_of::<std::ffi::c_long>(), signed) {
            (8, true) => NativeType::I64,
            (8, false) => NativeType::U64,
            (_, true) => NativeType::I32,
            (_, false) => NativeType::U32,
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: NativeType,
    pub name: Option<String>,
}

/// A parsed slot signature. The first parameter is always `this`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    text: String,
    params: Vec<Param>,
}

impl Signature {
    /// Parses a C parameter list.
    ///
    /// # Errors
    /// Returns [`Error::Signature`] for unknown or floating-point types,
    /// by-value `void`, a non-pointer first parameter, more than
    /// [`MAX_ARITY`] arguments after `this`, and 64-bit integers on targets
    /// where they do not fit one argument word.
    pub fn parse(text: &str) -> Result<Self> {
        let fail = |reason: String| Error::Signature {
            signature: text.to_string(),
            reason,
        };

        let mut params = Vec::new();
        for (index, raw) in text.split(',').enumerate() {
            let param = parse_param(raw).map_err(|reason| fail(format!("parameter {index}: {reason}")))?;
            params.push(param);
        }

        match params.first() {
            Some(Param { ty: NativeType::Pointer, .. }) => {}
            _ => return Err(fail("the first parameter must be the `this` pointer".into())),
        }

        if params.len() - 1 > MAX_ARITY {
            return Err(fail(format!(
                "{} arguments after `this`, at most {MAX_ARITY} are supported",
                params.len() - 1
            )));
        }

        if let Some(wide) = params.iter().find(|p| p.ty.size() > std::mem::size_of::<usize>()) {
            return Err(fail(format!(
                "{:?} does not fit a single argument word on this target",
                wide.ty
            )));
        }

        Ok(Self {
            text: text.trim().to_string(),
            params,
        })
    }

    /// Number of arguments after `this`.
    pub fn arity(&self) -> usize {
        self.params.len() - 1
    }

    /// All parameters, `this` included.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Parameters after `this`.
    pub fn args(&self) -> &[Param] {
        &self.params[1..]
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

const QUALIFIERS: &[&str] = &["const", "volatile", "struct", "__RPC_FAR", "_In_", "_Out_", "_In_opt_"];

const TYPE_WORDS: &[&str] = &["signed", "unsigned", "char", "short", "int", "long"];

fn parse_param(raw: &str) -> std::result::Result<Param, String> {
    let spaced = raw.replace('*', " * ");
    let mut stars = 0usize;
    let mut words = Vec::new();
    for token in spaced.split_whitespace() {
        if token == "*" {
            stars += 1;
        } else if !QUALIFIERS.contains(&token) {
            words.push(token);
        }
    }

    if words.is_empty() {
        return Err("missing type".into());
    }

    // A trailing identifier that is not part of a multi-word C type is the
    // parameter name.
    let name = if words.len() > 1 && !TYPE_WORDS.contains(words.last().unwrap_or(&"")) {
        words.pop().map(str::to_string)
    } else {
        None
    };
    let type_name = words.join(" ");

    if let Some(name) = &name {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid parameter name {name:?}"));
        }
    }

    if stars > 0 {
        return Ok(Param { ty: NativeType::Pointer, name });
    }

    match type_name.as_str() {
        "void" => Err("`void` is only valid behind a pointer".into()),
        "float" | "double" | "long double" | "FLOAT" | "DOUBLE" => {
            Err(format!("floating-point type `{type_name}` is not supported"))
        }
        _ => NativeType::from_c_name(&type_name)
            .map(|ty| Param { ty, name })
            .ok_or_else(|| format!("unknown type `{type_name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_iunknown_slots() {
        let qi = Signature::parse("void *This, REFIID riid, void **ppvObject").unwrap();
        assert_eq!(qi.arity(), 2);
        assert_eq!(qi.params()[0].name.as_deref(), Some("This"));
        assert_eq!(qi.args()[0].ty, NativeType::Pointer);
        assert_eq!(qi.args()[1].name.as_deref(), Some("ppvObject"));

        let add_ref = Signature::parse("void *This").unwrap();
        assert_eq!(add_ref.arity(), 0);
    }

    #[test]
    fn test_parses_scalar_types() {
        let sig = Signature::parse("void *This, uint32_t bLock, BOOL flag, unsigned short w, size_t n").unwrap();
        let types: Vec<NativeType> = sig.args().iter().map(|p| p.ty).collect();
        assert_eq!(
            types,
            vec![NativeType::U32, NativeType::I32, NativeType::U16, NativeType::Usize]
        );
        assert_eq!(sig.args()[2].name.as_deref(), Some("w"));
    }

    #[test]
    fn test_unnamed_and_multiword_types() {
        let sig = Signature::parse("void*, unsigned int, const void *, unsigned long").unwrap();
        assert_eq!(sig.arity(), 3);
        assert_eq!(sig.args()[0].ty, NativeType::U32);
        assert_eq!(sig.args()[0].name, None);
        assert_eq!(sig.args()[1].ty, NativeType::Pointer);
        assert!(sig.args()[2].ty == NativeType::U32 || sig.args()[2].ty == NativeType::U64);
    }

    #[test]
    fn test_any_pointer_is_a_pointer() {
        let sig = Signature::parse("IUnknown *This, double *out, struct Foo **pp").unwrap();
        assert!(sig.params().iter().all(|p| p.ty == NativeType::Pointer));
    }

    #[test]
    fn test_rejects_unrepresentable() {
        let bad = [
            "uint32_t notThis",
            "void *This, float x",
            "void *This, double x",
            "void *This, GUID byValue",
            "void *This, void",
            "void *This, ",
            "void *This, int a, int b, int c, int d, int e, int f, int g",
            "void *This, int a-b",
        ];
        for text in bad {
            match Signature::parse(text) {
                Err(Error::Signature { .. }) => {}
                other => panic!("expected signature error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_max_arity_accepted() {
        let sig = Signature::parse("void *This, int a, int b, int c, int d, int e, int f").unwrap();
        assert_eq!(sig.arity(), MAX_ARITY);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_64bit_integers_fit_on_64bit_targets() {
        let sig = Signature::parse("void *This, uint64_t big, LONGLONG signed_big").unwrap();
        assert_eq!(sig.args()[0].ty, NativeType::U64);
        assert_eq!(sig.args()[1].ty, NativeType::I64);
    }
}
