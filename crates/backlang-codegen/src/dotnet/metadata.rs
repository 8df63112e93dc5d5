//! Metadata tables of the managed-object container and their byte layout.
//!
//! Rows are built in memory by [`super::ImageBuilder`] and serialized in one
//! pass by [`Image::write_to`]. Every integer is little-endian; strings and
//! blobs are prefixed with a `u32` byte length.

use backlang_ir::{Constant, Primitive};
use std::io::{self, Write};

pub const MAGIC: &[u8; 4] = b"BLMO";
pub const VERSION: u16 = 1;

/// Metadata table numbers, the high byte of a [`Token`]
pub mod table {
    pub const TYPE_REF: u8 = 0x01;
    pub const TYPE_DEF: u8 = 0x02;
    pub const FIELD: u8 = 0x04;
    pub const METHOD_DEF: u8 = 0x06;
    pub const MEMBER_REF: u8 = 0x0A;
    pub const USER_STRING: u8 = 0x70;
}

/// Table number in the high byte, 1-based row in the low 24 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u32);

impl Token {
    pub fn new(table: u8, row: u32) -> Self {
        Self(u32::from(table) << 24 | (row & 0x00FF_FFFF))
    }

    pub fn table(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn row(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

pub mod type_flags {
    pub const PUBLIC: u32 = 0x0000_0001;
    pub const SEQUENTIAL_LAYOUT: u32 = 0x0000_0008;
    pub const EXPLICIT_LAYOUT: u32 = 0x0000_0010;
    pub const INTERFACE: u32 = 0x0000_0020;
    pub const ABSTRACT: u32 = 0x0000_0080;
    pub const SEALED: u32 = 0x0000_0100;
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

pub mod field_flags {
    pub const PRIVATE: u16 = 0x0001;
    pub const ASSEMBLY: u16 = 0x0003;
    pub const FAMILY: u16 = 0x0004;
    pub const PUBLIC: u16 = 0x0006;
    pub const STATIC: u16 = 0x0010;
    pub const INIT_ONLY: u16 = 0x0020;
    pub const LITERAL: u16 = 0x0040;
    pub const SPECIAL_NAME: u16 = 0x0200;
    pub const RT_SPECIAL_NAME: u16 = 0x0400;
    pub const HAS_DEFAULT: u16 = 0x8000;
}

pub mod method_flags {
    pub const PUBLIC: u16 = 0x0006;
    pub const STATIC: u16 = 0x0010;
    pub const VIRTUAL: u16 = 0x0040;
    pub const HIDE_BY_SIG: u16 = 0x0080;
    pub const NEW_SLOT: u16 = 0x0100;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SPECIAL_NAME: u16 = 0x0800;
    pub const RT_SPECIAL_NAME: u16 = 0x1000;
    pub const PINVOKE_IMPL: u16 = 0x2000;

    /// Implementation flags
    pub const IMPL_IL: u16 = 0x0000;
    pub const IMPL_INTERNAL_CALL: u16 = 0x1000;
}

pub const PARAM_HAS_DEFAULT: u16 = 0x1000;

/// Signature element types
pub mod element {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const VALUE_TYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const OBJECT: u8 = 0x1C;
}

/// Signature leading bytes
pub const SIG_FIELD: u8 = 0x06;
pub const SIG_PROPERTY: u8 = 0x08;
pub const SIG_HAS_THIS: u8 = 0x20;

/// Element type of a primitive; `Half` has none and is encoded as a value type
pub fn element_type(primitive: Primitive) -> Option<u8> {
    let element = match primitive {
        Primitive::Void => element::VOID,
        Primitive::Bool => element::BOOLEAN,
        Primitive::Char => element::CHAR,
        Primitive::I8 => element::I1,
        Primitive::U8 => element::U1,
        Primitive::I16 => element::I2,
        Primitive::U16 => element::U2,
        Primitive::I32 => element::I4,
        Primitive::U32 => element::U4,
        Primitive::I64 => element::I8,
        Primitive::U64 => element::U8,
        Primitive::F32 => element::R4,
        Primitive::F64 => element::R8,
        Primitive::String => element::STRING,
        Primitive::Object => element::OBJECT,
        Primitive::F16 => return None,
    };
    Some(element)
}

/// Element type a constant is stored as
pub fn constant_element(value: &Constant) -> u8 {
    match value {
        Constant::Int { bits, signed, .. } => match (bits, signed) {
            (8, true) => element::I1,
            (8, false) => element::U1,
            (16, true) => element::I2,
            (16, false) => element::U2,
            (64, true) => element::I8,
            (64, false) => element::U8,
            (_, false) => element::U4,
            _ => element::I4,
        },
        Constant::Float32(_) => element::R4,
        Constant::Float64(_) => element::R8,
        Constant::String(_) => element::STRING,
        Constant::Char(_) => element::CHAR,
        Constant::Bool(_) => element::BOOLEAN,
        Constant::Null => element::CLASS,
    }
}

/// Raw payload of a constant, without its element type
pub fn constant_payload(value: &Constant, out: &mut Vec<u8>) {
    match value {
        Constant::Int { value, bits, .. } => {
            let bytes = value.to_le_bytes();
            out.extend_from_slice(&bytes[..usize::from(*bits / 8)]);
        }
        Constant::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Constant::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Constant::String(s) => {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Constant::Char(c) => out.extend_from_slice(&(u32::from(*c) as u16).to_le_bytes()),
        Constant::Bool(b) => out.push(u8::from(*b)),
        Constant::Null => out.extend_from_slice(&0u32.to_le_bytes()),
    }
}

/// Default-value blob: element type, then payload
pub fn constant_blob(value: &Constant) -> Vec<u8> {
    let mut blob = vec![constant_element(value)];
    constant_payload(value, &mut blob);
    blob
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRef {
    pub name: String,
    pub version: [u16; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRefRow {
    /// 1-based assembly reference row
    pub scope: u32,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberRefRow {
    pub parent: Token,
    pub name: String,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeRow {
    pub ctor: Token,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub flags: u16,
    pub name: String,
    pub signature: Vec<u8>,
    pub default: Option<Vec<u8>>,
    pub attributes: Vec<CustomAttributeRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamRow {
    pub name: String,
    pub flags: u16,
    pub default: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodBody {
    pub max_stack: u16,
    /// Local variable type signatures, by slot
    pub locals: Vec<Vec<u8>>,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodRow {
    pub flags: u16,
    pub impl_flags: u16,
    pub name: String,
    pub signature: Vec<u8>,
    pub params: Vec<ParamRow>,
    pub attributes: Vec<CustomAttributeRow>,
    pub body: Option<MethodBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRow {
    pub name: String,
    pub signature: Vec<u8>,
    pub getter: Option<Token>,
    pub setter: Option<Token>,
    pub attributes: Vec<CustomAttributeRow>,
}

/// Packing size and minimum class size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassLayout {
    pub packing: u16,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefRow {
    pub flags: u32,
    pub namespace: String,
    pub name: String,
    pub extends: Option<Token>,
    pub layout: Option<ClassLayout>,
    pub interfaces: Vec<Token>,
    pub attributes: Vec<CustomAttributeRow>,
    pub fields: Vec<FieldRow>,
    pub methods: Vec<MethodRow>,
    pub properties: Vec<PropertyRow>,
}

/// A complete managed-object image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: String,
    pub version: [u16; 4],
    pub assembly_refs: Vec<AssemblyRef>,
    pub attributes: Vec<CustomAttributeRow>,
    pub type_refs: Vec<TypeRefRow>,
    pub member_refs: Vec<MemberRefRow>,
    pub user_strings: Vec<String>,
    pub type_defs: Vec<TypeDefRow>,
    pub entry_point: Option<Token>,
}

fn wr_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}
fn wr_u16le<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_u32le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
fn wr_blob<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    wr_u32le(w, bytes.len() as u32)?;
    w.write_all(bytes)
}
fn wr_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    wr_blob(w, s.as_bytes())
}
fn wr_len<W: Write>(w: &mut W, len: usize) -> io::Result<()> {
    wr_u32le(w, len as u32)
}
fn wr_token<W: Write>(w: &mut W, token: Option<Token>) -> io::Result<()> {
    wr_u32le(w, token.map_or(0, Token::raw))
}
fn wr_optional_blob<W: Write>(w: &mut W, blob: &Option<Vec<u8>>) -> io::Result<()> {
    match blob {
        Some(bytes) => {
            wr_u8(w, 1)?;
            wr_blob(w, bytes)
        }
        None => wr_u8(w, 0),
    }
}
fn wr_version<W: Write>(w: &mut W, version: &[u16; 4]) -> io::Result<()> {
    for part in version {
        wr_u16le(w, *part)?;
    }
    Ok(())
}
fn wr_attributes<W: Write>(w: &mut W, attributes: &[CustomAttributeRow]) -> io::Result<()> {
    wr_len(w, attributes.len())?;
    for attr in attributes {
        wr_u32le(w, attr.ctor.raw())?;
        wr_blob(w, &attr.value)?;
    }
    Ok(())
}

impl Image {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        // header
        w.write_all(MAGIC)?;
        wr_u16le(w, VERSION)?;
        wr_str(w, &self.name)?;
        wr_version(w, &self.version)?;

        wr_len(w, self.assembly_refs.len())?;
        for r in &self.assembly_refs {
            wr_str(w, &r.name)?;
            wr_version(w, &r.version)?;
        }
        wr_attributes(w, &self.attributes)?;

        wr_len(w, self.type_refs.len())?;
        for r in &self.type_refs {
            wr_u32le(w, r.scope)?;
            wr_str(w, &r.namespace)?;
            wr_str(w, &r.name)?;
        }

        wr_len(w, self.member_refs.len())?;
        for r in &self.member_refs {
            wr_u32le(w, r.parent.raw())?;
            wr_str(w, &r.name)?;
            wr_blob(w, &r.signature)?;
        }

        wr_len(w, self.user_strings.len())?;
        for s in &self.user_strings {
            wr_str(w, s)?;
        }

        wr_len(w, self.type_defs.len())?;
        for ty in &self.type_defs {
            write_type_def(w, ty)?;
        }

        wr_token(w, self.entry_point)
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn write_type_def<W: Write>(w: &mut W, ty: &TypeDefRow) -> io::Result<()> {
    wr_u32le(w, ty.flags)?;
    wr_str(w, &ty.namespace)?;
    wr_str(w, &ty.name)?;
    wr_token(w, ty.extends)?;
    match ty.layout {
        Some(layout) => {
            wr_u8(w, 1)?;
            wr_u16le(w, layout.packing)?;
            wr_u32le(w, layout.size)?;
        }
        None => wr_u8(w, 0)?,
    }
    wr_len(w, ty.interfaces.len())?;
    for interface in &ty.interfaces {
        wr_u32le(w, interface.raw())?;
    }
    wr_attributes(w, &ty.attributes)?;

    wr_len(w, ty.fields.len())?;
    for field in &ty.fields {
        wr_u16le(w, field.flags)?;
        wr_str(w, &field.name)?;
        wr_blob(w, &field.signature)?;
        wr_optional_blob(w, &field.default)?;
        wr_attributes(w, &field.attributes)?;
    }

    wr_len(w, ty.methods.len())?;
    for method in &ty.methods {
        wr_u16le(w, method.flags)?;
        wr_u16le(w, method.impl_flags)?;
        wr_str(w, &method.name)?;
        wr_blob(w, &method.signature)?;
        wr_len(w, method.params.len())?;
        for param in &method.params {
            wr_str(w, &param.name)?;
            wr_u16le(w, param.flags)?;
            wr_optional_blob(w, &param.default)?;
        }
        wr_attributes(w, &method.attributes)?;
        match &method.body {
            Some(body) => {
                wr_u8(w, 1)?;
                wr_u16le(w, body.max_stack)?;
                wr_len(w, body.locals.len())?;
                for local in &body.locals {
                    wr_blob(w, local)?;
                }
                wr_blob(w, &body.code)?;
            }
            None => wr_u8(w, 0)?,
        }
    }

    wr_len(w, ty.properties.len())?;
    for property in &ty.properties {
        wr_str(w, &property.name)?;
        wr_blob(w, &property.signature)?;
        wr_token(w, property.getter)?;
        wr_token(w, property.setter)?;
        wr_attributes(w, &property.attributes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokens() {
        let token = Token::new(table::METHOD_DEF, 3);
        assert_eq!(token.raw(), 0x0600_0003);
        assert_eq!(token.table(), table::METHOD_DEF);
        assert_eq!(token.row(), 3);
    }

    #[test]
    fn test_constant_blobs() {
        assert_eq!(constant_blob(&Constant::i32(-2)), vec![element::I4, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(constant_blob(&Constant::integer(7, Some(Primitive::U8))), vec![element::U1, 7]);
        assert_eq!(constant_blob(&Constant::Bool(true)), vec![element::BOOLEAN, 1]);
        assert_eq!(constant_blob(&Constant::String("ab".into())), vec![element::STRING, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_empty_image_layout() {
        let image = Image {
            name: "a".to_string(),
            version: [1, 0, 0, 0],
            assembly_refs: Vec::new(),
            attributes: Vec::new(),
            type_refs: Vec::new(),
            member_refs: Vec::new(),
            user_strings: Vec::new(),
            type_defs: Vec::new(),
            entry_point: None,
        };
        let bytes = image.to_bytes().unwrap();

        let mut expected = b"BLMO".to_vec();
        expected.extend_from_slice(&[1, 0]);
        expected.extend_from_slice(&[1, 0, 0, 0, b'a']);
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        // empty tables, then a null entry point
        expected.extend_from_slice(&[0; 4 * 7]);
        assert_eq!(bytes, expected);
    }
}
