//! IR entities - types, fields, methods, properties and attributes
//!
//! Entities reference each other through small copyable handles
//! ([`TypeId`], [`MethodRef`], [`FieldRef`]) into the owning
//! [`TypeTable`](crate::module::TypeTable). An unresolved type reference is
//! `None`: the entity exists but is only partially built.

use crate::constant::Constant;
use crate::flow::FlowGraph;
use backlang_error::Span;
use backlang_syntax::QualifiedName;
use std::ops::BitOr;

/// Handle to a type in the [`TypeTable`](crate::module::TypeTable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A method, by declaring type and position in its method list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub ty: TypeId,
    pub index: usize,
}

/// A field, by declaring type and position in its field list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub ty: TypeId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
    Internal,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Internal => "internal",
        }
    }
}

/// Where a type comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Platform library or target intrinsics; referenced, never emitted
    External,
    /// Declared by the program being compiled
    Defined,
}

/// Built-in scalar and reference types of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
    String,
    Object,
}

impl Primitive {
    /// `(bits, signed)` for integer types
    pub fn int_width(self) -> Option<(u8, bool)> {
        match self {
            Primitive::I8 => Some((8, true)),
            Primitive::U8 => Some((8, false)),
            Primitive::I16 => Some((16, true)),
            Primitive::U16 | Primitive::Char => Some((16, false)),
            Primitive::I32 => Some((32, true)),
            Primitive::U32 => Some((32, false)),
            Primitive::I64 => Some((64, true)),
            Primitive::U64 => Some((64, false)),
            _ => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F16 | Primitive::F32 | Primitive::F64)
    }

    pub fn is_value_type(self) -> bool {
        !matches!(self, Primitive::String | Primitive::Object | Primitive::Void)
    }
}

/// Declaration kinds an attribute may decorate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeTargets(u16);

impl AttributeTargets {
    pub const CLASS: Self = Self(1 << 0);
    pub const STRUCT: Self = Self(1 << 1);
    pub const ENUM: Self = Self(1 << 2);
    pub const INTERFACE: Self = Self(1 << 3);
    pub const METHOD: Self = Self(1 << 4);
    pub const PROPERTY: Self = Self(1 << 5);
    pub const FIELD: Self = Self(1 << 6);
    pub const ALL: Self = Self(0x7f);

    /// True when any target in `kind` is allowed
    pub fn allows(self, kind: AttributeTargets) -> bool {
        self.0 & kind.0 != 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for AttributeTargets {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An applied attribute: attribute type plus constructor arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub ty: TypeId,
    pub args: Vec<Constant>,
}

impl Attribute {
    pub fn new(ty: TypeId) -> Self {
        Self { ty, args: Vec::new() }
    }

    pub fn with_arg(mut self, arg: Constant) -> Self {
        self.args.push(arg);
        self
    }
}

/// Type entity
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: QualifiedName,
    pub origin: Origin,
    pub visibility: Visibility,
    /// At most one class base first, interfaces after
    pub bases: Vec<TypeId>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_interface: bool,
    pub is_value_type: bool,
    pub primitive: Option<Primitive>,
    /// Allowed targets when this type is an attribute
    pub attribute_usage: Option<AttributeTargets>,
    /// Number of generic parameters of a generic definition
    pub generic_arity: usize,
    /// Set on instantiations such as `Func`2<Int32, String>`
    pub generic_definition: Option<TypeId>,
    pub generic_args: Vec<TypeId>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub properties: Vec<Property>,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

impl TypeDef {
    pub fn new(name: QualifiedName, origin: Origin) -> Self {
        Self {
            name,
            origin,
            visibility: Visibility::Public,
            bases: Vec::new(),
            is_static: false,
            is_abstract: false,
            is_sealed: false,
            is_interface: false,
            is_value_type: false,
            primitive: None,
            attribute_usage: None,
            generic_arity: 0,
            generic_definition: None,
            generic_args: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            attributes: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn is_external(&self) -> bool {
        self.origin == Origin::External
    }

    /// First base that is not an interface
    pub fn base_class(&self) -> Option<TypeId> {
        self.bases.first().copied()
    }

    pub fn find_method(&self, name: &str) -> impl Iterator<Item = (usize, &Method)> + '_ {
        let name = name.to_string();
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Field entity
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Option<TypeId>,
    pub visibility: Visibility,
    pub is_static: bool,
    /// Fields are read-only unless declared `mutable`
    pub is_mutable: bool,
    /// Compile-time constant such as an enum member
    pub is_literal: bool,
    pub initial_value: Option<Constant>,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Option<TypeId>) -> Self {
        Self {
            name: name.into(),
            ty,
            visibility: Visibility::Public,
            is_static: false,
            is_mutable: false,
            is_literal: false,
            initial_value: None,
            attributes: Vec::new(),
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Option<TypeId>,
    pub default: Option<Constant>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Option<TypeId>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }
}

/// Method entity
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_constructor: bool,
    pub is_destructor: bool,
    pub is_override: bool,
    pub is_abstract: bool,
    pub is_extern: bool,
    pub params: Vec<Parameter>,
    /// `System.Void` for procedures; `None` only when unresolved
    pub return_type: Option<TypeId>,
    pub attributes: Vec<Attribute>,
    /// Attached by body lowering
    pub body: Option<FlowGraph>,
    pub span: Span,
}

impl Method {
    pub fn new(name: impl Into<String>, return_type: Option<TypeId>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            is_constructor: false,
            is_destructor: false,
            is_override: false,
            is_abstract: false,
            is_extern: false,
            params: Vec::new(),
            return_type,
            attributes: Vec::new(),
            body: None,
            span: Span::default(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: Option<TypeId>) -> Self {
        self.params.push(Parameter::new(name, ty));
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Parameter types in order
    pub fn signature(&self) -> Vec<Option<TypeId>> {
        self.params.iter().map(|p| p.ty).collect()
    }

    /// Same name and parameter types
    pub fn same_signature(&self, other: &Method) -> bool {
        self.name == other.name && self.signature() == other.signature()
    }
}

/// Property entity with optional synthesized accessors
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: Option<TypeId>,
    pub visibility: Visibility,
    /// `get_<Name>`
    pub getter: Option<Method>,
    /// `set_<Name>`
    pub setter: Option<Method>,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}
