//! AST - typed syntax tree handed over by the parser
//!
//! Each construct is its own variant. Recovery placeholders produced by the
//! parser are the `Error` variants; absent optional children are `None`.

use crate::name::QualifiedName;
use crate::ops::BinaryOperator;
use backlang_error::{Span, Spanned};
use serde::{Deserialize, Serialize};

/// One parsed source module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    /// Module path declared by the file, empty for the global module
    #[serde(default)]
    pub module: QualifiedName,
    /// File name used when rendering diagnostics
    #[serde(default)]
    pub file: Option<String>,
    /// Original source text used when rendering diagnostics
    #[serde(default)]
    pub source: Option<String>,
    pub body: Vec<Decl>,
}

impl Tree {
    pub fn new(module: impl Into<QualifiedName>, body: Vec<Decl>) -> Self {
        Self {
            module: module.into(),
            file: None,
            source: None,
            body,
        }
    }
}

/// Top-level declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decl {
    /// `struct`, `class` or `interface`
    Type(TypeDecl),

    /// `enum Color { Red, Green = 5, Blue }`
    Enum(EnumDecl),

    /// `type Shape = | Circle(radius: f64) | Square(side: f64)`
    TaggedUnion(TaggedUnionDecl),

    /// `union Word { low: u16 @ 0, full: u32 @ 0 }`
    Union(UnionDecl),

    /// Free function
    Fn(FnDecl),

    Error {
        #[serde(default)]
        span: Span,
    },
}

/// Modifier keywords attached to declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Static,
    Abstract,
    Sealed,
    Override,
    Extern,
    Operator,
    Mutable,
    Public,
    Private,
    Protected,
    Internal,
}

/// `@Obsolete` - resolved against `ObsoleteAttribute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub name: QualifiedName,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
}

/// Struct, class or interface declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    #[serde(rename = "type")]
    pub kind: TypeKind,
    pub name: String,
    #[serde(default)]
    pub bases: Vec<TypeExpr>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

/// Members of a struct, class or interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Member {
    /// `let mutable count: i32 = 0;`
    Field(FieldDecl),
    Method(FnDecl),
    /// `prop name: string { get; private set; }`
    Property(PropertyDecl),
    Error {
        #[serde(default)]
        span: Span,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub value: Option<Expr>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub getter: Option<Accessor>,
    #[serde(default)]
    pub setter: Option<Accessor>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

/// `get` / `set` inside a property
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accessor {
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    /// Backing integer type, `i32` when absent
    #[serde(default)]
    pub underlying: Option<TypeExpr>,
    pub members: Vec<EnumMember>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    #[serde(default)]
    pub ty: Option<TypeExpr>,
    /// Explicit value; must be an integer literal
    #[serde(default)]
    pub value: Option<Expr>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedUnionDecl {
    pub name: String,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<VariantField>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantField {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub span: Span,
}

/// Bit-layout union: every field shares storage at an explicit offset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDecl {
    pub name: String,
    pub fields: Vec<UnionField>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionField {
    pub name: String,
    pub ty: TypeExpr,
    /// Byte offset literal
    #[serde(default)]
    pub offset: Option<Expr>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

/// Function or method declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<TypeExpr>,
    /// `None` for abstract and extern declarations
    #[serde(default)]
    pub body: Option<Vec<Stmt>>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub default: Option<Expr>,
    #[serde(default)]
    pub span: Span,
}

/// Type expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpr {
    /// `i32`, `Demo.Point`
    Named {
        name: QualifiedName,
        #[serde(default)]
        span: Span,
    },

    /// `(i32, string) -> bool`; no result means `none`
    Function {
        params: Vec<TypeExpr>,
        #[serde(default)]
        ret: Option<Box<TypeExpr>>,
        #[serde(default)]
        span: Span,
    },
}

/// Statements of a function body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// `let x: i32 = 10;`
    Var(VarDecl),

    /// `print("hi");`, `helper(1);`, `Math::max(1, 2);`
    Call(CallStmt),

    /// `return expr;` or `return;`
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },

    /// `throw "boom";`
    Throw {
        value: Expr,
        #[serde(default)]
        span: Span,
    },

    Error {
        #[serde(default)]
        span: Span,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    #[serde(default)]
    pub ty: Option<TypeExpr>,
    #[serde(default)]
    pub value: Option<Expr>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStmt {
    pub callee: Callee,
    #[serde(default)]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Callee {
    /// `helper(...)`
    Unqualified { name: String },
    /// `Demo.Math::max(...)`
    Qualified { ty: QualifiedName, name: String },
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: Literal,
        #[serde(default)]
        span: Span,
    },

    Ident {
        name: String,
        #[serde(default)]
        span: Span,
    },

    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        #[serde(default)]
        span: Span,
    },

    Error {
        #[serde(default)]
        span: Span,
    },
}

/// Literal payloads, tagged by their source suffix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Bool(bool),
    Char(char),
    String(String),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F16(f32),
    F32(f32),
    F64(f64),
    Null,
}

impl Literal {
    /// Alias spelling of the literal's type (`i32`, `string`, ...)
    pub fn type_alias(&self) -> &'static str {
        match self {
            Literal::Bool(_) => "bool",
            Literal::Char(_) => "char",
            Literal::String(_) => "string",
            Literal::I8(_) => "i8",
            Literal::I16(_) => "i16",
            Literal::I32(_) => "i32",
            Literal::I64(_) => "i64",
            Literal::U8(_) => "u8",
            Literal::U16(_) => "u16",
            Literal::U32(_) => "u32",
            Literal::U64(_) => "u64",
            Literal::F16(_) => "f16",
            Literal::F32(_) => "f32",
            Literal::F64(_) => "f64",
            Literal::Null => "obj",
        }
    }

    /// Integer value, for enum values and field offsets
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Literal::I8(v) => Some(v.into()),
            Literal::I16(v) => Some(v.into()),
            Literal::I32(v) => Some(v.into()),
            Literal::I64(v) => Some(v),
            Literal::U8(v) => Some(v.into()),
            Literal::U16(v) => Some(v.into()),
            Literal::U32(v) => Some(v.into()),
            Literal::U64(v) => i64::try_from(v).ok(),
            Literal::Char(c) => Some(u32::from(c).into()),
            _ => None,
        }
    }
}

// ============================================================================
// Spans
// ============================================================================

impl Spanned for Decl {
    fn span(&self) -> Span {
        match self {
            Decl::Type(d) => d.span,
            Decl::Enum(d) => d.span,
            Decl::TaggedUnion(d) => d.span,
            Decl::Union(d) => d.span,
            Decl::Fn(d) => d.span,
            Decl::Error { span } => *span,
        }
    }
}

impl Spanned for Member {
    fn span(&self) -> Span {
        match self {
            Member::Field(f) => f.span,
            Member::Method(m) => m.span,
            Member::Property(p) => p.span,
            Member::Error { span } => *span,
        }
    }
}

impl Spanned for Stmt {
    fn span(&self) -> Span {
        match self {
            Stmt::Var(v) => v.span,
            Stmt::Call(c) => c.span,
            Stmt::Return { span, .. } | Stmt::Throw { span, .. } | Stmt::Error { span } => *span,
        }
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Error { span } => *span,
        }
    }
}

impl Spanned for TypeExpr {
    fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. } | TypeExpr::Function { span, .. } => *span,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

/// True when `modifiers` contains `modifier`
pub fn has_modifier(modifiers: &[Modifier], modifier: Modifier) -> bool {
    modifiers.contains(&modifier)
}

impl TypeExpr {
    pub fn named(name: impl Into<QualifiedName>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            span: Span::default(),
        }
    }

    pub fn function(params: Vec<TypeExpr>, ret: Option<TypeExpr>) -> Self {
        TypeExpr::Function {
            params,
            ret: ret.map(Box::new),
            span: Span::default(),
        }
    }
}

impl Expr {
    pub fn literal(value: Literal) -> Self {
        Expr::Literal {
            value,
            span: Span::default(),
        }
    }

    pub fn int(value: i32) -> Self {
        Self::literal(Literal::I32(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::String(value.into()))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident {
            name: name.into(),
            span: Span::default(),
        }
    }

    pub fn binary(op: BinaryOperator, lhs: Expr, rhs: Expr) -> Self {
        let span = lhs.span().merge(rhs.span());
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        }
    }

    /// Literal payload, if this is a literal leaf
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl Stmt {
    pub fn var(name: impl Into<String>, ty: Option<TypeExpr>, value: Option<Expr>) -> Self {
        Stmt::Var(VarDecl {
            name: name.into(),
            ty,
            value,
            span: Span::default(),
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Stmt::Call(CallStmt {
            callee: Callee::Unqualified { name: name.into() },
            args,
            span: Span::default(),
        })
    }

    pub fn call_qualified(
        ty: impl Into<QualifiedName>,
        name: impl Into<String>,
        args: Vec<Expr>,
    ) -> Self {
        Stmt::Call(CallStmt {
            callee: Callee::Qualified {
                ty: ty.into(),
                name: name.into(),
            },
            args,
            span: Span::default(),
        })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return {
            value,
            span: Span::default(),
        }
    }

    pub fn throw(value: Expr) -> Self {
        Stmt::Throw {
            value,
            span: Span::default(),
        }
    }
}

impl FnDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: None,
            body: None,
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            default: None,
            span: Span::default(),
        });
        self
    }

    pub fn returns(mut self, ty: TypeExpr) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn annotated(mut self, name: impl Into<QualifiedName>) -> Self {
        self.annotations.push(Annotation {
            name: name.into(),
            span: Span::default(),
        });
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl TypeDecl {
    pub fn new(kind: TypeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            bases: Vec::new(),
            members: Vec::new(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn base(mut self, ty: TypeExpr) -> Self {
        self.bases.push(ty);
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.members.push(Member::Field(FieldDecl {
            name: name.into(),
            ty,
            value: None,
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        }));
        self
    }

    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn method(self, method: FnDecl) -> Self {
        self.member(Member::Method(method))
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn annotated(mut self, name: impl Into<QualifiedName>) -> Self {
        self.annotations.push(Annotation {
            name: name.into(),
            span: Span::default(),
        });
        self
    }
}

impl EnumDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            underlying: None,
            members: Vec::new(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn member(mut self, name: impl Into<String>, value: Option<Expr>) -> Self {
        self.members.push(EnumMember {
            name: name.into(),
            ty: None,
            value,
            span: Span::default(),
        });
        self
    }
}

impl TaggedUnionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }
}

impl Variant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.fields.push(VariantField {
            name: name.into(),
            ty,
            modifiers: Vec::new(),
            span: Span::default(),
        });
        self
    }
}

impl UnionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr, offset: i32) -> Self {
        self.fields.push(UnionField {
            name: name.into(),
            ty,
            offset: Some(Expr::int(offset)),
            annotations: Vec::new(),
            span: Span::default(),
        });
        self
    }
}
