//! Source-like rendering of syntax trees, used by `backlang ast`.

use crate::ast::*;
use crate::ops::Associativity;
use std::fmt::{self, Display, Formatter, Write};

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(v) => write!(f, "{}", v),
            Literal::Char(c) => write!(f, "{:?}", c),
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::I8(v) => write!(f, "{}i8", v),
            Literal::I16(v) => write!(f, "{}i16", v),
            Literal::I32(v) => write!(f, "{}", v),
            Literal::I64(v) => write!(f, "{}i64", v),
            Literal::U8(v) => write!(f, "{}u8", v),
            Literal::U16(v) => write!(f, "{}u16", v),
            Literal::U32(v) => write!(f, "{}u32", v),
            Literal::U64(v) => write!(f, "{}u64", v),
            Literal::F16(v) => write!(f, "{}f16", v),
            Literal::F32(v) => write!(f, "{}f32", v),
            Literal::F64(v) => write!(f, "{:?}", v),
            Literal::Null => write!(f, "none"),
        }
    }
}

impl Display for TypeExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named { name, .. } => write!(f, "{}", name),
            TypeExpr::Function { params, ret, .. } => {
                write!(f, "(")?;
                write_list(f, params)?;
                match ret {
                    Some(ret) => write!(f, ") -> {}", ret),
                    None => write!(f, ") -> none"),
                }
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_expr(self, 0, f)
    }
}

/// Parenthesizes only where the operator table requires it
fn fmt_expr(expr: &Expr, min_precedence: u8, f: &mut Formatter<'_>) -> fmt::Result {
    match expr {
        Expr::Literal { value, .. } => write!(f, "{}", value),
        Expr::Ident { name, .. } => write!(f, "{}", name),
        Expr::Error { .. } => write!(f, "<error>"),
        Expr::Binary { op, lhs, rhs, .. } => {
            let precedence = op.precedence();
            let (left_min, right_min) = match op.associativity() {
                Associativity::Left => (precedence, precedence + 1),
                Associativity::Right => (precedence + 1, precedence),
            };

            let wrap = precedence < min_precedence;
            if wrap {
                write!(f, "(")?;
            }
            fmt_expr(lhs, left_min, f)?;
            write!(f, " {} ", op)?;
            fmt_expr(rhs, right_min, f)?;
            if wrap {
                write!(f, ")")?;
            }
            Ok(())
        }
    }
}

impl Display for Callee {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Unqualified { name } => write!(f, "{}", name),
            Callee::Qualified { ty, name } => write!(f, "{}::{}", ty, name),
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Var(var) => {
                write!(f, "let {}", var.name)?;
                if let Some(ty) = &var.ty {
                    write!(f, ": {}", ty)?;
                }
                if let Some(value) = &var.value {
                    write!(f, " = {}", value)?;
                }
                write!(f, ";")
            }
            Stmt::Call(call) => {
                write!(f, "{}(", call.callee)?;
                write_list(f, &call.args)?;
                write!(f, ");")
            }
            Stmt::Return { value: Some(v), .. } => write!(f, "return {};", v),
            Stmt::Return { value: None, .. } => write!(f, "return;"),
            Stmt::Throw { value, .. } => write!(f, "throw {};", value),
            Stmt::Error { .. } => write!(f, "<error>;"),
        }
    }
}

impl Display for Modifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            Modifier::Static => "static",
            Modifier::Abstract => "abstract",
            Modifier::Sealed => "sealed",
            Modifier::Override => "override",
            Modifier::Extern => "extern",
            Modifier::Operator => "operator",
            Modifier::Mutable => "mutable",
            Modifier::Public => "public",
            Modifier::Private => "private",
            Modifier::Protected => "protected",
            Modifier::Internal => "internal",
        };
        f.write_str(text)
    }
}

impl Display for FnDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_header(f, &self.annotations, &self.modifiers)?;
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
            if let Some(default) = &param.default {
                write!(f, " = {}", default)?;
            }
        }
        write!(f, ")")?;
        if let Some(ret) = &self.return_type {
            write!(f, " -> {}", ret)?;
        }
        match &self.body {
            None => write!(f, ";"),
            Some(body) => {
                writeln!(f, " {{")?;
                for stmt in body {
                    writeln!(f, "    {}", stmt)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Display for Decl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Decl::Fn(func) => write!(f, "{}", func),
            Decl::Type(ty) => {
                write_header(f, &ty.annotations, &ty.modifiers)?;
                let keyword = match ty.kind {
                    TypeKind::Class => "class",
                    TypeKind::Struct => "struct",
                    TypeKind::Interface => "interface",
                };
                write!(f, "{} {}", keyword, ty.name)?;
                if !ty.bases.is_empty() {
                    write!(f, " : ")?;
                    write_list(f, &ty.bases)?;
                }
                writeln!(f, " {{")?;
                for member in &ty.members {
                    let text = match member {
                        Member::Field(field) => {
                            let mut text = String::new();
                            for m in &field.modifiers {
                                write!(text, "{} ", m)?;
                            }
                            write!(text, "let {}: {}", field.name, field.ty)?;
                            if let Some(value) = &field.value {
                                write!(text, " = {}", value)?;
                            }
                            text.push(';');
                            text
                        }
                        Member::Method(method) => method.to_string(),
                        Member::Property(prop) => {
                            let mut text = format!("prop {}: {} {{", prop.name, prop.ty);
                            if prop.getter.is_some() {
                                text.push_str(" get;");
                            }
                            if let Some(setter) = &prop.setter {
                                for m in &setter.modifiers {
                                    write!(text, " {}", m)?;
                                }
                                text.push_str(" set;");
                            }
                            text.push_str(" }");
                            text
                        }
                        Member::Error { .. } => "<error>".to_string(),
                    };
                    for line in text.lines() {
                        writeln!(f, "    {}", line)?;
                    }
                }
                write!(f, "}}")
            }
            Decl::Enum(e) => {
                write_header(f, &e.annotations, &e.modifiers)?;
                write!(f, "enum {}", e.name)?;
                if let Some(underlying) = &e.underlying {
                    write!(f, " : {}", underlying)?;
                }
                writeln!(f, " {{")?;
                for member in &e.members {
                    match &member.value {
                        Some(value) => writeln!(f, "    {} = {},", member.name, value)?,
                        None => writeln!(f, "    {},", member.name)?,
                    }
                }
                write!(f, "}}")
            }
            Decl::TaggedUnion(u) => {
                write_header(f, &u.annotations, &u.modifiers)?;
                write!(f, "type {} =", u.name)?;
                for variant in &u.variants {
                    write!(f, " | {}(", variant.name)?;
                    for (i, field) in variant.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        if field.modifiers.contains(&Modifier::Mutable) {
                            write!(f, "mutable ")?;
                        }
                        write!(f, "{}: {}", field.name, field.ty)?;
                    }
                    write!(f, ")")?;
                }
                write!(f, ";")
            }
            Decl::Union(u) => {
                write_header(f, &u.annotations, &u.modifiers)?;
                writeln!(f, "union {} {{", u.name)?;
                for field in &u.fields {
                    match &field.offset {
                        Some(offset) => writeln!(f, "    {}: {} @ {},", field.name, field.ty, offset)?,
                        None => writeln!(f, "    {}: {},", field.name, field.ty)?,
                    }
                }
                write!(f, "}}")
            }
            Decl::Error { .. } => write!(f, "<error>"),
        }
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.module.is_empty() {
            writeln!(f, "module {};", self.module)?;
            writeln!(f)?;
        }
        for (i, decl) in self.body.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", decl)?;
        }
        Ok(())
    }
}

fn write_header(f: &mut Formatter<'_>, annotations: &[Annotation], modifiers: &[Modifier]) -> fmt::Result {
    for annotation in annotations {
        writeln!(f, "@{}", annotation.name)?;
    }
    for modifier in modifiers {
        write!(f, "{} ", modifier)?;
    }
    Ok(())
}

fn write_list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
