//! Per-compilation state shared by the lowering passes.

use super::resolve::{TypeResolver, PRIMITIVE_ALIASES};
use crate::module::{Assembly, TypeTable};
use crate::platform;
use crate::types::{Origin, Primitive, TypeDef, TypeId};
use backlang_error::{Diagnostic, Diagnostics, ErrorCode, Span};
use backlang_syntax::{QualifiedName, TypeExpr};
use tracing::trace;

/// The output module under construction plus accumulated diagnostics
#[derive(Debug)]
pub struct CompilationContext {
    pub assembly: Assembly,
    pub diagnostics: Diagnostics,
}

impl CompilationContext {
    pub fn new(assembly_name: impl Into<String>) -> Self {
        Self {
            assembly: Assembly::new(assembly_name),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.assembly.types
    }

    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.assembly.types
    }

    pub fn resolver(&self) -> TypeResolver<'_> {
        TypeResolver::new(&self.assembly.types)
    }

    /// Records an error attributed to `span`
    pub fn report(&mut self, code: ErrorCode, span: Span, message: impl Into<String>, label: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(message).with_code(code).with_label(span, label));
    }

    /// Platform type that must exist, such as `System.Int32`
    pub fn primitive(&self, primitive: Primitive) -> Option<TypeId> {
        self.assembly.types.primitive(primitive)
    }

    /// Resolves `name` from `module`, recording an unresolved-type error on failure
    pub fn resolve_type(&mut self, module: &QualifiedName, name: &QualifiedName, span: Span) -> Option<TypeId> {
        let found = self.resolver().resolve_in_module(module, name);
        if found.is_none() {
            let aliases: Vec<_> = PRIMITIVE_ALIASES.iter().map(|(alias, _)| *alias).collect();
            self.diagnostics.push(
                Diagnostic::error(format!("Type {} cannot be found", name))
                    .with_code(ErrorCode::UNRESOLVED_TYPE)
                    .with_label(span, "not a declared type or primitive alias")
                    .with_help(format!("primitive aliases are: {}", aliases.join(", "))),
            );
        }
        found
    }

    /// Resolves a type expression; function types become delegate instantiations
    pub fn resolve_type_expr(&mut self, module: &QualifiedName, ty: &TypeExpr) -> Option<TypeId> {
        match ty {
            TypeExpr::Named { name, span } => self.resolve_type(module, name, *span),
            TypeExpr::Function { params, ret, span } => {
                let mut args = Vec::with_capacity(params.len() + 1);
                for param in params {
                    args.push(self.resolve_type_expr(module, param));
                }
                let ret = match ret {
                    Some(ret) => Some(self.resolve_type_expr(module, ret)),
                    None => None,
                };
                let void = self.primitive(Primitive::Void);
                let family = match ret {
                    Some(r) if r != void => {
                        args.push(r);
                        "Func"
                    }
                    _ => "Action",
                };
                let args: Option<Vec<TypeId>> = args.into_iter().collect();
                let definition_name = QualifiedName::new([platform::SYSTEM.to_string(), format!("{}`{}", family, params.len() + usize::from(family == "Func"))]);
                let definition = self.resolve_type(&QualifiedName::global(), &definition_name, *span)?;
                self.instantiate(definition, args?)
            }
        }
    }

    /// Interned generic instantiation of `definition`
    fn instantiate(&mut self, definition: TypeId, args: Vec<TypeId>) -> Option<TypeId> {
        let types = &self.assembly.types;
        let generic = types.get(definition);
        let arg_names: Vec<_> = args.iter().map(|a| types.get(*a).name.to_string()).collect();
        let name = generic
            .name
            .with_name(format!("{}<{}>", generic.name.name(), arg_names.join(",")));

        if let Some(existing) = types.lookup(&name) {
            return Some(existing);
        }

        let mut def = TypeDef::new(name, Origin::External);
        def.bases = generic.bases.clone();
        def.is_sealed = true;
        def.generic_definition = Some(definition);
        def.generic_args = args;
        trace!(name = %def.name, "interned delegate instantiation");
        self.assembly.types.insert(def).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_type_is_recorded() {
        let mut ctx = CompilationContext::new("test");
        let module = QualifiedName::parse("Demo");

        assert_eq!(ctx.resolve_type(&module, &QualifiedName::parse("Missing"), Span::default()), None);
        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_TYPE), 1);

        assert!(ctx.resolve_type(&module, &QualifiedName::parse("f64"), Span::default()).is_some());
        assert_eq!(ctx.diagnostics.len(), 1);
    }

    #[test]
    fn test_function_types_are_interned() {
        let mut ctx = CompilationContext::new("test");
        let module = QualifiedName::global();
        let callback = TypeExpr::function(vec![TypeExpr::named("i32")], Some(TypeExpr::named("bool")));

        let first = ctx.resolve_type_expr(&module, &callback).unwrap();
        let second = ctx.resolve_type_expr(&module, &callback).unwrap();
        assert_eq!(first, second);

        let def = ctx.types().get(first);
        assert_eq!(def.name.to_string(), "System.Func`2<System.Int32,System.Boolean>");
        assert_eq!(def.generic_args.len(), 2);

        let action = TypeExpr::function(vec![], None);
        let id = ctx.resolve_type_expr(&module, &action).unwrap();
        assert_eq!(ctx.types().get(id).name.to_string(), "System.Action`0<>");
        assert!(ctx.diagnostics.is_empty());
    }
}
