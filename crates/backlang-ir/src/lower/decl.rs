//! Declaration lowering
//!
//! First pass: register a type entity for every type-like declaration of a
//! tree so that later declarations can refer to it. Second pass: fill in
//! bases, fields, methods, properties and attributes.

use super::context::CompilationContext;
use super::{BodyQueue, PendingBody};
use crate::constant::Constant;
use crate::flow::FlowGraph;
use crate::instruction::{Argument, Flow, Instruction};
use crate::platform;
use crate::types::{
    Attribute, AttributeTargets, Field, FieldRef, Method, MethodRef, Origin, Parameter, Primitive, Property,
    TypeDef, TypeId, Visibility,
};
use backlang_error::{Diagnostic, ErrorCode, Span, Spanned};
use backlang_syntax::{
    has_modifier, Annotation, Decl, EnumDecl, Expr, FieldDecl, FnDecl, Literal, Member, Modifier, PropertyDecl,
    QualifiedName, TaggedUnionDecl, Tree, TypeDecl, TypeExpr, TypeKind, UnionDecl,
};
use tracing::{debug, trace};

/// Name of the synthesized container for free functions
pub const PROGRAM_TYPE: &str = "Program";

/// Conventional entry point name; `main` is renamed to it
pub const ENTRY_POINT: &str = "Main";

/// Result of the first pass for one top-level declaration
#[derive(Debug, Clone)]
pub(crate) enum Declared {
    /// Nothing registered: free functions, duplicates and placeholders
    Nothing,
    Type(TypeId),
    TaggedUnion {
        base: TypeId,
        /// `None` where the variant name was already taken
        variants: Vec<Option<TypeId>>,
    },
}

/// First pass: registers the types declared by `tree`
pub(crate) fn declare(ctx: &mut CompilationContext, tree: &Tree) -> Vec<Declared> {
    let module = &tree.module;
    tree.body
        .iter()
        .map(|decl| match decl {
            Decl::Type(d) => {
                let mut def = TypeDef::new(module.child(&d.name), Origin::Defined);
                match d.kind {
                    TypeKind::Class => {}
                    TypeKind::Struct => def.is_value_type = true,
                    TypeKind::Interface => {
                        def.is_interface = true;
                        def.is_abstract = true;
                    }
                }
                // Flags are known before any base list is checked against them
                def.is_static = has_modifier(&d.modifiers, Modifier::Static);
                def.is_abstract |= has_modifier(&d.modifiers, Modifier::Abstract);
                def.is_sealed = has_modifier(&d.modifiers, Modifier::Sealed) || d.kind == TypeKind::Struct;
                declare_type(ctx, def, d.span)
            }
            Decl::Enum(d) => {
                let mut def = TypeDef::new(module.child(&d.name), Origin::Defined);
                def.is_value_type = true;
                def.is_sealed = true;
                declare_type(ctx, def, d.span)
            }
            Decl::Union(d) => {
                let mut def = TypeDef::new(module.child(&d.name), Origin::Defined);
                def.is_value_type = true;
                def.is_sealed = true;
                declare_type(ctx, def, d.span)
            }
            Decl::TaggedUnion(d) => {
                let mut def = TypeDef::new(module.child(&d.name), Origin::Defined);
                def.is_abstract = true;
                let Declared::Type(base) = declare_type(ctx, def, d.span) else {
                    return Declared::Nothing;
                };
                let variants = d
                    .variants
                    .iter()
                    .map(|variant| {
                        let mut def = TypeDef::new(module.child(&variant.name), Origin::Defined);
                        def.is_sealed = true;
                        match declare_type(ctx, def, variant.span) {
                            Declared::Type(id) => Some(id),
                            _ => None,
                        }
                    })
                    .collect();
                Declared::TaggedUnion { base, variants }
            }
            Decl::Fn(_) => Declared::Nothing,
            Decl::Error { span } => {
                ctx.report(
                    ErrorCode::MALFORMED_EXPRESSION,
                    *span,
                    "Malformed declaration",
                    "the parser could not recover this declaration",
                );
                Declared::Nothing
            }
        })
        .collect()
}

fn declare_type(ctx: &mut CompilationContext, mut def: TypeDef, span: Span) -> Declared {
    def.span = span;
    let name = def.name.clone();
    match ctx.types_mut().insert(def) {
        Ok(id) => {
            trace!(%name, "declared type");
            Declared::Type(id)
        }
        Err(existing) => {
            let first = ctx.types().get(existing).span;
            ctx.diagnostics.push(
                Diagnostic::error(format!("Type '{}' is already defined.", name))
                    .with_code(ErrorCode::DUPLICATE_DECLARATION)
                    .with_label(span, "redefined here")
                    .with_secondary_label(first, "first defined here"),
            );
            Declared::Nothing
        }
    }
}

/// Access modifier in `modifiers`, or `default`
fn visibility(modifiers: &[Modifier], default: Visibility) -> Visibility {
    modifiers
        .iter()
        .find_map(|m| match m {
            Modifier::Public => Some(Visibility::Public),
            Modifier::Private => Some(Visibility::Private),
            Modifier::Protected => Some(Visibility::Protected),
            Modifier::Internal => Some(Visibility::Internal),
            _ => None,
        })
        .unwrap_or(default)
}

/// Second pass over one tree
pub(crate) struct DeclLowerer<'a> {
    ctx: &'a mut CompilationContext,
    module: &'a QualifiedName,
    queue: &'a mut BodyQueue,
}

impl<'a> DeclLowerer<'a> {
    pub fn new(ctx: &'a mut CompilationContext, module: &'a QualifiedName, queue: &'a mut BodyQueue) -> Self {
        Self { ctx, module, queue }
    }

    /// Populates the entities registered for `tree` by [`declare`]
    pub fn populate(&mut self, tree: &Tree, declared: Vec<Declared>) {
        for (decl, declared) in tree.body.iter().zip(declared) {
            match (decl, declared) {
                (Decl::Type(d), Declared::Type(id)) => self.lower_type(id, d),
                (Decl::Enum(d), Declared::Type(id)) => self.lower_enum(id, d),
                (Decl::TaggedUnion(d), Declared::TaggedUnion { base, variants }) => {
                    self.lower_tagged_union(base, &variants, d)
                }
                (Decl::Union(d), Declared::Type(id)) => self.lower_bit_union(id, d),
                (Decl::Fn(d), _) => self.lower_function(d),
                _ => {}
            }
        }
    }

    fn resolve(&mut self, ty: &TypeExpr) -> Option<TypeId> {
        self.ctx.resolve_type_expr(self.module, ty)
    }

    fn system(&self, name: &str) -> Option<TypeId> {
        self.ctx.types().system(name)
    }

    /// Resolves the annotations and passes the applicable ones to `apply`.
    ///
    /// `Obsolete` resolves to `ObsoleteAttribute`. An attribute whose usage
    /// excludes `target` is reported and skipped.
    fn annotate(&mut self, annotations: &[Annotation], target: AttributeTargets, mut apply: impl FnMut(Attribute)) {
        for annotation in annotations {
            let name = if annotation.name.name().ends_with("Attribute") {
                annotation.name.clone()
            } else {
                annotation.name.with_name(format!("{}Attribute", annotation.name.name()))
            };
            let Some(ty) = self.ctx.resolve_type(self.module, &name, annotation.span) else {
                continue;
            };

            if let Some(usage) = self.ctx.types().get(ty).attribute_usage {
                if !usage.allows(target) {
                    self.ctx.report(
                        ErrorCode::INVALID_ATTRIBUTE_TARGET,
                        annotation.span,
                        format!("Cannot apply Attribute '{}' to this declaration", annotation.name),
                        "attribute usage does not allow this target",
                    );
                    continue;
                }
            }
            apply(Attribute::new(ty));
        }
    }

    fn special_name(&self) -> Option<Attribute> {
        let name = QualifiedName::new([platform::SYSTEM, "Runtime", "CompilerServices", "SpecialNameAttribute"]);
        self.ctx.types().lookup(&name).map(Attribute::new)
    }

    /// Literal initializer as a constant of type `ty`
    fn constant(&mut self, value: &Expr, ty: Option<TypeId>, what: &str) -> Option<Constant> {
        let Some(literal) = value.as_literal() else {
            self.ctx.report(
                ErrorCode::MALFORMED_EXPRESSION,
                value.span(),
                format!("{} must be a literal", what),
                "expected a literal value",
            );
            return None;
        };
        let constant = Constant::from_literal(literal);
        let primitive = ty.and_then(|id| self.ctx.types().get(id).primitive);
        Some(match primitive {
            Some(p) => constant.convert(p),
            None => constant,
        })
    }

    // ------------------------------------------------------------------------
    // Structs, classes and interfaces
    // ------------------------------------------------------------------------

    fn lower_type(&mut self, id: TypeId, decl: &TypeDecl) {
        let target = match decl.kind {
            TypeKind::Class => AttributeTargets::CLASS,
            TypeKind::Struct => AttributeTargets::STRUCT,
            TypeKind::Interface => AttributeTargets::INTERFACE,
        };

        let mut bases = Vec::new();
        if decl.kind == TypeKind::Struct {
            bases.extend(self.system("ValueType"));
        }
        for base in &decl.bases {
            let Some(base_id) = self.resolve(base) else {
                continue;
            };
            let base_def = self.ctx.types().get(base_id);
            if base_def.is_sealed {
                let message = format!("Cannot inherit from sealed Type {}", base_def.name);
                self.ctx.report(ErrorCode::INVALID_INHERITANCE, base.span(), message, "this type is sealed");
                continue;
            }
            if self.ctx.types().derives_from(base_id, id) {
                let message = format!("Circular inheritance between {} and {}", decl.name, base_def.name);
                self.ctx.report(
                    ErrorCode::INVALID_INHERITANCE,
                    base.span(),
                    message,
                    "this base derives from the type itself",
                );
                continue;
            }
            if bases.contains(&base_id) {
                continue;
            }
            bases.push(base_id);
        }
        if decl.kind == TypeKind::Class && bases.iter().all(|b| self.ctx.types().get(*b).is_interface) {
            // Class base goes first, interfaces after
            if let Some(object) = self.system("Object") {
                bases.insert(0, object);
            }
        }

        let mut attributes = Vec::new();
        self.annotate(&decl.annotations, target, |attr| attributes.push(attr));

        let def = self.ctx.types_mut().get_mut(id);
        def.bases = bases;
        def.attributes = attributes;
        def.visibility = visibility(&decl.modifiers, Visibility::Public);
        debug!(name = %def.name, "lowering type members");

        for member in &decl.members {
            match member {
                Member::Field(field) => {
                    self.lower_field(id, field);
                }
                Member::Method(method) => {
                    self.lower_method(id, method, &method.name, false);
                }
                Member::Property(property) => self.lower_property(id, property),
                Member::Error { span } => self.ctx.report(
                    ErrorCode::MALFORMED_EXPRESSION,
                    *span,
                    "Malformed member declaration",
                    "the parser could not recover this member",
                ),
            }
        }
    }

    fn lower_field(&mut self, owner: TypeId, decl: &FieldDecl) -> FieldRef {
        let ty = self.resolve(&decl.ty);
        let mut field = Field::new(&decl.name, ty);
        field.span = decl.span;
        field.visibility = visibility(&decl.modifiers, Visibility::Public);
        field.is_static = has_modifier(&decl.modifiers, Modifier::Static);
        field.is_mutable = has_modifier(&decl.modifiers, Modifier::Mutable);
        if let Some(value) = &decl.value {
            field.initial_value = self.constant(value, ty, "A field initializer");
        }
        self.annotate(&decl.annotations, AttributeTargets::FIELD, |attr| field.attributes.push(attr));
        self.ctx.types_mut().add_field(owner, field)
    }

    /// Registers a method signature and queues its body.
    ///
    /// Returns `None` when a method with the same signature already exists.
    fn lower_method(&mut self, owner: TypeId, decl: &FnDecl, name: &str, force_static: bool) -> Option<MethodRef> {
        let return_type = match &decl.return_type {
            Some(ty) => self.resolve(ty),
            None => self.ctx.primitive(Primitive::Void),
        };
        let in_interface = self.ctx.types().get(owner).is_interface;

        let mut method = Method::new(name, return_type);
        method.span = decl.span;
        method.visibility = visibility(&decl.modifiers, Visibility::Public);
        method.is_static = force_static || has_modifier(&decl.modifiers, Modifier::Static);
        method.is_override = has_modifier(&decl.modifiers, Modifier::Override);
        method.is_extern = has_modifier(&decl.modifiers, Modifier::Extern);
        method.is_abstract = in_interface || has_modifier(&decl.modifiers, Modifier::Abstract);
        method.is_constructor = name == ".ctor";
        method.is_destructor = name == ".dtor";

        for param in &decl.params {
            let ty = self.resolve(&param.ty);
            let default = match &param.default {
                Some(value) => self.constant(value, ty, "A parameter default"),
                None => None,
            };
            method.params.push(Parameter {
                name: param.name.clone(),
                ty,
                default,
            });
        }

        self.annotate(&decl.annotations, AttributeTargets::METHOD, |attr| method.attributes.push(attr));
        if has_modifier(&decl.modifiers, Modifier::Operator) {
            method.attributes.extend(self.special_name());
        }

        let existing = self.ctx.types().get(owner).methods.iter().find(|m| m.same_signature(&method));
        if let Some(first) = existing {
            let first = first.span;
            let owner_name = &self.ctx.types().get(owner).name;
            let message = format!("Function '{}.{}' is already defined.", owner_name, name);
            self.ctx.diagnostics.push(
                Diagnostic::error(message)
                    .with_code(ErrorCode::DUPLICATE_DECLARATION)
                    .with_label(decl.span, "redefined here")
                    .with_secondary_label(first, "first defined here"),
            );
            return None;
        }

        let method_ref = self.ctx.types_mut().add_method(owner, method);
        trace!(method = name, "registered method");
        if let Some(body) = &decl.body {
            self.queue.push(PendingBody {
                method: method_ref,
                module: self.module.clone(),
                body: body.clone(),
            });
        }
        Some(method_ref)
    }

    fn lower_property(&mut self, owner: TypeId, decl: &PropertyDecl) {
        let ty = self.resolve(&decl.ty);
        let void = self.ctx.primitive(Primitive::Void);
        let vis = visibility(&decl.modifiers, Visibility::Public);
        let is_static = has_modifier(&decl.modifiers, Modifier::Static);

        let getter = decl.getter.as_ref().map(|accessor| {
            let mut get = Method::new(format!("get_{}", decl.name), ty);
            get.visibility = visibility(&accessor.modifiers, vis);
            get.is_static = is_static;
            get.span = accessor.span;
            get
        });
        let setter = decl.setter.as_ref().map(|accessor| {
            let mut set = Method::new(format!("set_{}", decl.name), void).with_param("value", ty);
            set.visibility = visibility(&accessor.modifiers, Visibility::Private);
            set.is_static = is_static;
            set.span = accessor.span;
            set
        });

        let mut property = Property {
            name: decl.name.clone(),
            ty,
            visibility: vis,
            getter,
            setter,
            attributes: Vec::new(),
            span: decl.span,
        };
        self.annotate(&decl.annotations, AttributeTargets::PROPERTY, |attr| property.attributes.push(attr));
        self.ctx.types_mut().get_mut(owner).properties.push(property);
    }

    // ------------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------------

    fn lower_enum(&mut self, id: TypeId, decl: &EnumDecl) {
        let underlying = match &decl.underlying {
            Some(ty) => self.resolve(ty),
            None => self.ctx.primitive(Primitive::I32),
        };
        let underlying_primitive = underlying.and_then(|u| self.ctx.types().get(u).primitive);

        let mut attributes = Vec::new();
        self.annotate(&decl.annotations, AttributeTargets::ENUM, |attr| attributes.push(attr));
        let enum_base = self.system("Enum");
        let def = self.ctx.types_mut().get_mut(id);
        def.bases.extend(enum_base);
        def.attributes = attributes;
        def.visibility = visibility(&decl.modifiers, Visibility::Public);

        let mut counter: i128 = -1;
        for member in &decl.members {
            let explicit = member.value.as_ref().map(|value| {
                value
                    .as_literal()
                    .and_then(Literal::as_integer)
                    .ok_or_else(|| value.span())
            });
            counter = match explicit {
                Some(Ok(value)) => value.into(),
                Some(Err(span)) => {
                    self.ctx.report(
                        ErrorCode::MALFORMED_EXPRESSION,
                        span,
                        format!("Enum member '{}' needs an integer value", member.name),
                        "expected an integer literal",
                    );
                    counter + 1
                }
                None => counter + 1,
            };

            let primitive = match &member.ty {
                Some(ty) => self.resolve(ty).and_then(|t| self.ctx.types().get(t).primitive),
                None => underlying_primitive,
            };
            let mut field = Field::new(&member.name, Some(id));
            field.is_static = true;
            field.is_literal = true;
            field.initial_value = Some(Constant::integer(counter, primitive));
            field.span = member.span;
            self.ctx.types_mut().add_field(id, field);
        }

        let mut backing = Field::new("value__", underlying);
        backing.visibility = Visibility::Private;
        backing.is_mutable = true;
        backing.attributes.extend(self.special_name());
        backing.span = decl.span;
        self.ctx.types_mut().add_field(id, backing);
    }

    // ------------------------------------------------------------------------
    // Tagged unions
    // ------------------------------------------------------------------------

    fn lower_tagged_union(&mut self, base: TypeId, variants: &[Option<TypeId>], decl: &TaggedUnionDecl) {
        let object = self.system("Object");
        let object_ctor = object.and_then(|o| self.ctx.types().find_method(o, ".ctor", 0));
        let void = self.ctx.primitive(Primitive::Void);

        let mut attributes = Vec::new();
        self.annotate(&decl.annotations, AttributeTargets::CLASS, |attr| attributes.push(attr));
        let def = self.ctx.types_mut().get_mut(base);
        def.bases.extend(object);
        def.attributes = attributes;
        def.visibility = visibility(&decl.modifiers, Visibility::Public);

        for (variant, id) in decl.variants.iter().zip(variants) {
            let Some(id) = *id else {
                continue;
            };
            self.ctx.types_mut().get_mut(id).bases.push(base);

            let mut ctor = Method::new(".ctor", void);
            ctor.is_constructor = true;
            ctor.span = variant.span;
            let mut fields = Vec::with_capacity(variant.fields.len());
            for field_decl in &variant.fields {
                let ty = self.resolve(&field_decl.ty);
                let mut field = Field::new(&field_decl.name, ty);
                field.is_mutable = has_modifier(&field_decl.modifiers, Modifier::Mutable);
                field.span = field_decl.span;
                fields.push(self.ctx.types_mut().add_field(id, field));
                ctor.params.push(Parameter::new(&field_decl.name, ty));
            }

            // Parameters pair with fields by position
            let mut graph = FlowGraph::new();
            let entry = graph.entry();
            let this = graph.append(entry, Instruction::LoadArg(Argument::This));
            if let Some(object_ctor) = object_ctor {
                graph.append(
                    entry,
                    Instruction::Call {
                        method: object_ctor,
                        args: vec![this],
                    },
                );
            }
            for (index, field) in fields.into_iter().enumerate() {
                let value = graph.append(entry, Instruction::LoadArg(Argument::Param(index)));
                graph.append(
                    entry,
                    Instruction::StoreField {
                        field,
                        target: this,
                        value,
                    },
                );
            }
            graph.set_flow(entry, Flow::Return(None));
            ctor.body = Some(graph);

            self.ctx.types_mut().add_method(id, ctor);
            debug!(variant = %variant.name, "synthesized variant constructor");
        }
    }

    // ------------------------------------------------------------------------
    // Bit-layout unions
    // ------------------------------------------------------------------------

    fn lower_bit_union(&mut self, id: TypeId, decl: &UnionDecl) {
        let interop = QualifiedName::new([platform::SYSTEM, "Runtime", "InteropServices"]);
        let struct_layout = self.ctx.types().lookup(&interop.child("StructLayoutAttribute"));
        let field_offset = self.ctx.types().lookup(&interop.child("FieldOffsetAttribute"));

        let mut attributes: Vec<_> = struct_layout
            .map(|ty| Attribute::new(ty).with_arg(Constant::i32(platform::LAYOUT_EXPLICIT)))
            .into_iter()
            .collect();
        self.annotate(&decl.annotations, AttributeTargets::STRUCT, |attr| attributes.push(attr));
        let value_type = self.system("ValueType");
        let def = self.ctx.types_mut().get_mut(id);
        def.bases.extend(value_type);
        def.attributes = attributes;
        def.visibility = visibility(&decl.modifiers, Visibility::Public);

        for field_decl in &decl.fields {
            let offset = field_decl
                .offset
                .as_ref()
                .and_then(Expr::as_literal)
                .and_then(Literal::as_integer)
                .and_then(|o| i32::try_from(o).ok());
            let Some(offset) = offset else {
                self.ctx.report(
                    ErrorCode::MALFORMED_EXPRESSION,
                    field_decl.span,
                    format!("Field '{}' needs an explicit byte offset", field_decl.name),
                    "expected an integer offset literal",
                );
                continue;
            };

            let ty = self.resolve(&field_decl.ty);
            let mut field = Field::new(&field_decl.name, ty);
            field.is_mutable = true;
            field.span = field_decl.span;
            field
                .attributes
                .extend(field_offset.map(|ty| Attribute::new(ty).with_arg(Constant::i32(offset))));
            self.annotate(&field_decl.annotations, AttributeTargets::FIELD, |attr| field.attributes.push(attr));
            self.ctx.types_mut().add_field(id, field);
        }
    }

    // ------------------------------------------------------------------------
    // Free functions
    // ------------------------------------------------------------------------

    /// The global static container, created on first use
    fn program_type(&mut self) -> TypeId {
        let name = QualifiedName::global().child(PROGRAM_TYPE);
        if let Some(existing) = self.ctx.types().lookup(&name) {
            return existing;
        }

        let mut def = TypeDef::new(name, Origin::Defined);
        def.is_static = true;
        def.is_sealed = true;
        def.is_abstract = true;
        def.bases.extend(self.system("Object"));
        match self.ctx.types_mut().insert(def) {
            Ok(id) | Err(id) => id,
        }
    }

    fn lower_function(&mut self, decl: &FnDecl) {
        let container = self.program_type();
        let name = if decl.name == "main" { ENTRY_POINT } else { decl.name.as_str() };
        let Some(method) = self.lower_method(container, decl, name, true) else {
            return;
        };
        if name == ENTRY_POINT && self.ctx.assembly.entry_point.is_none() {
            debug!("registered entry point");
            self.ctx.assembly.entry_point = Some(method);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::lower_declarations;
    use backlang_syntax::Variant;
    use pretty_assertions::assert_eq;

    fn lower(body: Vec<Decl>) -> (CompilationContext, BodyQueue) {
        let mut ctx = CompilationContext::new("test");
        let queue = lower_declarations(&mut ctx, &[Tree::new("Demo", body)]);
        (ctx, queue)
    }

    fn enum_values(ctx: &CompilationContext, name: &str) -> Vec<(String, Option<i64>)> {
        let def = ctx.assembly.find_type(name).unwrap();
        def.fields
            .iter()
            .filter(|f| f.is_literal)
            .map(|f| (f.name.clone(), f.initial_value.as_ref().and_then(Constant::as_i64)))
            .collect()
    }

    #[test]
    fn test_enum_counter_resets_on_explicit_value() {
        let decl = EnumDecl::new("Color")
            .member("Red", None)
            .member("Green", Some(Expr::int(5)))
            .member("Blue", None);
        let (ctx, _) = lower(vec![Decl::Enum(decl)]);

        assert_eq!(
            enum_values(&ctx, "Demo.Color"),
            vec![
                ("Red".to_string(), Some(0)),
                ("Green".to_string(), Some(5)),
                ("Blue".to_string(), Some(6)),
            ]
        );

        let def = ctx.assembly.find_type("Demo.Color").unwrap();
        let backing = def.fields.last().unwrap();
        assert_eq!(backing.name, "value__");
        assert_eq!(backing.visibility, Visibility::Private);
        assert!(!backing.is_static);
        assert_eq!(backing.ty, ctx.primitive(Primitive::I32));
        assert_eq!(def.base_class(), ctx.types().system("Enum"));
    }

    #[test]
    fn test_enum_underlying_type() {
        let mut decl = EnumDecl::new("Small").member("A", None);
        decl.underlying = Some(TypeExpr::named("u8"));
        let (ctx, _) = lower(vec![Decl::Enum(decl)]);

        let def = ctx.assembly.find_type("Demo.Small").unwrap();
        assert_eq!(def.fields.last().unwrap().ty, ctx.primitive(Primitive::U8));
        assert_eq!(
            def.fields[0].initial_value,
            Some(Constant::Int {
                value: 0,
                bits: 8,
                signed: false
            })
        );
    }

    #[test]
    fn test_sealed_base_is_skipped() {
        let decl = TypeDecl::new(TypeKind::Struct, "Wrapper").base(TypeExpr::named("i32"));
        let (ctx, _) = lower(vec![Decl::Type(decl)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::INVALID_INHERITANCE), 1);
        let def = ctx.assembly.find_type("Demo.Wrapper").unwrap();
        assert_eq!(def.bases, vec![ctx.types().system("ValueType").unwrap()]);
    }

    #[test]
    fn test_sealed_base_declared_later() {
        let derived = TypeDecl::new(TypeKind::Class, "Derived").base(TypeExpr::named("Base"));
        let base = TypeDecl::new(TypeKind::Class, "Base").with_modifier(Modifier::Sealed);
        let holder = TypeDecl::new(TypeKind::Class, "Holder").base(TypeExpr::named("Point"));
        let point = TypeDecl::new(TypeKind::Struct, "Point");
        let (ctx, _) = lower(vec![
            Decl::Type(derived),
            Decl::Type(base),
            Decl::Type(holder),
            Decl::Type(point),
        ]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::INVALID_INHERITANCE), 2);
        let object = ctx.types().system("Object").unwrap();
        assert_eq!(ctx.assembly.find_type("Demo.Derived").unwrap().bases, vec![object]);
        assert_eq!(ctx.assembly.find_type("Demo.Holder").unwrap().bases, vec![object]);
        assert!(ctx.assembly.find_type("Demo.Base").unwrap().is_sealed);
    }

    #[test]
    fn test_circular_inheritance() {
        let a = TypeDecl::new(TypeKind::Class, "A").base(TypeExpr::named("B"));
        let b = TypeDecl::new(TypeKind::Class, "B").base(TypeExpr::named("A"));
        let (ctx, _) = lower(vec![Decl::Type(a), Decl::Type(b)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::INVALID_INHERITANCE), 1);
        let a = ctx.types().lookup(&QualifiedName::parse("Demo.A")).unwrap();
        let b = ctx.types().lookup(&QualifiedName::parse("Demo.B")).unwrap();
        assert!(ctx.types().derives_from(a, b));
        assert!(!ctx.types().derives_from(b, a));
    }

    #[test]
    fn test_duplicate_method_keeps_first() {
        let first = FnDecl::new("area").param("x", TypeExpr::named("f64"));
        let second = FnDecl::new("area").param("y", TypeExpr::named("f64"));
        let other = FnDecl::new("area").param("x", TypeExpr::named("i32"));
        let decl = TypeDecl::new(TypeKind::Class, "Shape").method(first).method(second).method(other);
        let (ctx, _) = lower(vec![Decl::Type(decl)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::DUPLICATE_DECLARATION), 1);
        let def = ctx.assembly.find_type("Demo.Shape").unwrap();
        let params: Vec<_> = def.methods.iter().map(|m| m.params[0].name.as_str()).collect();
        assert_eq!(params, vec!["x", "x"]);
    }

    #[test]
    fn test_duplicate_type_keeps_first() {
        let (ctx, _) = lower(vec![
            Decl::Type(TypeDecl::new(TypeKind::Class, "Point").field("x", TypeExpr::named("i32"))),
            Decl::Type(TypeDecl::new(TypeKind::Class, "Point")),
        ]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::DUPLICATE_DECLARATION), 1);
        assert_eq!(ctx.assembly.find_type("Demo.Point").unwrap().fields.len(), 1);
    }

    #[test]
    fn test_tagged_union_variants() {
        let decl = TaggedUnionDecl::new("Shape")
            .variant(Variant::new("Circle").field("radius", TypeExpr::named("f64")))
            .variant(Variant::new("Rect").field("w", TypeExpr::named("f64")).field("h", TypeExpr::named("f64")));
        let (ctx, _) = lower(vec![Decl::TaggedUnion(decl)]);

        let types = ctx.types();
        let base = types.lookup(&QualifiedName::parse("Demo.Shape")).unwrap();
        assert!(types.get(base).is_abstract);

        let rect = ctx.assembly.find_type("Demo.Rect").unwrap();
        assert_eq!(rect.bases, vec![base]);
        let ctor = &rect.methods[0];
        assert!(ctor.is_constructor);
        assert_eq!(ctor.visibility, Visibility::Public);
        let names: Vec<_> = ctor.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["w", "h"]);

        let body = ctor.body.as_ref().unwrap();
        let stores: Vec<_> = body
            .instructions_of(body.entry())
            .filter_map(|(_, instr)| match instr {
                Instruction::StoreField { field, .. } => Some(field.index),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![0, 1]);
        assert_eq!(body.block(body.entry()).flow(), Flow::Return(None));
    }

    #[test]
    fn test_bit_union_offsets() {
        let decl = UnionDecl::new("Word")
            .field("low", TypeExpr::named("u16"), 0)
            .field("high", TypeExpr::named("u16"), 2)
            .field("full", TypeExpr::named("u32"), 0);
        let (ctx, _) = lower(vec![Decl::Union(decl)]);

        let def = ctx.assembly.find_type("Demo.Word").unwrap();
        assert!(def.is_value_type);
        assert_eq!(def.attributes[0].args, vec![Constant::i32(platform::LAYOUT_EXPLICIT)]);
        let offsets: Vec<_> = def
            .fields
            .iter()
            .map(|f| f.attributes[0].args[0].as_i64().unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 2, 0]);
    }

    #[test]
    fn test_free_functions_share_program_container() {
        let main = FnDecl::new("main").with_body(vec![]);
        let helper = FnDecl::new("helper").with_body(vec![]);
        let (ctx, queue) = lower(vec![Decl::Fn(main), Decl::Fn(helper)]);

        let program = ctx.assembly.find_type(PROGRAM_TYPE).unwrap();
        assert!(program.is_static);
        let names: Vec<_> = program.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Main", "helper"]);
        assert!(program.methods.iter().all(|m| m.is_static));

        let entry = ctx.assembly.entry_point.unwrap();
        assert_eq!(ctx.types().method(entry).name, ENTRY_POINT);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_attribute_target_is_checked() {
        let decl = EnumDecl::new("Flags").member("A", None);
        let flags = Annotation {
            name: "Flags".into(),
            span: Span::default(),
        };
        let ok = Decl::Enum(EnumDecl {
            annotations: vec![flags],
            ..decl
        });
        let bad = Decl::Fn(FnDecl::new("f").annotated("Flags"));
        let (ctx, _) = lower(vec![ok, bad]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::INVALID_ATTRIBUTE_TARGET), 1);
        assert_eq!(ctx.assembly.find_type("Demo.Flags").unwrap().attributes.len(), 1);
        assert!(ctx.assembly.find_type(PROGRAM_TYPE).unwrap().methods[0].attributes.is_empty());
    }

    #[test]
    fn test_property_accessors() {
        let property = PropertyDecl {
            name: "Name".to_string(),
            ty: TypeExpr::named("string"),
            getter: Some(Default::default()),
            setter: Some(Default::default()),
            modifiers: Vec::new(),
            annotations: Vec::new(),
            span: Span::default(),
        };
        let decl = TypeDecl::new(TypeKind::Class, "Person").member(Member::Property(property));
        let (ctx, _) = lower(vec![Decl::Type(decl)]);

        let prop = &ctx.assembly.find_type("Demo.Person").unwrap().properties[0];
        let getter = prop.getter.as_ref().unwrap();
        let setter = prop.setter.as_ref().unwrap();
        assert_eq!((getter.name.as_str(), getter.visibility), ("get_Name", Visibility::Public));
        assert_eq!((setter.name.as_str(), setter.visibility), ("set_Name", Visibility::Private));
        assert_eq!(setter.params[0].name, "value");
    }

    #[test]
    fn test_operator_gets_special_name() {
        let op = FnDecl::new("op_Addition").with_modifier(Modifier::Operator);
        let decl = TypeDecl::new(TypeKind::Struct, "Vec2").method(op);
        let (ctx, _) = lower(vec![Decl::Type(decl)]);

        let method = &ctx.assembly.find_type("Demo.Vec2").unwrap().methods[0];
        let attr = ctx.types().get(method.attributes[0].ty);
        assert_eq!(attr.name.name(), "SpecialNameAttribute");
    }
}
