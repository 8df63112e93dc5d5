//! Integration tests for the Backlang compiler
//!
//! This crate drives the complete pipeline end to end:
//! Trees → Declaration lowering → Body lowering → Emitter

use backlang_codegen::{CompileOptions, Target};
use backlang_driver::{Compilation, DriverError};
use backlang_ir::lower::{lower_bodies, lower_declarations, CompilationContext};
use backlang_ir::{FlowGraph, Method, TypeDef};
use backlang_syntax::{Decl, Tree};

/// Lowers both stages over `trees` into a fresh context
pub fn lower(trees: &[Tree]) -> CompilationContext {
    let mut ctx = CompilationContext::new("test");
    let queue = lower_declarations(&mut ctx, trees);
    lower_bodies(&mut ctx, queue);
    ctx
}

/// Lowers a single module named `Demo`
pub fn lower_module(body: Vec<Decl>) -> CompilationContext {
    lower(&[Tree::new("Demo", body)])
}

/// Runs the driver for `target` and returns the artifact
pub fn compile(trees: Vec<Tree>, target: Target) -> Result<Vec<u8>, DriverError> {
    let options = CompileOptions {
        output: "test".to_string(),
        target,
    };
    Compilation::new(trees, options).compile()
}

/// Asserts that lowering reported no diagnostics
pub fn assert_clean(ctx: &CompilationContext) {
    if !ctx.diagnostics.is_empty() {
        let messages: Vec<_> = ctx.diagnostics.iter().map(|d| d.message.clone()).collect();
        panic!("Expected no diagnostics, got:\n{}", messages.join("\n"));
    }
}

/// Looks up a type by dotted name, panicking with the IR dump when missing
pub fn find_type<'a>(ctx: &'a CompilationContext, name: &str) -> &'a TypeDef {
    match ctx.assembly.find_type(name) {
        Some(def) => def,
        None => panic!("type {} not found in:\n{}", name, ctx.assembly),
    }
}

/// First method called `name` on `def`
pub fn method<'a>(def: &'a TypeDef, name: &str) -> &'a Method {
    match def.methods.iter().find(|m| m.name == name) {
        Some(m) => m,
        None => panic!("method {} not found on {}", name, def.name),
    }
}

/// Lowered body of `method`
pub fn body(method: &Method) -> &FlowGraph {
    match &method.body {
        Some(body) => body,
        None => panic!("method {} has no body", method.name),
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use backlang_codegen::{Bs2kEmitter, CodeGen, DotnetEmitter};
    use backlang_error::ErrorCode;
    use backlang_ir::lower::{TypeResolver, PRIMITIVE_ALIASES};
    use backlang_ir::{platform, Argument, Constant, Flow, Instruction, Primitive};
    use backlang_syntax::{
        BinaryOperator, EnumDecl, Expr, FnDecl, QualifiedName, Stmt, TaggedUnionDecl, TypeDecl, TypeExpr, TypeKind,
        UnionDecl, Variant,
    };
    use pretty_assertions::assert_eq;

    fn main_with(body: Vec<Stmt>) -> Decl {
        Decl::Fn(FnDecl::new("main").with_body(body))
    }

    fn shape_union() -> Decl {
        Decl::TaggedUnion(
            TaggedUnionDecl::new("Shape")
                .variant(Variant::new("Circle").field("radius", TypeExpr::named("f64")))
                .variant(Variant::new("Square").field("side", TypeExpr::named("f64"))),
        )
    }

    // =========================================
    // Type resolution
    // =========================================

    #[test]
    fn test_aliases_resolve_to_platform_types() {
        let ctx = CompilationContext::new("aliases");
        let resolver = TypeResolver::new(ctx.types());
        let module = QualifiedName::parse("Demo");

        for (alias, target) in PRIMITIVE_ALIASES {
            let expected = ctx.types().lookup(&platform::system_name(target));
            let name = QualifiedName::parse(alias);
            let first = resolver.resolve_in_module(&module, &name);
            let second = resolver.resolve_in_module(&module, &name);

            assert!(first.is_some(), "alias {} did not resolve", alias);
            assert_eq!(first, expected, "alias {}", alias);
            assert_eq!(first, second, "alias {} is not idempotent", alias);
        }
    }

    #[test]
    fn test_module_local_and_qualified_lookup() {
        let geometry = Tree::new(
            "Geometry",
            vec![Decl::Type(
                TypeDecl::new(TypeKind::Struct, "Point").field("x", TypeExpr::named("i32")),
            )],
        );
        let app = Tree::new(
            "App",
            vec![main_with(vec![Stmt::var("p", Some(TypeExpr::named("Geometry.Point")), None)])],
        );
        let ctx = lower(&[app, geometry]);

        assert_clean(&ctx);
        let point = ctx.types().lookup(&QualifiedName::parse("Geometry.Point"));
        let main = method(find_type(&ctx, "Program"), "Main");
        let graph = body(main);
        assert_eq!(graph.block(graph.entry()).params[0].ty, point);
    }

    #[test]
    fn test_unresolved_type_is_reported_once() {
        let ctx = lower_module(vec![Decl::Fn(
            FnDecl::new("f").param("value", TypeExpr::named("Nowhere")).with_body(vec![]),
        )]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_TYPE), 1);
        let f = method(find_type(&ctx, "Program"), "f");
        assert_eq!(f.params[0].ty, None);
    }

    // =========================================
    // Declarations
    // =========================================

    #[test]
    fn test_enum_values() {
        let colors = EnumDecl::new("Color")
            .member("A", None)
            .member("B", Some(Expr::int(5)))
            .member("C", None);
        let ctx = lower_module(vec![Decl::Enum(colors)]);

        assert_clean(&ctx);
        let values: Vec<_> = find_type(&ctx, "Demo.Color")
            .fields
            .iter()
            .filter(|f| f.is_literal)
            .map(|f| (f.name.as_str(), f.initial_value.as_ref().and_then(Constant::as_i64)))
            .collect();
        assert_eq!(values, vec![("A", Some(0)), ("B", Some(5)), ("C", Some(6))]);
    }

    #[test]
    fn test_forward_reference_between_functions() {
        let f = FnDecl::new("f").with_body(vec![Stmt::call("g", vec![])]);
        let g = FnDecl::new("g").with_body(vec![]);
        let ctx = lower_module(vec![Decl::Fn(f), Decl::Fn(g)]);

        assert_clean(&ctx);
        let program = find_type(&ctx, "Program");
        let g_index = program.methods.iter().position(|m| m.name == "g").unwrap();
        let calls: Vec<_> = body(method(program, "f"))
            .instructions_of(body(method(program, "f")).entry())
            .filter_map(|(_, instr)| match instr {
                Instruction::Call { method, .. } => Some(method.index),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![g_index]);
    }

    #[test]
    fn test_forward_reference_across_trees() {
        let first = Tree::new("A", vec![main_with(vec![Stmt::call_qualified("B.Util", "run", vec![])])]);
        let util = TypeDecl::new(TypeKind::Class, "Util").method(
            FnDecl::new("run")
                .with_modifier(backlang_syntax::Modifier::Static)
                .with_body(vec![]),
        );
        let second = Tree::new("B", vec![Decl::Type(util)]);
        let ctx = lower(&[first, second]);

        assert_clean(&ctx);
    }

    #[test]
    fn test_duplicate_method() {
        let first = FnDecl::new("area").param("x", TypeExpr::named("f64")).with_body(vec![]);
        let second = FnDecl::new("area").param("other", TypeExpr::named("f64")).with_body(vec![]);
        let shape = TypeDecl::new(TypeKind::Class, "Shape").method(first).method(second);
        let ctx = lower_module(vec![Decl::Type(shape)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::DUPLICATE_DECLARATION), 1);
        let areas: Vec<_> = find_type(&ctx, "Demo.Shape")
            .methods
            .iter()
            .filter(|m| m.name == "area")
            .collect();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].params[0].name, "x");
    }

    #[test]
    fn test_sealed_inheritance() {
        let wrapper = TypeDecl::new(TypeKind::Struct, "Wrapper").base(TypeExpr::named("string"));
        let ctx = lower_module(vec![Decl::Type(wrapper)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::INVALID_INHERITANCE), 1);
        let def = find_type(&ctx, "Demo.Wrapper");
        let string = ctx.primitive(Primitive::String).unwrap();
        assert!(!def.bases.contains(&string));
        assert_eq!(def.bases, vec![ctx.types().system("ValueType").unwrap()]);
    }

    #[test]
    fn test_sealed_base_from_later_tree() {
        let app = Tree::new(
            "App",
            vec![Decl::Type(
                TypeDecl::new(TypeKind::Class, "Logger").base(TypeExpr::named("Core.Sink")),
            )],
        );
        let core = Tree::new(
            "Core",
            vec![Decl::Type(
                TypeDecl::new(TypeKind::Class, "Sink").with_modifier(backlang_syntax::Modifier::Sealed),
            )],
        );
        let ctx = lower(&[app, core]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::INVALID_INHERITANCE), 1);
        let sink = ctx.types().lookup(&QualifiedName::parse("Core.Sink")).unwrap();
        let logger = find_type(&ctx, "App.Logger");
        assert!(!logger.bases.contains(&sink));
        assert_eq!(logger.bases, vec![ctx.types().system("Object").unwrap()]);
    }

    #[test]
    fn test_tagged_union_constructors() {
        let ctx = lower_module(vec![shape_union()]);

        assert_clean(&ctx);
        let base = ctx.types().lookup(&QualifiedName::parse("Demo.Shape")).unwrap();
        assert!(ctx.types().get(base).is_abstract);

        for (variant, field) in [("Demo.Circle", "radius"), ("Demo.Square", "side")] {
            let def = find_type(&ctx, variant);
            assert_eq!(def.bases, vec![base]);
            assert_eq!(def.fields[0].name, field);

            let ctor = method(def, ".ctor");
            assert!(ctor.is_constructor);
            assert_eq!(ctor.visibility, backlang_ir::Visibility::Public);
            let params: Vec<_> = ctor.params.iter().map(|p| (p.name.as_str(), p.ty)).collect();
            assert_eq!(params, vec![(field, ctx.primitive(Primitive::F64))]);

            let graph = body(ctor);
            let stores: Vec<_> = graph
                .instructions_of(graph.entry())
                .filter_map(|(_, instr)| match instr {
                    Instruction::StoreField { field, value, .. } => Some((field.index, graph.instruction(*value).clone())),
                    _ => None,
                })
                .collect();
            assert_eq!(stores, vec![(0, Instruction::LoadArg(Argument::Param(0)))]);
        }
    }

    #[test]
    fn test_bit_layout_union() {
        let word = UnionDecl::new("Word")
            .field("low", TypeExpr::named("u16"), 0)
            .field("full", TypeExpr::named("u32"), 0)
            .field("high", TypeExpr::named("u16"), 2);
        let ctx = lower_module(vec![Decl::Union(word)]);

        assert_clean(&ctx);
        let def = find_type(&ctx, "Demo.Word");
        assert!(def.is_value_type);
        let offsets: Vec<_> = def
            .fields
            .iter()
            .map(|f| f.attributes[0].args[0].as_i64())
            .collect();
        assert_eq!(offsets, vec![Some(0), Some(0), Some(2)]);
    }

    #[test]
    fn test_lowering_is_deterministic() {
        let decls = || {
            vec![
                shape_union(),
                Decl::Enum(EnumDecl::new("Level").member("Low", None).member("High", Some(Expr::int(10)))),
                main_with(vec![
                    Stmt::var("x", None, Some(Expr::int(2))),
                    Stmt::call("print", vec![Expr::ident("x")]),
                ]),
            ]
        };

        let first = lower_module(decls());
        let second = lower_module(decls());

        assert_clean(&first);
        assert_eq!(first.assembly.to_string(), second.assembly.to_string());
        let names = |ctx: &CompilationContext| -> Vec<String> {
            ctx.assembly.defined_types().map(|(_, t)| t.name.to_string()).collect()
        };
        assert_eq!(names(&first), names(&second));
    }

    // =========================================
    // Bodies
    // =========================================

    #[test]
    fn test_throw_lowering() {
        let ctx = lower_module(vec![main_with(vec![
            Stmt::throw(Expr::string("boom")),
            Stmt::call("print", vec![Expr::string("never")]),
        ])]);

        assert_clean(&ctx);
        let graph = body(method(find_type(&ctx, "Program"), "Main"));
        let entry = graph.block(graph.entry());
        assert_eq!(entry.flow(), Flow::Unreachable);

        let last_two: Vec<_> = entry.instructions[entry.instructions.len() - 2..]
            .iter()
            .map(|id| graph.instruction(*id))
            .collect();
        let Instruction::Load { source, .. } = last_two[0] else {
            panic!("expected a load, got {:?}", last_two[0]);
        };
        assert_eq!(
            graph.instruction(*source),
            &Instruction::Constant {
                value: Constant::String("boom".into()),
                ty: ctx.primitive(Primitive::String),
            }
        );
        let Instruction::NewObject { ctor, .. } = last_two[1] else {
            panic!("expected an object construction, got {:?}", last_two[1]);
        };
        assert_eq!(Some(ctor.ty), ctx.types().system("Exception"));
    }

    #[test]
    fn test_unknown_function_is_not_called() {
        let ctx = lower_module(vec![main_with(vec![Stmt::call("missing", vec![])])]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_CALL), 1);
        let graph = body(method(find_type(&ctx, "Program"), "Main"));
        assert_eq!(graph.instruction_count(), 0);
    }

    #[test]
    fn test_unresolved_identifier_is_reported() {
        let ctx = lower_module(vec![Decl::Fn(
            FnDecl::new("f")
                .returns(TypeExpr::named("i32"))
                .with_body(vec![Stmt::ret(Some(Expr::ident("ghost")))]),
        )]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_NAME), 1);
        let graph = body(method(find_type(&ctx, "Program"), "f"));
        assert_eq!(graph.block(graph.entry()).flow(), Flow::Return(None));
    }

    #[test]
    fn test_arithmetic_uses_return_type() {
        let ctx = lower_module(vec![Decl::Fn(
            FnDecl::new("twice")
                .param("n", TypeExpr::named("i64"))
                .returns(TypeExpr::named("i64"))
                .with_body(vec![Stmt::ret(Some(Expr::binary(
                    BinaryOperator::Mul,
                    Expr::ident("n"),
                    Expr::int(2),
                )))]),
        )]);

        assert_clean(&ctx);
        let graph = body(method(find_type(&ctx, "Program"), "twice"));
        let i64_ty = ctx.primitive(Primitive::I64);
        let constant = graph
            .instructions_of(graph.entry())
            .find_map(|(_, instr)| match instr {
                Instruction::Constant { value, ty } => Some((value.clone(), *ty)),
                _ => None,
            });
        assert_eq!(constant, Some((Constant::integer(2, Some(Primitive::I64)), i64_ty)));
    }

    // =========================================
    // Emission
    // =========================================

    #[test]
    fn test_errors_prevent_emission() {
        let trees = vec![Tree::new("Demo", vec![main_with(vec![Stmt::call("missing", vec![])])])];

        let result = compile(trees, Target::Dotnet);
        assert!(matches!(result, Err(DriverError::Failed(1))));
    }

    #[test]
    fn test_both_targets_accept_the_same_ir() {
        let ctx = lower_module(vec![
            Decl::Enum(EnumDecl::new("Color").member("Red", None)),
            main_with(vec![Stmt::var(
                "greeting",
                Some(TypeExpr::named("string")),
                Some(Expr::string("hello")),
            )]),
        ]);
        assert_clean(&ctx);

        let dll = DotnetEmitter::new().generate(&ctx.assembly).unwrap();
        assert_eq!(&dll[..4], b"BLMO");

        let asm = Bs2kEmitter::new().generate(&ctx.assembly).unwrap();
        assert!(asm.contains("$Program.Main:"));
        assert!(asm.contains(".string \"hello\""));
    }

    #[test]
    fn test_emission_is_deterministic() {
        let build = || lower_module(vec![shape_union(), main_with(vec![Stmt::throw(Expr::string("x"))])]);

        let first = DotnetEmitter::new().generate(&build().assembly).unwrap();
        let second = DotnetEmitter::new().generate(&build().assembly).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_json_trees_compile_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let twice = FnDecl::new("twice")
            .param("n", TypeExpr::named("i32"))
            .returns(TypeExpr::named("i32"))
            .with_body(vec![Stmt::ret(Some(Expr::binary(
                BinaryOperator::Mul,
                Expr::ident("n"),
                Expr::int(2),
            )))]);
        let tree = Tree::new(
            "Demo",
            vec![main_with(vec![Stmt::call("twice", vec![Expr::int(7)])]), Decl::Fn(twice)],
        );
        let input = dir.path().join("main.json");
        std::fs::write(&input, serde_json::to_string(&tree).unwrap()).unwrap();

        let trees = backlang_driver::load_trees(&[&input]).unwrap();
        let options = CompileOptions {
            output: "app".to_string(),
            target: Target::Bs2k,
        };
        let path = Compilation::new(trees, options).compile_to(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("app.bsm"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("call $Program.twice$INT32"));
        assert!(text.contains("$Program.twice$INT32:"));
    }

    #[test]
    fn test_bs2k_rejects_platform_calls() {
        let trees = vec![Tree::new("Demo", vec![main_with(vec![Stmt::call("print", vec![Expr::int(7)])])])];

        let err = match compile(trees, Target::Bs2k) {
            Err(DriverError::Emit(err)) => err,
            other => panic!("expected an emission error, got {:?}", other),
        };
        assert!(err.to_string().starts_with("bs2k backend cannot emit"), "{}", err);
    }
}
