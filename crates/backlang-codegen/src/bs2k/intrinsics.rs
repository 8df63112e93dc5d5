//! Intrinsic catalogue for the bs2k target
//!
//! Intrinsics are static methods of an external `Intrinsics` type. User code
//! calls them like any qualified function (`Intrinsics::Push("R1")`) and the
//! emitter expands the call inline, keyed by name and arity.

use backlang_ir::{Constant, Method, MethodRef, Origin, Primitive, TypeDef, TypeTable};
use backlang_syntax::QualifiedName;

pub const INTRINSICS_TYPE: &str = "Intrinsics";

/// Name, then parameter names and types of every intrinsic overload
const CATALOGUE: &[(&str, &[(&str, Primitive)])] = &[
    ("Push", &[("register", Primitive::String)]),
    ("Push", &[("value", Primitive::I32)]),
    ("Push", &[("value", Primitive::Char)]),
    ("Copy", &[("target", Primitive::String), ("value", Primitive::I32)]),
    ("Copy", &[("target", Primitive::String), ("value", Primitive::Char)]),
];

/// Registers the `Intrinsics` type; installing twice is a no-op
pub fn install(types: &mut TypeTable) {
    let void = types.primitive(Primitive::Void);
    let mut def = TypeDef::new(QualifiedName::parse(INTRINSICS_TYPE), Origin::External);
    def.is_static = true;
    def.is_sealed = true;
    def.bases.extend(types.primitive(Primitive::Object));
    for (name, params) in CATALOGUE {
        let mut method = Method::new(*name, void).static_();
        for (param, ty) in params.iter() {
            method = method.with_param(*param, types.primitive(*ty));
        }
        def.methods.push(method);
    }
    let _ = types.insert(def);
}

pub fn is_intrinsic(types: &TypeTable, method: MethodRef) -> bool {
    let owner = &types.get(method.ty).name;
    owner.len() == 1 && owner.name() == INTRINSICS_TYPE
}

/// Assembly text for an intrinsic call with constant arguments
pub fn expand(name: &str, args: &[Constant]) -> Option<String> {
    match (name, args) {
        ("Push", [Constant::String(register)]) => Some(format!("push {}", register)),
        ("Push", [value]) => integer(value).map(|v| format!("copy {}, R0\npush R0", v)),
        ("Copy", [Constant::String(target), value]) => integer(value).map(|v| format!("copy {}, {}", target, v)),
        _ => None,
    }
}

/// Chars are pushed as their code point
fn integer(value: &Constant) -> Option<i64> {
    match value {
        Constant::Int { .. } | Constant::Char(_) => value.as_i64(),
        _ => None,
    }
}
