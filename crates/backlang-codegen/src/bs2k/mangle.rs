//! Symbol names for bs2k labels
//!
//! `$` + the method's full path, then one `$`-prefixed segment per
//! parameter. `System` types mangle to their upper-case short name; every
//! other type mangles to an empty segment.
//!
//! Unlike the reference bs2k scheme, which prefixes only the qualifier path,
//! the owning type and method name are both part of the symbol so that
//! overloads on different types get distinct labels.

use backlang_ir::{platform, MethodRef, TypeId, TypeTable};

pub fn mangle(types: &TypeTable, method: MethodRef) -> String {
    let owner = types.get(method.ty);
    let m = types.method(method);

    let mut symbol = format!("${}", owner.name.child(&m.name));
    for param in &m.params {
        symbol.push('$');
        symbol.push_str(&mangle_type(types, param.ty));
    }
    symbol
}

fn mangle_type(types: &TypeTable, ty: Option<TypeId>) -> String {
    let Some(ty) = ty else {
        return String::new();
    };
    let name = &types.get(ty).name;
    if name.len() == 2 && name.segments()[0] == platform::SYSTEM {
        name.name().to_uppercase()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlang_ir::{Assembly, Method, Origin, Primitive, TypeDef};
    use backlang_syntax::QualifiedName;

    #[test]
    fn test_mangled_names() {
        let mut assembly = Assembly::new("vm");
        let types = &mut assembly.types;
        let point = types
            .insert(TypeDef::new(QualifiedName::parse("Demo.Point"), Origin::Defined))
            .unwrap();
        let int32 = types.primitive(Primitive::I32);

        let method = Method::new("move", None)
            .with_param("dx", int32)
            .with_param("target", Some(point))
            .with_param("dy", int32);
        let m = types.add_method(point, method);
        assert_eq!(mangle(types, m), "$Demo.Point.move$INT32$$INT32");

        let console = types.system("Console").unwrap();
        let write = types.find_method(console, "WriteLine", 0).unwrap();
        assert_eq!(mangle(types, write), "$System.Console.WriteLine");
    }
}
