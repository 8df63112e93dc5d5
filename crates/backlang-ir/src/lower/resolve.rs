//! Type resolution
//!
//! A name `N` referenced from module `M` resolves, in order, to:
//! 1. `N` exactly as written
//! 2. `M.N`
//! 3. the platform type behind a primitive alias (`i32`, `string`, ...) or,
//!    for a bare name, `System.N`
//!
//! The resolver only reads the table. Recording failures is up to the
//! [`CompilationContext`](super::CompilationContext).

use crate::module::TypeTable;
use crate::platform;
use crate::types::TypeId;
use backlang_syntax::QualifiedName;

/// Primitive spellings and the `System` types they stand for
pub static PRIMITIVE_ALIASES: &[(&str, &str)] = &[
    ("obj", "Object"),
    ("bool", "Boolean"),
    ("i8", "SByte"),
    ("i16", "Int16"),
    ("i32", "Int32"),
    ("i64", "Int64"),
    ("u8", "Byte"),
    ("u16", "UInt16"),
    ("u32", "UInt32"),
    ("u64", "UInt64"),
    ("f16", "Half"),
    ("f32", "Single"),
    ("f64", "Double"),
    ("char", "Char"),
    ("string", "String"),
    ("none", "Void"),
];

/// Platform name behind an alias
pub fn alias_target(alias: &str) -> Option<&'static str> {
    PRIMITIVE_ALIASES
        .iter()
        .find(|(spelling, _)| *spelling == alias)
        .map(|(_, target)| *target)
}

/// Read-only view over a [`TypeTable`]
#[derive(Clone, Copy)]
pub struct TypeResolver<'a> {
    types: &'a TypeTable,
}

impl<'a> TypeResolver<'a> {
    pub fn new(types: &'a TypeTable) -> Self {
        Self { types }
    }

    /// Exact name, then the alias / `System` fallback
    pub fn resolve(&self, name: &QualifiedName) -> Option<TypeId> {
        self.types.lookup(name).or_else(|| self.resolve_platform(name))
    }

    /// Exact name, then module-local, then the alias / `System` fallback
    pub fn resolve_in_module(&self, module: &QualifiedName, name: &QualifiedName) -> Option<TypeId> {
        self.types
            .lookup(name)
            .or_else(|| self.types.lookup(&name.qualify(module)))
            .or_else(|| self.resolve_platform(name))
    }

    fn resolve_platform(&self, name: &QualifiedName) -> Option<TypeId> {
        if name.len() != 1 {
            return None;
        }
        let short = alias_target(name.name()).unwrap_or(name.name());
        self.types.lookup(&platform::system_name(short))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Assembly;
    use crate::types::{Origin, TypeDef};

    #[test]
    fn test_every_alias_resolves_and_is_stable() {
        let assembly = Assembly::new("aliases");
        let resolver = TypeResolver::new(&assembly.types);

        for (alias, target) in PRIMITIVE_ALIASES {
            let name = QualifiedName::parse(alias);
            let first = resolver.resolve(&name).unwrap();
            let second = resolver.resolve(&name).unwrap();

            assert_eq!(first, second);
            assert_eq!(assembly.types.get(first).name, platform::system_name(target));
        }
    }

    #[test]
    fn test_module_local_lookup() {
        let mut assembly = Assembly::new("modules");
        let point = assembly
            .types
            .insert(TypeDef::new(QualifiedName::parse("Geo.Point"), Origin::Defined))
            .unwrap();
        let resolver = TypeResolver::new(&assembly.types);

        let module = QualifiedName::parse("Geo");
        let short = QualifiedName::parse("Point");
        assert_eq!(resolver.resolve_in_module(&module, &short), Some(point));
        assert_eq!(resolver.resolve(&short), None);
        assert_eq!(resolver.resolve(&QualifiedName::parse("Geo.Point")), Some(point));
    }

    #[test]
    fn test_bare_platform_names() {
        let assembly = Assembly::new("platform");
        let resolver = TypeResolver::new(&assembly.types);

        let exception = resolver.resolve(&QualifiedName::parse("Exception")).unwrap();
        assert_eq!(assembly.types.get(exception).name.to_string(), "System.Exception");
        assert_eq!(resolver.resolve(&QualifiedName::parse("Nope")), None);
        assert_eq!(resolver.resolve(&QualifiedName::parse("Demo.i32")), None);
    }
}
