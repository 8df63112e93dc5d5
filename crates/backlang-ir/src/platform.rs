//! Platform library: the `System` types every compilation can reference.

use crate::constant::Constant;
use crate::module::TypeTable;
use crate::types::{AttributeTargets, Field, Method, Origin, Primitive, TypeDef, TypeId};
use backlang_syntax::QualifiedName;

pub const SYSTEM: &str = "System";

/// Layout kinds accepted by `StructLayoutAttribute`
pub const LAYOUT_SEQUENTIAL: i32 = 0;
pub const LAYOUT_EXPLICIT: i32 = 2;

pub fn system_name(name: &str) -> QualifiedName {
    QualifiedName::new([SYSTEM, name])
}

/// Short `System` name of a primitive
pub fn primitive_name(primitive: Primitive) -> &'static str {
    match primitive {
        Primitive::Void => "Void",
        Primitive::Bool => "Boolean",
        Primitive::Char => "Char",
        Primitive::I8 => "SByte",
        Primitive::U8 => "Byte",
        Primitive::I16 => "Int16",
        Primitive::U16 => "UInt16",
        Primitive::I32 => "Int32",
        Primitive::U32 => "UInt32",
        Primitive::I64 => "Int64",
        Primitive::U64 => "UInt64",
        Primitive::F16 => "Half",
        Primitive::F32 => "Single",
        Primitive::F64 => "Double",
        Primitive::String => "String",
        Primitive::Object => "Object",
    }
}

const PRIMITIVES: [Primitive; 16] = [
    Primitive::Object,
    Primitive::Void,
    Primitive::Bool,
    Primitive::Char,
    Primitive::I8,
    Primitive::U8,
    Primitive::I16,
    Primitive::U16,
    Primitive::I32,
    Primitive::U32,
    Primitive::I64,
    Primitive::U64,
    Primitive::F16,
    Primitive::F32,
    Primitive::F64,
    Primitive::String,
];

/// Overloads of `Console.Write` / `Console.WriteLine`
const CONSOLE_OVERLOADS: [Primitive; 10] = [
    Primitive::String,
    Primitive::Bool,
    Primitive::Char,
    Primitive::I32,
    Primitive::U32,
    Primitive::I64,
    Primitive::U64,
    Primitive::F32,
    Primitive::F64,
    Primitive::Object,
];

/// Highest delegate arity provided
pub const MAX_DELEGATE_PARAMS: usize = 4;

fn external(types: &mut TypeTable, name: QualifiedName, base: Option<TypeId>) -> TypeId {
    let mut def = TypeDef::new(name, Origin::External);
    def.bases.extend(base);
    insert(types, def)
}

fn insert(types: &mut TypeTable, def: TypeDef) -> TypeId {
    // Installed once into an empty table, so names never collide
    match types.insert(def) {
        Ok(id) | Err(id) => id,
    }
}

fn ctor(params: &[(&str, TypeId)]) -> Method {
    let mut method = Method::new(".ctor", None);
    method.is_constructor = true;
    for (name, ty) in params {
        method = method.with_param(*name, Some(*ty));
    }
    method
}

fn attribute(
    types: &mut TypeTable,
    name: QualifiedName,
    base: TypeId,
    usage: AttributeTargets,
    ctor_params: &[(&str, TypeId)],
) -> TypeId {
    let id = external(types, name, Some(base));
    let def = types.get_mut(id);
    def.is_sealed = true;
    def.attribute_usage = Some(usage);
    def.methods.push(ctor(ctor_params));
    id
}

/// Registers the platform library into an empty table
pub fn install(types: &mut TypeTable) {
    let mut object = None;
    let mut value_type = None;
    for primitive in PRIMITIVES {
        let base = if primitive == Primitive::Object {
            None
        } else if primitive.is_value_type() {
            value_type
        } else {
            object
        };
        let id = external(types, system_name(primitive_name(primitive)), base);
        let def = types.get_mut(id);
        def.primitive = Some(primitive);
        def.is_sealed = primitive != Primitive::Object;
        def.is_value_type = primitive.is_value_type();

        if primitive == Primitive::Object {
            object = Some(id);
            types.get_mut(id).methods.push(ctor(&[]));
            // ValueType must precede the value-type primitives
            let vt = external(types, system_name("ValueType"), object);
            types.get_mut(vt).is_abstract = true;
            value_type = Some(vt);
            let enum_base = external(types, system_name("Enum"), value_type);
            types.get_mut(enum_base).is_abstract = true;
        }
    }

    let (Some(object), Some(string), Some(int32)) = (
        object,
        types.primitive(Primitive::String),
        types.primitive(Primitive::I32),
    ) else {
        return;
    };

    let exception = external(types, system_name("Exception"), Some(object));
    types.get_mut(exception).methods.push(ctor(&[]));
    types.get_mut(exception).methods.push(ctor(&[("message", string)]));

    let console = external(types, system_name("Console"), Some(object));
    let void = types.primitive(Primitive::Void);
    let overloads: Vec<_> = CONSOLE_OVERLOADS
        .iter()
        .filter_map(|p| types.primitive(*p))
        .collect();
    let def = types.get_mut(console);
    def.is_static = true;
    def.is_sealed = true;
    for name in ["Write", "WriteLine"] {
        for ty in &overloads {
            def.methods.push(Method::new(name, void).with_param("value", Some(*ty)).static_());
        }
    }
    def.methods.push(Method::new("WriteLine", void).static_());

    for arity in 0..=MAX_DELEGATE_PARAMS {
        let action = external(types, system_name(&format!("Action`{}", arity)), Some(object));
        let func = external(types, system_name(&format!("Func`{}", arity + 1)), Some(object));
        for (id, generic_arity) in [(action, arity), (func, arity + 1)] {
            let def = types.get_mut(id);
            def.is_sealed = true;
            def.generic_arity = generic_arity;
        }
    }

    let attribute_base = external(types, system_name("Attribute"), Some(object));
    types.get_mut(attribute_base).is_abstract = true;

    let class_like = AttributeTargets::CLASS | AttributeTargets::STRUCT;
    attribute(types, system_name("AttributeUsageAttribute"), attribute_base, AttributeTargets::CLASS, &[]);
    attribute(types, system_name("ObsoleteAttribute"), attribute_base, AttributeTargets::ALL, &[]);
    attribute(types, system_name("FlagsAttribute"), attribute_base, AttributeTargets::ENUM, &[]);

    let interop = QualifiedName::new([SYSTEM, "Runtime", "InteropServices"]);
    let enum_base = types.system("Enum");
    let layout_kind = external(types, interop.child("LayoutKind"), enum_base);
    let def = types.get_mut(layout_kind);
    def.is_sealed = true;
    def.is_value_type = true;
    for (name, value) in [("Sequential", LAYOUT_SEQUENTIAL), ("Explicit", LAYOUT_EXPLICIT), ("Auto", 3)] {
        let mut field = Field::new(name, Some(layout_kind));
        field.is_static = true;
        field.is_literal = true;
        field.initial_value = Some(Constant::i32(value));
        def.fields.push(field);
    }
    attribute(
        types,
        interop.child("StructLayoutAttribute"),
        attribute_base,
        class_like,
        &[("layoutKind", layout_kind)],
    );
    attribute(
        types,
        interop.child("FieldOffsetAttribute"),
        attribute_base,
        AttributeTargets::FIELD,
        &[("offset", int32)],
    );

    let compiler_services = QualifiedName::new([SYSTEM, "Runtime", "CompilerServices"]);
    attribute(
        types,
        compiler_services.child("SpecialNameAttribute"),
        attribute_base,
        AttributeTargets::ALL,
        &[],
    );

    let versioning = QualifiedName::new([SYSTEM, "Runtime", "Versioning"]);
    attribute(
        types,
        versioning.child("TargetFrameworkAttribute"),
        attribute_base,
        AttributeTargets::ALL,
        &[("frameworkName", string)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_registered() {
        let mut types = TypeTable::new();
        install(&mut types);

        for primitive in PRIMITIVES {
            let id = types.primitive(primitive).unwrap();
            assert_eq!(types.get(id).primitive, Some(primitive));
        }
        let int32 = types.primitive(Primitive::I32).unwrap();
        assert!(types.get(int32).is_sealed);
        assert_eq!(types.get(int32).base_class(), types.system("ValueType"));
    }

    #[test]
    fn test_console_has_string_overload() {
        let mut types = TypeTable::new();
        install(&mut types);

        let console = types.system("Console").unwrap();
        let string = types.primitive(Primitive::String);
        let write = types
            .get(console)
            .find_method("Write")
            .find(|(_, m)| m.params[0].ty == string);
        assert!(write.is_some());
        assert!(types.get(console).methods.iter().all(|m| m.is_static));
    }

    #[test]
    fn test_attribute_usage() {
        let mut types = TypeTable::new();
        install(&mut types);

        let offset = types
            .lookup(&QualifiedName::parse("System.Runtime.InteropServices.FieldOffsetAttribute"))
            .unwrap();
        let usage = types.get(offset).attribute_usage.unwrap();
        assert!(usage.allows(AttributeTargets::FIELD));
        assert!(!usage.allows(AttributeTargets::METHOD));
        assert_eq!(types.find_method(offset, ".ctor", 1).map(|m| m.index), Some(0));
    }
}
