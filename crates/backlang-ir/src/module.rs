//! The output module: an insertion-ordered table of types.

use crate::platform;
use crate::types::{Field, FieldRef, Method, MethodRef, Origin, Primitive, TypeDef, TypeId};
use backlang_syntax::QualifiedName;
use std::collections::HashMap;
use std::fmt;

/// Append-only registry of every type known to a compilation
#[derive(Debug, Default)]
pub struct TypeTable {
    defs: Vec<TypeDef>,
    by_name: HashMap<QualifiedName, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `def`. A taken name yields the existing type as the error.
    pub fn insert(&mut self, def: TypeDef) -> Result<TypeId, TypeId> {
        if let Some(&existing) = self.by_name.get(&def.name) {
            return Err(existing);
        }
        let id = TypeId::new(self.defs.len());
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        Ok(id)
    }

    /// Exact lookup by qualified name
    pub fn lookup(&self, name: &QualifiedName) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// Platform type `System.<name>`
    pub fn system(&self, name: &str) -> Option<TypeId> {
        self.lookup(&platform::system_name(name))
    }

    /// Platform type for a primitive
    pub fn primitive(&self, primitive: Primitive) -> Option<TypeId> {
        self.system(platform::primitive_name(primitive))
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.defs[id.index()]
    }

    pub fn method(&self, m: MethodRef) -> &Method {
        &self.get(m.ty).methods[m.index]
    }

    pub fn method_mut(&mut self, m: MethodRef) -> &mut Method {
        &mut self.get_mut(m.ty).methods[m.index]
    }

    pub fn field(&self, f: FieldRef) -> &Field {
        &self.get(f.ty).fields[f.index]
    }

    /// Adds a method and returns its handle
    pub fn add_method(&mut self, ty: TypeId, method: Method) -> MethodRef {
        let methods = &mut self.get_mut(ty).methods;
        methods.push(method);
        MethodRef {
            ty,
            index: methods.len() - 1,
        }
    }

    /// Adds a field and returns its handle
    pub fn add_field(&mut self, ty: TypeId, field: Field) -> FieldRef {
        let fields = &mut self.get_mut(ty).fields;
        fields.push(field);
        FieldRef {
            ty,
            index: fields.len() - 1,
        }
    }

    /// First method of `ty` called `name` with `arity` parameters
    pub fn find_method(&self, ty: TypeId, name: &str, arity: usize) -> Option<MethodRef> {
        self.get(ty)
            .find_method(name)
            .find(|(_, m)| m.params.len() == arity)
            .map(|(index, _)| MethodRef { ty, index })
    }

    /// Walks the base chain looking for `ancestor`
    pub fn derives_from(&self, ty: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).base_class();
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.defs.iter().enumerate().map(|(i, d)| (TypeId::new(i), d))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Display name, `?` for unresolved references
    pub fn name_of(&self, ty: Option<TypeId>) -> String {
        ty.map(|id| self.get(id).name.to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Output module (assembly) under construction
#[derive(Debug)]
pub struct Assembly {
    pub name: String,
    pub types: TypeTable,
    pub entry_point: Option<MethodRef>,
}

impl Assembly {
    /// Creates an assembly with the platform library preloaded
    pub fn new(name: impl Into<String>) -> Self {
        let mut types = TypeTable::new();
        platform::install(&mut types);
        Self {
            name: name.into(),
            types,
            entry_point: None,
        }
    }

    /// Types declared by the program, in declaration order
    pub fn defined_types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types.iter().filter(|(_, t)| t.origin == Origin::Defined)
    }

    /// Looks up a type by dotted name
    pub fn find_type(&self, name: &str) -> Option<&TypeDef> {
        self.types
            .lookup(&QualifiedName::parse(name))
            .map(|id| self.types.get(id))
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = &self.types;
        writeln!(f, "; Assembly: {}", self.name)?;
        if let Some(entry) = self.entry_point {
            writeln!(f, "; Entry point: {}::{}", types.get(entry.ty).name, types.method(entry).name)?;
        }

        for (_, def) in self.defined_types() {
            writeln!(f)?;
            for attr in &def.attributes {
                writeln!(f, "[{}]", types.get(attr.ty).name)?;
            }
            let kind = if def.is_interface {
                "interface"
            } else if def.is_value_type {
                "struct"
            } else {
                "class"
            };
            write!(f, "{} {}", kind, def.name)?;
            if def.is_static {
                write!(f, " static")?;
            }
            if def.is_abstract {
                write!(f, " abstract")?;
            }
            if def.is_sealed {
                write!(f, " sealed")?;
            }
            if !def.bases.is_empty() {
                let bases: Vec<_> = def.bases.iter().map(|b| types.get(*b).name.to_string()).collect();
                write!(f, " : {}", bases.join(", "))?;
            }
            writeln!(f, " {{")?;

            for field in &def.fields {
                write!(f, "  field {}", field.visibility.as_str())?;
                if field.is_static {
                    write!(f, " static")?;
                }
                if field.is_mutable {
                    write!(f, " mutable")?;
                }
                write!(f, " {}: {}", field.name, types.name_of(field.ty))?;
                if let Some(value) = &field.initial_value {
                    write!(f, " = {}", value)?;
                }
                writeln!(f)?;
            }

            for prop in &def.properties {
                write!(f, "  property {} {}: {}", prop.visibility.as_str(), prop.name, types.name_of(prop.ty))?;
                if let Some(getter) = &prop.getter {
                    write!(f, " {} {}", getter.visibility.as_str(), getter.name)?;
                }
                if let Some(setter) = &prop.setter {
                    write!(f, " {} {}", setter.visibility.as_str(), setter.name)?;
                }
                writeln!(f)?;
            }

            for method in &def.methods {
                write_method(f, types, method)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

fn write_method(f: &mut fmt::Formatter<'_>, types: &TypeTable, method: &Method) -> fmt::Result {
    write!(f, "  method {}", method.visibility.as_str())?;
    if method.is_static {
        write!(f, " static")?;
    }
    write!(f, " {}(", method.name)?;
    for (i, param) in method.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", param.name, types.name_of(param.ty))?;
    }
    write!(f, ") -> {}", types.name_of(method.return_type))?;

    let Some(body) = &method.body else {
        return writeln!(f);
    };
    writeln!(f, " {{")?;
    for (block_id, block) in body.blocks() {
        write!(f, "  {}", block.name)?;
        if !block.params.is_empty() {
            let params: Vec<_> = block
                .params
                .iter()
                .map(|p| format!("{}: {}", p.name, types.name_of(p.ty)))
                .collect();
            write!(f, "({})", params.join(", "))?;
        }
        writeln!(f, ":")?;
        for (id, instr) in body.instructions_of(block_id) {
            writeln!(f, "    %{} = {}", id.index(), instr.display(types))?;
        }
        writeln!(f, "    {}", block.flow())?;
    }
    writeln!(f, "  }}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_rejects_taken_names() {
        let mut table = TypeTable::new();
        let name = QualifiedName::parse("Demo.Point");
        let first = table.insert(TypeDef::new(name.clone(), Origin::Defined)).unwrap();

        assert_eq!(table.insert(TypeDef::new(name.clone(), Origin::Defined)), Err(first));
        assert_eq!(table.lookup(&name), Some(first));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_assembly_lists_only_defined_types() {
        let mut assembly = Assembly::new("demo");
        let platform_count = assembly.types.len();
        assert!(platform_count > 0);
        assert_eq!(assembly.defined_types().count(), 0);

        let id = assembly
            .types
            .insert(TypeDef::new(QualifiedName::parse("Demo.Point"), Origin::Defined))
            .unwrap();
        let ids: Vec<_> = assembly.defined_types().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![id]);
    }

    #[test]
    fn test_derives_from() {
        let assembly = Assembly::new("demo");
        let types = &assembly.types;
        let exception = types.system("Exception").unwrap();
        let object = types.system("Object").unwrap();
        let string = types.system("String").unwrap();

        assert!(types.derives_from(exception, object));
        assert!(!types.derives_from(object, string));
    }
}
