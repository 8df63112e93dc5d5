//! dotnet Backend - Generates the managed-object container
//!
//! Emission runs in two phases. [`ImageBuilder`] first numbers every
//! defined type, field and method so bodies can reference members declared
//! later, then builds the metadata rows and compiles the bodies.
//! [`Image::write_to`] serializes the finished tables.

mod body;
pub mod metadata;

use crate::{CodeGen, EmitError};
use backlang_ir::{
    platform, Assembly, Attribute, Constant, Field, FieldRef, Method, MethodRef, Primitive, Property, TypeDef, TypeId,
    TypeTable, Visibility,
};
use metadata::{
    constant_blob, constant_element, constant_payload, element, element_type, field_flags, method_flags, table,
    type_flags, AssemblyRef, ClassLayout, CustomAttributeRow, FieldRow, Image, MemberRefRow, MethodRow, ParamRow,
    PropertyRow, Token, TypeDefRow, TypeRefRow, PARAM_HAS_DEFAULT, SIG_FIELD, SIG_HAS_THIS, SIG_PROPERTY,
};
use std::collections::HashMap;
use tracing::{debug, info};

pub const CORE_LIBRARY: &str = "System.Private.CoreLib";
pub const CORE_LIBRARY_VERSION: [u16; 4] = [7, 0, 0, 0];
pub const TARGET_FRAMEWORK: &str = ".NETCoreApp,Version=v6.0";

/// Managed-object generation backend
#[derive(Debug, Default)]
pub struct DotnetEmitter;

impl DotnetEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Builds the metadata tables without serializing them
    pub fn build_image(&self, assembly: &Assembly) -> Result<Image, EmitError> {
        ImageBuilder::new(assembly).build()
    }
}

impl CodeGen for DotnetEmitter {
    type Output = Vec<u8>;

    fn generate(&self, assembly: &Assembly) -> Result<Vec<u8>, EmitError> {
        let image = self.build_image(assembly)?;
        let bytes = image.to_bytes()?;
        info!(assembly = %assembly.name, bytes = bytes.len(), "managed image written");
        Ok(bytes)
    }
}

/// Token allocation and row construction for one assembly
pub(crate) struct ImageBuilder<'a> {
    assembly: &'a Assembly,
    pub(crate) types: &'a TypeTable,
    type_defs: HashMap<TypeId, Token>,
    field_defs: HashMap<FieldRef, Token>,
    method_defs: HashMap<MethodRef, Token>,
    /// Row before the first property accessor of each type
    accessor_rows: HashMap<TypeId, u32>,
    type_refs: Vec<TypeRefRow>,
    type_ref_index: HashMap<TypeId, Token>,
    member_refs: Vec<MemberRefRow>,
    member_ref_index: HashMap<(Token, String, Vec<u8>), Token>,
    user_strings: Vec<String>,
    user_string_index: HashMap<String, Token>,
}

impl<'a> ImageBuilder<'a> {
    pub(crate) fn new(assembly: &'a Assembly) -> Self {
        let mut builder = Self {
            assembly,
            types: &assembly.types,
            type_defs: HashMap::new(),
            field_defs: HashMap::new(),
            method_defs: HashMap::new(),
            accessor_rows: HashMap::new(),
            type_refs: Vec::new(),
            type_ref_index: HashMap::new(),
            member_refs: Vec::new(),
            member_ref_index: HashMap::new(),
            user_strings: Vec::new(),
            user_string_index: HashMap::new(),
        };
        builder.number_definitions();
        builder
    }

    /// First phase: tokens for every defined type, field and method
    fn number_definitions(&mut self) {
        let (mut type_row, mut field_row, mut method_row) = (0, 0, 0);
        for (ty, def) in self.assembly.defined_types() {
            type_row += 1;
            self.type_defs.insert(ty, Token::new(table::TYPE_DEF, type_row));
            for index in 0..def.fields.len() {
                field_row += 1;
                self.field_defs
                    .insert(FieldRef { ty, index }, Token::new(table::FIELD, field_row));
            }
            for index in 0..def.methods.len() {
                method_row += 1;
                self.method_defs
                    .insert(MethodRef { ty, index }, Token::new(table::METHOD_DEF, method_row));
            }
            // property accessors follow the plain methods of their type
            self.accessor_rows.insert(ty, method_row);
            for property in &def.properties {
                method_row += u32::from(property.getter.is_some()) + u32::from(property.setter.is_some());
            }
        }
        debug!(types = type_row, fields = field_row, methods = method_row, "definitions numbered");
    }

    /// Second phase: metadata rows and method bodies
    fn build(mut self) -> Result<Image, EmitError> {
        let assembly = self.assembly;
        let mut attributes = Vec::new();
        if let Some(framework) = self.types.lookup(
            &platform::system_name("Runtime")
                .child("Versioning")
                .child("TargetFrameworkAttribute"),
        ) {
            let attr = Attribute::new(framework).with_arg(Constant::String(TARGET_FRAMEWORK.to_string()));
            attributes.push(self.custom_attribute(&attr)?);
        }

        let mut type_defs = Vec::new();
        for (ty, def) in assembly.defined_types() {
            debug!(ty = %def.name, "building type row");
            type_defs.push(self.type_def(ty, def)?);
        }

        let entry_point = match assembly.entry_point {
            Some(entry) => Some(self.method_token(entry)?),
            None => None,
        };

        Ok(Image {
            name: assembly.name.clone(),
            version: [1, 0, 0, 0],
            assembly_refs: vec![AssemblyRef {
                name: CORE_LIBRARY.to_string(),
                version: CORE_LIBRARY_VERSION,
            }],
            attributes,
            type_refs: self.type_refs,
            member_refs: self.member_refs,
            user_strings: self.user_strings,
            type_defs,
            entry_point,
        })
    }

    fn type_def(&mut self, ty: TypeId, def: &TypeDef) -> Result<TypeDefRow, EmitError> {
        let types = self.types;
        let value_type = types.system("ValueType");
        let base = def.base_class().filter(|b| !types.get(*b).is_interface);
        // types without a class base extend Object; interfaces extend nothing
        let extends = match base {
            Some(b) => Some(self.type_token(b)),
            None if def.is_interface => None,
            None => types.primitive(Primitive::Object).map(|object| self.type_token(object)),
        };
        let interfaces = def
            .bases
            .iter()
            .filter(|b| types.get(**b).is_interface)
            .map(|b| self.type_token(*b))
            .collect();

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            fields.push(self.field(def, field)?);
        }

        let mut methods = Vec::with_capacity(def.methods.len());
        for (index, method) in def.methods.iter().enumerate() {
            methods.push(self.method(MethodRef { ty, index }, method)?);
        }

        let mut next_row = self.accessor_rows.get(&ty).copied().unwrap_or_default();
        let mut properties = Vec::with_capacity(def.properties.len());
        for property in &def.properties {
            let mut next_token = |accessor: &Option<Method>| {
                accessor.as_ref().map(|_| {
                    next_row += 1;
                    Token::new(table::METHOD_DEF, next_row)
                })
            };
            let getter = next_token(&property.getter);
            let setter = next_token(&property.setter);
            for method in property.getter.iter().chain(property.setter.iter()) {
                methods.push(self.accessor(ty, method)?);
            }
            properties.push(self.property(property, getter, setter)?);
        }

        Ok(TypeDefRow {
            flags: self.type_flags(def),
            namespace: def.name.qualifier().to_string(),
            name: def.name.name().to_string(),
            extends,
            layout: (base.is_some() && base == value_type).then_some(ClassLayout { packing: 0, size: 1 }),
            interfaces,
            attributes: self.custom_attributes(&def.attributes)?,
            fields,
            methods,
            properties,
        })
    }

    fn type_flags(&self, def: &TypeDef) -> u32 {
        let mut flags = 0;
        if def.visibility == Visibility::Public {
            flags |= type_flags::PUBLIC;
        }
        if def.is_interface {
            flags |= type_flags::INTERFACE | type_flags::ABSTRACT;
        }
        if def.is_abstract || def.is_static {
            flags |= type_flags::ABSTRACT;
        }
        if def.is_sealed || def.is_static {
            flags |= type_flags::SEALED;
        }
        if def.is_value_type {
            let explicit = def.attributes.iter().any(|attr| {
                self.types.get(attr.ty).name.name() == "StructLayoutAttribute"
                    && attr.args.first().and_then(Constant::as_i64) == Some(i64::from(platform::LAYOUT_EXPLICIT))
            });
            flags |= if explicit {
                type_flags::EXPLICIT_LAYOUT
            } else {
                type_flags::SEQUENTIAL_LAYOUT
            };
        } else if !def.is_interface {
            flags |= type_flags::BEFORE_FIELD_INIT;
        }
        flags
    }

    fn field(&mut self, owner: &TypeDef, field: &Field) -> Result<FieldRow, EmitError> {
        let mut flags = match field.visibility {
            Visibility::Public => field_flags::PUBLIC,
            Visibility::Private => field_flags::PRIVATE,
            Visibility::Protected => field_flags::FAMILY,
            Visibility::Internal => field_flags::ASSEMBLY,
        };
        if field.is_static || field.is_literal {
            flags |= field_flags::STATIC;
        }
        if field.is_literal {
            flags |= field_flags::LITERAL;
        } else if !field.is_mutable {
            flags |= field_flags::INIT_ONLY;
        }
        if field.initial_value.is_some() {
            flags |= field_flags::HAS_DEFAULT;
        }
        if self.is_special_name(&field.attributes) {
            flags |= field_flags::SPECIAL_NAME | field_flags::RT_SPECIAL_NAME;
        }

        let what = format!("{}.{}", owner.name, field.name);
        let mut signature = vec![SIG_FIELD];
        self.encode_type(field.ty, &what, &mut signature)?;

        Ok(FieldRow {
            flags,
            name: field.name.clone(),
            signature,
            default: field.initial_value.as_ref().map(constant_blob),
            attributes: self.custom_attributes(&field.attributes)?,
        })
    }

    fn method(&mut self, method_ref: MethodRef, method: &Method) -> Result<MethodRow, EmitError> {
        let mut row = self.method_row(method_ref.ty, method)?;
        if let Some(graph) = &method.body {
            row.body = Some(body::compile(self, method_ref, graph)?);
        }
        Ok(row)
    }

    /// Property accessors carry no body of their own
    fn accessor(&mut self, owner: TypeId, method: &Method) -> Result<MethodRow, EmitError> {
        let mut row = self.method_row(owner, method)?;
        row.flags |= method_flags::SPECIAL_NAME;
        Ok(row)
    }

    fn method_row(&mut self, owner: TypeId, method: &Method) -> Result<MethodRow, EmitError> {
        // Every method is emitted public. Static is not forced: constructors
        // and instance methods load `this` as argument 0.
        let mut flags = method_flags::PUBLIC | method_flags::HIDE_BY_SIG;
        if method.is_static {
            flags |= method_flags::STATIC;
        }
        if method.is_constructor {
            flags |= method_flags::SPECIAL_NAME | method_flags::RT_SPECIAL_NAME;
        }
        if method.is_destructor || method.is_override {
            flags |= method_flags::VIRTUAL;
        }
        if method.is_abstract {
            flags |= method_flags::ABSTRACT | method_flags::VIRTUAL | method_flags::NEW_SLOT;
        }
        if method.is_extern {
            flags |= method_flags::PINVOKE_IMPL;
        }
        if self.is_special_name(&method.attributes) {
            flags |= method_flags::SPECIAL_NAME;
        }

        let mut params = Vec::with_capacity(method.params.len());
        for param in &method.params {
            params.push(ParamRow {
                name: param.name.clone(),
                flags: if param.default.is_some() { PARAM_HAS_DEFAULT } else { 0 },
                default: param.default.as_ref().map(constant_blob),
            });
        }

        Ok(MethodRow {
            flags,
            impl_flags: if method.is_extern {
                method_flags::IMPL_INTERNAL_CALL
            } else {
                method_flags::IMPL_IL
            },
            name: method.name.clone(),
            signature: self.method_signature(owner, method)?,
            params,
            attributes: self.custom_attributes(&method.attributes)?,
            body: None,
        })
    }

    fn property(&mut self, property: &Property, getter: Option<Token>, setter: Option<Token>) -> Result<PropertyRow, EmitError> {
        let mut signature = vec![SIG_PROPERTY | SIG_HAS_THIS, 0];
        self.encode_type(property.ty, &property.name, &mut signature)?;
        Ok(PropertyRow {
            name: property.name.clone(),
            signature,
            getter,
            setter,
            attributes: self.custom_attributes(&property.attributes)?,
        })
    }

    fn is_special_name(&self, attributes: &[Attribute]) -> bool {
        attributes
            .iter()
            .any(|attr| self.types.get(attr.ty).name.name() == "SpecialNameAttribute")
    }

    fn custom_attributes(&mut self, attributes: &[Attribute]) -> Result<Vec<CustomAttributeRow>, EmitError> {
        attributes.iter().map(|attr| self.custom_attribute(attr)).collect()
    }

    /// Blob: prolog `0x0001`, fixed arguments, no named arguments
    fn custom_attribute(&mut self, attr: &Attribute) -> Result<CustomAttributeRow, EmitError> {
        let ctor = match self.types.find_method(attr.ty, ".ctor", attr.args.len()) {
            Some(ctor) => self.method_token(ctor)?,
            None => {
                let mut signature = vec![SIG_HAS_THIS, attr.args.len() as u8, element::VOID];
                signature.extend(attr.args.iter().map(constant_element));
                let parent = self.type_token(attr.ty);
                self.member_ref(parent, ".ctor", signature)
            }
        };

        let mut value = 0x0001u16.to_le_bytes().to_vec();
        for arg in &attr.args {
            constant_payload(arg, &mut value);
        }
        value.extend_from_slice(&0u16.to_le_bytes());
        Ok(CustomAttributeRow { ctor, value })
    }

    /// TypeDef token for defined types, interned TypeRef otherwise
    pub(crate) fn type_token(&mut self, ty: TypeId) -> Token {
        if let Some(token) = self.type_defs.get(&ty) {
            return *token;
        }
        if let Some(token) = self.type_ref_index.get(&ty) {
            return *token;
        }
        let name = &self.types.get(ty).name;
        self.type_refs.push(TypeRefRow {
            scope: 1,
            namespace: name.qualifier().to_string(),
            name: name.name().to_string(),
        });
        let token = Token::new(table::TYPE_REF, self.type_refs.len() as u32);
        self.type_ref_index.insert(ty, token);
        token
    }

    fn member_ref(&mut self, parent: Token, name: &str, signature: Vec<u8>) -> Token {
        let key = (parent, name.to_string(), signature);
        if let Some(token) = self.member_ref_index.get(&key) {
            return *token;
        }
        self.member_refs.push(MemberRefRow {
            parent,
            name: key.1.clone(),
            signature: key.2.clone(),
        });
        let token = Token::new(table::MEMBER_REF, self.member_refs.len() as u32);
        self.member_ref_index.insert(key, token);
        token
    }

    /// MethodDef token for defined methods, MemberRef otherwise
    pub(crate) fn method_token(&mut self, method: MethodRef) -> Result<Token, EmitError> {
        if let Some(token) = self.method_defs.get(&method) {
            return Ok(*token);
        }
        let types = self.types;
        let callee = types.method(method);
        let signature = self.method_signature(method.ty, callee)?;
        let parent = self.type_token(method.ty);
        Ok(self.member_ref(parent, &callee.name, signature))
    }

    pub(crate) fn field_token(&mut self, field: FieldRef) -> Result<Token, EmitError> {
        if let Some(token) = self.field_defs.get(&field) {
            return Ok(*token);
        }
        let types = self.types;
        let def = types.field(field);
        let what = format!("{}.{}", types.get(field.ty).name, def.name);
        let mut signature = vec![SIG_FIELD];
        self.encode_type(def.ty, &what, &mut signature)?;
        let parent = self.type_token(field.ty);
        Ok(self.member_ref(parent, &def.name, signature))
    }

    pub(crate) fn user_string(&mut self, value: &str) -> Token {
        if let Some(token) = self.user_string_index.get(value) {
            return *token;
        }
        self.user_strings.push(value.to_string());
        let token = Token::new(table::USER_STRING, self.user_strings.len() as u32);
        self.user_string_index.insert(value.to_string(), token);
        token
    }

    fn method_signature(&mut self, owner: TypeId, method: &Method) -> Result<Vec<u8>, EmitError> {
        let what = format!("{}::{}", self.types.get(owner).name, method.name);
        let mut signature = vec![if method.is_static { 0 } else { SIG_HAS_THIS }, method.params.len() as u8];
        match method.return_type {
            Some(ret) => self.encode_type(Some(ret), &what, &mut signature)?,
            None if method.is_constructor || method.is_destructor => signature.push(element::VOID),
            None => return Err(EmitError::UnresolvedType(what)),
        }
        for param in &method.params {
            self.encode_type(param.ty, &format!("{} parameter {}", what, param.name), &mut signature)?;
        }
        Ok(signature)
    }

    /// Local variable signature of one slot
    pub(crate) fn type_signature(&mut self, ty: Option<TypeId>, what: &str) -> Result<Vec<u8>, EmitError> {
        let mut signature = Vec::with_capacity(5);
        self.encode_type(ty, what, &mut signature)?;
        Ok(signature)
    }

    fn encode_type(&mut self, ty: Option<TypeId>, what: &str, out: &mut Vec<u8>) -> Result<(), EmitError> {
        let ty = ty.ok_or_else(|| EmitError::UnresolvedType(what.to_string()))?;
        let def = self.types.get(ty);
        if let Some(element) = def.primitive.and_then(element_type) {
            out.push(element);
            return Ok(());
        }
        out.push(if def.is_value_type || def.primitive == Some(Primitive::F16) {
            element::VALUE_TYPE
        } else {
            element::CLASS
        });
        out.extend_from_slice(&self.type_token(ty).raw().to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlang_ir::lower::{lower_bodies, lower_declarations, CompilationContext};
    use backlang_syntax::{
        Decl, EnumDecl, Expr, FnDecl, Stmt, TaggedUnionDecl, Tree, TypeDecl, TypeExpr, TypeKind, Variant,
    };
    use pretty_assertions::assert_eq;

    fn image(body: Vec<Decl>) -> Image {
        let mut ctx = CompilationContext::new("demo");
        let queue = lower_declarations(&mut ctx, &[Tree::new("Demo", body)]);
        lower_bodies(&mut ctx, queue);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        DotnetEmitter::new().build_image(&ctx.assembly).unwrap()
    }

    #[test]
    fn test_header_and_references() {
        let image = image(vec![Decl::Fn(FnDecl::new("main").with_body(vec![]))]);
        let bytes = image.to_bytes().unwrap();

        assert_eq!(&bytes[..4], b"BLMO");
        assert_eq!(image.assembly_refs[0].name, CORE_LIBRARY);
        assert_eq!(image.assembly_refs[0].version, [7, 0, 0, 0]);
        assert_eq!(image.attributes.len(), 1);
        let mut tail = TARGET_FRAMEWORK.as_bytes().to_vec();
        tail.extend_from_slice(&[0, 0]);
        assert!(image.attributes[0].value.ends_with(&tail));
    }

    #[test]
    fn test_entry_point_token() {
        let image = image(vec![Decl::Fn(FnDecl::new("main").with_body(vec![]))]);

        let program = &image.type_defs[0];
        assert_eq!(program.name, "Program");
        assert_eq!(program.methods[0].name, "Main");
        assert_eq!(image.entry_point, Some(Token::new(table::METHOD_DEF, 1)));
        assert!(program.flags & type_flags::SEALED != 0);
        assert!(program.flags & type_flags::ABSTRACT != 0);
    }

    #[test]
    fn test_methods_are_public_and_keep_static() {
        let shape =
            TaggedUnionDecl::new("Shape").variant(Variant::new("Circle").field("radius", TypeExpr::named("f64")));
        let image = image(vec![Decl::TaggedUnion(shape), Decl::Fn(FnDecl::new("main").with_body(vec![]))]);

        let method = |ty: &str, name: &str| {
            let row = image.type_defs.iter().find(|t| t.name == ty).unwrap();
            row.methods.iter().find(|m| m.name == name).unwrap().flags
        };
        let ctor = method("Circle", ".ctor");
        assert!(ctor & method_flags::PUBLIC != 0);
        assert!(ctor & method_flags::STATIC == 0);
        assert!(ctor & method_flags::RT_SPECIAL_NAME != 0);

        let main = method("Program", "Main");
        assert!(main & method_flags::PUBLIC != 0);
        assert!(main & method_flags::STATIC != 0);
    }

    #[test]
    fn test_enum_fields() {
        let colors = EnumDecl::new("Color").member("Red", None).member("Green", Some(Expr::int(5)));
        let image = image(vec![Decl::Enum(colors)]);

        let color = &image.type_defs[0];
        assert_eq!(color.namespace, "Demo");
        let names: Vec<_> = color.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Red", "Green", "value__"]);
        assert_eq!(color.fields[1].default, Some(vec![element::I4, 5, 0, 0, 0]));
        assert!(color.fields[2].flags & field_flags::RT_SPECIAL_NAME != 0);
        assert!(color.layout.is_none());
    }

    #[test]
    fn test_struct_gets_class_layout() {
        let point = TypeDecl::new(TypeKind::Struct, "Point")
            .field("x", TypeExpr::named("i32"))
            .field("y", TypeExpr::named("i32"));
        let image = image(vec![Decl::Type(point)]);

        let row = &image.type_defs[0];
        assert_eq!(row.layout, Some(ClassLayout { packing: 0, size: 1 }));
        assert_eq!(row.fields[0].signature, vec![SIG_FIELD, element::I4]);
        assert!(row.flags & type_flags::SEQUENTIAL_LAYOUT != 0);
    }

    #[test]
    fn test_platform_calls_become_member_refs() {
        let main = FnDecl::new("main").with_body(vec![Stmt::call("print", vec![Expr::string("hi")])]);
        let image = image(vec![Decl::Fn(main)]);

        assert_eq!(image.user_strings, vec!["hi".to_string()]);
        let write = image.member_refs.iter().find(|r| r.name == "Write").unwrap();
        assert_eq!(write.signature, vec![0, 1, element::VOID, element::STRING]);
        let console = &image.type_refs[(write.parent.row() - 1) as usize];
        assert_eq!((console.namespace.as_str(), console.name.as_str()), ("System", "Console"));
    }

    #[test]
    fn test_unresolved_type_fails_emission() {
        let mut assembly = Assembly::new("broken");
        let program = assembly
            .types
            .insert(TypeDef::new(backlang_syntax::QualifiedName::parse("Program"), backlang_ir::Origin::Defined))
            .unwrap();
        assembly.types.add_method(program, Method::new("f", None));

        let result = DotnetEmitter::new().generate(&assembly);
        assert!(matches!(result, Err(EmitError::UnresolvedType(what)) if what == "Program::f"));
    }
}
