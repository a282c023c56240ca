//! The public API of a jar, as seen from Python.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::classfile::{
    ACC_ANNOTATION, ACC_BRIDGE, ACC_ENUM, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC,
    ACC_VARARGS, ClassFile, MemberInfo,
};
use crate::pytypes::is_python_identifier;
use crate::signature::{
    ClassType, JavaType, MethodSignature, TypeParam, internal_to_binary, parse_class_signature,
    parse_field_descriptor, parse_field_signature, parse_method_descriptor,
    parse_method_signature,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaParam {
    pub name: Option<String>,
    pub ty: JavaType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaMethod {
    /// `<init>` for constructors.
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<JavaParam>,
    pub ret: JavaType,
    pub is_static: bool,
    pub is_varargs: bool,
    pub javadoc: Option<String>,
}

impl JavaMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn simple_param_types(&self) -> Vec<String> {
        self.params.iter().map(|p| p.ty.simple_name()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaField {
    pub name: String,
    pub ty: JavaType,
    pub is_static: bool,
    pub javadoc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaClass {
    /// Binary name, `org.example.Outer$Inner`.
    pub name: String,
    pub package: String,
    pub simple_name: String,
    /// Binary name of the declaring class for nested classes.
    pub declaring_class: Option<String>,
    pub kind: ClassKind,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<ClassType>,
    pub interfaces: Vec<ClassType>,
    pub fields: Vec<JavaField>,
    pub methods: Vec<JavaMethod>,
    pub nested: Vec<JavaClass>,
    pub javadoc: Option<String>,
}

impl JavaClass {
    /// Builds the Python-visible view of a class, or `None` when the class is
    /// not reachable from Python (non-public, synthetic, anonymous, local) or
    /// its name is not a Python identifier (`$Proxy`, Scala's `Foo$`).
    pub fn from_class_file(cf: &ClassFile) -> anyhow::Result<Option<Self>> {
        let name = internal_to_binary(&cf.this_class);
        if name.ends_with("module-info") || name.ends_with("package-info") {
            return Ok(None);
        }

        let (access, declaring_class, simple_name) = match cf.own_inner_entry() {
            Some(entry) => {
                // anonymous or local
                let (Some(outer), Some(simple)) = (&entry.outer, &entry.simple_name) else {
                    return Ok(None);
                };
                (entry.access, Some(internal_to_binary(outer)), simple.clone())
            }
            None => {
                let simple = name.rsplit('.').next().unwrap_or(&name).to_string();
                (cf.access, None, simple)
            }
        };
        if access & ACC_PUBLIC == 0 || access & ACC_SYNTHETIC != 0 || cf.has(ACC_SYNTHETIC) {
            return Ok(None);
        }
        if simple_name.contains('$') || !is_python_identifier(&simple_name) {
            return Ok(None);
        }

        let package = match name.rfind('.') {
            Some(i) => name[..i].to_string(),
            None => String::new(),
        };

        let superclass_name = cf.super_class.as_deref().map(internal_to_binary);
        let kind = if cf.has(ACC_ANNOTATION) {
            ClassKind::Annotation
        } else if cf.has(ACC_INTERFACE) {
            ClassKind::Interface
        } else if cf.has(ACC_ENUM) {
            ClassKind::Enum
        } else {
            ClassKind::Class
        };

        let (type_params, superclass, interfaces) = match cf.signature.as_deref() {
            Some(raw) => {
                let sig = parse_class_signature(raw)?;
                (sig.type_params, Some(sig.superclass), sig.interfaces)
            }
            None => (
                Vec::new(),
                superclass_name.map(ClassType::raw),
                cf.interfaces
                    .iter()
                    .map(|i| ClassType::raw(internal_to_binary(i)))
                    .collect(),
            ),
        };
        // interfaces report java.lang.Object as their super class
        let superclass = superclass.filter(|_| kind != ClassKind::Interface && kind != ClassKind::Annotation);

        let mut fields = Vec::new();
        for f in cf.fields.iter().filter(|f| is_visible(f)) {
            let ty = match f.signature.as_deref() {
                Some(sig) => parse_field_signature(sig).or_else(|_| parse_field_descriptor(&f.descriptor))?,
                None => parse_field_descriptor(&f.descriptor)?,
            };
            fields.push(JavaField {
                name: f.name.clone(),
                ty,
                is_static: f.has(ACC_STATIC),
                javadoc: None,
            });
        }

        let is_inner_instance = declaring_class.is_some() && access & ACC_STATIC == 0;
        let mut methods = Vec::new();
        for m in cf.methods.iter().filter(|m| is_visible(m)) {
            if m.name == "<clinit>" || m.has(ACC_BRIDGE) {
                continue;
            }
            methods.push(build_method(m, is_inner_instance.then_some(declaring_class.as_deref()).flatten())?);
        }

        Ok(Some(Self {
            name,
            package,
            simple_name,
            declaring_class,
            kind,
            type_params,
            superclass,
            interfaces,
            fields,
            methods,
            nested: Vec::new(),
            javadoc: None,
        }))
    }

    /// Python attribute path inside its module, `Outer.Inner`.
    pub fn python_path(&self) -> String {
        let local = match self.name.strip_prefix(&self.package) {
            Some(rest) => rest.trim_start_matches('.'),
            None => &self.name,
        };
        local.replace('$', ".")
    }

    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut JavaClass)) {
        f(self);
        for n in &mut self.nested {
            n.visit_mut(f);
        }
    }
}

fn is_visible(m: &MemberInfo) -> bool {
    m.has(ACC_PUBLIC) && !m.has(ACC_SYNTHETIC)
}

fn build_method(m: &MemberInfo, outer_instance: Option<&str>) -> anyhow::Result<JavaMethod> {
    let erased = parse_method_descriptor(&m.descriptor)?;
    let generic: Option<MethodSignature> = m
        .signature
        .as_deref()
        .and_then(|s| parse_method_signature(s).ok());

    let mut erased_params = erased.params.clone();
    // non-static inner class constructors take the enclosing instance first
    if m.name == "<init>"
        && let Some(outer) = outer_instance
        && matches!(erased_params.first(), Some(JavaType::Class(c)) if c.name == outer)
    {
        erased_params.remove(0);
    }

    let (type_params, param_types, ret) = match generic {
        Some(sig) if sig.params.len() == erased_params.len() => (sig.type_params, sig.params, sig.ret),
        Some(sig) => (sig.type_params, erased_params, sig.ret),
        None => (Vec::new(), erased_params, erased.ret),
    };

    // names are aligned from the right so leading synthetic parameters drop out
    let names = &m.parameter_names;
    let skip = names.len().saturating_sub(param_types.len());
    let pad = param_types.len().saturating_sub(names.len() - skip);
    let params = param_types
        .into_iter()
        .enumerate()
        .map(|(i, ty)| JavaParam {
            name: if i < pad {
                None
            } else {
                names.get(skip + i - pad).cloned().flatten()
            },
            ty,
        })
        .collect();

    Ok(JavaMethod {
        name: m.name.clone(),
        type_params,
        params,
        ret,
        is_static: m.has(ACC_STATIC),
        is_varargs: m.has(ACC_VARARGS),
        javadoc: None,
    })
}

/// Attaches nested classes under their declaring classes and groups the
/// top-level classes by package. Nested classes whose declaring class is
/// missing are dropped.
pub fn assemble_packages(classes: Vec<JavaClass>) -> BTreeMap<String, Vec<JavaClass>> {
    let mut by_name: HashMap<String, JavaClass> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for class in classes {
        if by_name.contains_key(&class.name) {
            continue;
        }
        order.push(class.name.clone());
        by_name.insert(class.name.clone(), class);
    }

    // deepest first so children are complete before they move into parents
    order.sort_by_key(|n| std::cmp::Reverse(n.matches('$').count()));
    for name in &order {
        let Some(declaring) = by_name.get(name).and_then(|c| c.declaring_class.clone()) else {
            continue;
        };
        let Some(class) = by_name.remove(name) else {
            continue;
        };
        if let Some(parent) = by_name.get_mut(&declaring) {
            parent.nested.push(class);
        }
    }

    let mut packages: BTreeMap<String, Vec<JavaClass>> = BTreeMap::new();
    for (_, mut class) in by_name {
        class.visit_mut(&mut |c| c.nested.sort_by(|a, b| a.simple_name.cmp(&b.simple_name)));
        packages.entry(class.package.clone()).or_default().push(class);
    }
    for classes in packages.values_mut() {
        classes.sort_by(|a, b| a.simple_name.cmp(&b.simple_name));
    }
    packages
}
