//! `.pyi` text for one Java package.

use std::collections::{BTreeMap, HashSet};

use crate::model::{ClassKind, JavaClass, JavaField, JavaMethod};
use crate::pytypes::{
    Position, TypeMapper, identifier, is_python_identifier, parameter_names, python_module,
};
use crate::signature::{JavaType, TypeParam};

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub convert_strings: bool,
    pub include_javadoc: bool,
}

const INDENT: &str = "    ";

/// Renders the stub of `package`. `subpackages` are the full names of the
/// child packages exposed through `__module_protocol__`.
pub fn render_module(
    package: &str,
    classes: &[JavaClass],
    subpackages: &[String],
    options: &RenderOptions,
) -> String {
    let mut local = HashSet::new();
    for class in classes {
        collect_names(class, &mut local);
    }

    let mut r = Renderer {
        mapper: TypeMapper::new(package, local, options.convert_strings),
        options: *options,
        type_vars: Vec::new(),
        declared: HashSet::new(),
    };

    let mut blocks = Vec::new();
    for class in classes {
        let mut lines = Vec::new();
        r.class(class, 0, &[], &mut lines);
        blocks.push(lines.join("\n"));
    }
    let protocol = r.module_protocol(package, classes, subpackages);

    let mut out = String::new();
    for module in r.mapper.imports() {
        out.push_str(&format!("import {module}\n"));
    }
    out.push_str("\n\n");
    for tv in &r.type_vars {
        out.push_str(tv);
        out.push('\n');
    }
    for block in blocks {
        out.push_str(&block);
        out.push_str("\n\n");
    }
    out.push_str(&protocol);
    out
}

fn collect_names(class: &JavaClass, out: &mut HashSet<String>) {
    out.insert(class.name.clone());
    for nested in &class.nested {
        collect_names(nested, out);
    }
}

struct Renderer {
    mapper: TypeMapper,
    options: RenderOptions,
    type_vars: Vec<String>,
    declared: HashSet<String>,
}

impl Renderer {
    fn declare_type_vars(
        &mut self,
        prefix: &str,
        params: &[TypeParam],
        scope: &mut Vec<(String, String)>,
    ) {
        for p in params {
            let py = format!("_{prefix}__{}", p.name);
            scope.push((p.name.clone(), py.clone()));
            if !self.declared.insert(py.clone()) {
                continue;
            }
            let bound = p
                .bounds
                .iter()
                .find(|b| !matches!(b, JavaType::Class(c) if c.is_object()))
                .map(|b| self.mapper.render(b, Position::Bound, &[]));
            let line = match bound {
                Some(b) => format!("{py} = typing.TypeVar('{py}', bound={b})  # <{}>", p.name),
                None => format!("{py} = typing.TypeVar('{py}')  # <{}>", p.name),
            };
            self.type_vars.push(line);
        }
    }

    fn class(
        &mut self,
        class: &JavaClass,
        depth: usize,
        outer_scope: &[(String, String)],
        out: &mut Vec<String>,
    ) {
        let pad = INDENT.repeat(depth);
        let inner = INDENT.repeat(depth + 1);
        let prefix = class.python_path().replace('.', "__");

        let mut scope = outer_scope.to_vec();
        self.declare_type_vars(&prefix, &class.type_params, &mut scope);

        let mut bases = Vec::new();
        if let Some(sup) = &class.superclass {
            bases.push(self.mapper.render(
                &JavaType::Class(sup.clone()),
                Position::Return,
                &scope,
            ));
        }
        for iface in &class.interfaces {
            bases.push(self.mapper.render(
                &JavaType::Class(iface.clone()),
                Position::Return,
                &scope,
            ));
        }
        bases.retain(|b| b != "typing.Any");
        if !class.type_params.is_empty() {
            let vars: Vec<&str> = scope[scope.len() - class.type_params.len()..]
                .iter()
                .map(|(_, py)| py.as_str())
                .collect();
            bases.push(format!("typing.Generic[{}]", vars.join(", ")));
        }

        let name = identifier(&class.simple_name);
        if bases.is_empty() {
            out.push(format!("{pad}class {name}:"));
        } else {
            out.push(format!("{pad}class {name}({}):", bases.join(", ")));
        }

        let body_start = out.len();
        if self.options.include_javadoc
            && let Some(doc) = &class.javadoc
        {
            push_docstring(out, &inner, doc);
        }

        // `$plus`, `MODULE$` and friends cannot be spelled in Python
        let methods: Vec<&JavaMethod> = class
            .methods
            .iter()
            .filter(|m| m.is_constructor() || is_python_identifier(&m.name))
            .collect();
        let method_names: HashSet<String> = methods
            .iter()
            .map(|m| python_method_name(m))
            .chain(class.nested.iter().map(|n| identifier(&n.simple_name)))
            .collect();
        for field in &class.fields {
            if !is_python_identifier(&field.name) || method_names.contains(&identifier(&field.name)) {
                continue;
            }
            self.field(field, &inner, &scope, out);
        }

        for nested in &class.nested {
            self.class(nested, depth + 1, &scope, out);
        }

        let mut groups: BTreeMap<(bool, String), Vec<&JavaMethod>> = BTreeMap::new();
        for method in methods {
            if method.is_constructor()
                && matches!(class.kind, ClassKind::Interface | ClassKind::Annotation)
            {
                continue;
            }
            // constructors sort first
            groups
                .entry((!method.is_constructor(), python_method_name(method)))
                .or_default()
                .push(method);
        }
        for ((_, py_name), methods) in &groups {
            let overloaded = methods.len() > 1;
            for method in methods {
                self.method(method, py_name, &prefix, overloaded, &inner, &scope, out);
            }
        }

        if out.len() == body_start {
            out.push(format!("{inner}..."));
        }
    }

    fn field(
        &mut self,
        field: &JavaField,
        indent: &str,
        scope: &[(String, String)],
        out: &mut Vec<String>,
    ) {
        let ty = self.mapper.render(&field.ty, Position::Field, scope);
        let name = identifier(&field.name);
        if field.is_static {
            out.push(format!("{indent}{name}: typing.ClassVar[{ty}] = ..."));
        } else {
            out.push(format!("{indent}{name}: {ty} = ..."));
        }
        if self.options.include_javadoc
            && let Some(doc) = &field.javadoc
        {
            push_docstring(out, indent, doc);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn method(
        &mut self,
        method: &JavaMethod,
        py_name: &str,
        class_prefix: &str,
        overloaded: bool,
        indent: &str,
        class_scope: &[(String, String)],
        out: &mut Vec<String>,
    ) {
        let mut scope = class_scope.to_vec();
        let prefix = format!("{class_prefix}__{}", py_name.trim_matches('_'));
        self.declare_type_vars(&prefix, &method.type_params, &mut scope);

        let names = parameter_names(
            &method
                .params
                .iter()
                .map(|p| (p.name.as_deref(), &p.ty))
                .collect::<Vec<_>>(),
        );

        let mut args = Vec::new();
        if !method.is_static {
            args.push("self".to_string());
        }
        let last = method.params.len().saturating_sub(1);
        for (i, (param, name)) in method.params.iter().zip(&names).enumerate() {
            if method.is_varargs && i == last {
                let elem = match &param.ty {
                    JavaType::Array(inner) => inner.as_ref(),
                    other => other,
                };
                let ty = self.mapper.render(elem, Position::Param, &scope);
                args.push(format!("*{name}: {ty}"));
            } else {
                let ty = self.mapper.render(&param.ty, Position::Param, &scope);
                args.push(format!("{name}: {ty}"));
            }
        }

        if overloaded {
            out.push(format!("{indent}@typing.overload"));
        }
        if method.is_static {
            out.push(format!("{indent}@staticmethod"));
        }

        let signature = if method.is_constructor() {
            format!("{indent}def {py_name}({})", args.join(", "))
        } else {
            let ret = self.mapper.render(&method.ret, Position::Return, &scope);
            format!("{indent}def {py_name}({}) -> {ret}", args.join(", "))
        };

        match method.javadoc.as_deref().filter(|_| self.options.include_javadoc) {
            Some(doc) => {
                out.push(format!("{signature}:"));
                let body = format!("{indent}{INDENT}");
                push_docstring(out, &body, doc);
                out.push(format!("{body}..."));
            }
            None => out.push(format!("{signature}: ...")),
        }
    }

    fn module_protocol(
        &mut self,
        package: &str,
        classes: &[JavaClass],
        subpackages: &[String],
    ) -> String {
        let mut lines = vec![
            "class __module_protocol__(typing.Protocol):".to_string(),
            format!(
                "{INDENT}# A module protocol which reflects the result of ``jp.JPackage(\"{package}\")``."
            ),
            String::new(),
        ];
        let mut members = 0usize;
        for class in classes {
            let name = identifier(&class.simple_name);
            lines.push(format!("{INDENT}{name}: typing.Type[{name}]"));
            members += 1;
        }
        for sub in subpackages {
            let module = python_module(sub);
            let attr = module.rsplit('.').next().unwrap_or(&module).to_string();
            self.mapper.import(&module);
            lines.push(format!("{INDENT}{attr}: {module}.__module_protocol__"));
            members += 1;
        }
        if members == 0 {
            lines.push(format!("{INDENT}..."));
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

fn python_method_name(method: &JavaMethod) -> String {
    if method.is_constructor() {
        "__init__".to_string()
    } else {
        identifier(&method.name)
    }
}

fn push_docstring(out: &mut Vec<String>, indent: &str, doc: &str) {
    let escaped = doc.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
    if !escaped.contains('\n') {
        let spacer = if escaped.ends_with('"') { " " } else { "" };
        out.push(format!("{indent}\"\"\"{escaped}{spacer}\"\"\""));
        return;
    }
    out.push(format!("{indent}\"\"\""));
    for line in escaped.lines() {
        if line.is_empty() {
            out.push(String::new());
        } else {
            out.push(format!("{indent}{line}"));
        }
    }
    out.push(format!("{indent}\"\"\""));
}
