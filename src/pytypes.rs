//! Java → Python type spelling, following the bridge's conversion rules.

use std::collections::{BTreeSet, HashSet};

use crate::signature::{ClassType, JavaType, Primitive, TypeArg};

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Java identifiers that are Python keywords get a trailing underscore.
pub fn identifier(name: &str) -> String {
    if PYTHON_KEYWORDS.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

/// Whether `name` can be spelled as a Python identifier. Java allows `$`
/// and compilers generate names full of it; Python does not.
pub fn is_python_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Python module path of a Java package.
pub fn python_module(package: &str) -> String {
    package.split('.').map(identifier).collect::<Vec<_>>().join(".")
}

/// Splits a binary name into its package and the `$`-separated local part.
pub fn split_binary_name(name: &str) -> (&str, &str) {
    let top = name.split('$').next().unwrap_or(name);
    match top.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("", name),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Method argument; implicit conversions are accepted.
    Param,
    Return,
    Field,
    /// Inside `[...]` of a generic.
    Arg,
    /// TypeVar bound; type variables are erased.
    Bound,
}

/// In-scope type variables, Java name to Python TypeVar name. Later entries shadow earlier ones.
pub type Scope = [(String, String)];

pub struct TypeMapper {
    module: String,
    local: HashSet<String>,
    convert_strings: bool,
    imports: BTreeSet<String>,
}

impl TypeMapper {
    pub fn new(module: &str, local: HashSet<String>, convert_strings: bool) -> Self {
        let mut imports = BTreeSet::new();
        imports.insert("typing".to_string());
        Self {
            module: module.to_string(),
            local,
            convert_strings,
            imports,
        }
    }

    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    pub fn import(&mut self, module: &str) {
        if module != python_module(&self.module) {
            self.imports.insert(module.to_string());
        }
    }

    /// Reference to a class by binary name, bare for classes of this module.
    /// Classes that cannot be named from Python become `typing.Any`.
    pub fn class_ref(&mut self, binary_name: &str) -> String {
        let (package, local) = split_binary_name(binary_name);
        if !local.split('$').all(is_python_identifier) {
            return "typing.Any".to_string();
        }
        let local_path = local.split('$').map(identifier).collect::<Vec<_>>().join(".");
        if package == self.module {
            if self.local.contains(binary_name) {
                return local_path;
            }
            // package-private or filtered out
            return "typing.Any".to_string();
        }
        let module = python_module(package);
        if module.is_empty() {
            return local_path;
        }
        self.import(&module);
        format!("{module}.{local_path}")
    }

    pub fn render(&mut self, ty: &JavaType, pos: Position, scope: &Scope) -> String {
        match ty {
            JavaType::Primitive(p) => primitive(*p).to_string(),
            JavaType::Array(inner) => {
                if pos == Position::Param {
                    self.imports.insert("jpype".to_string());
                    let elem = self.render(inner, Position::Arg, scope);
                    format!("typing.Union[typing.List[{elem}], jpype.JArray]")
                } else {
                    let elem = self.render(inner, Position::Arg, scope);
                    format!("typing.MutableSequence[{elem}]")
                }
            }
            JavaType::TypeVar(name) => {
                if pos == Position::Bound {
                    return "typing.Any".to_string();
                }
                scope
                    .iter()
                    .rev()
                    .find(|(java, _)| java == name)
                    .map(|(_, py)| py.clone())
                    .unwrap_or_else(|| "typing.Any".to_string())
            }
            JavaType::Class(ct) => self.render_class(ct, pos, scope),
        }
    }

    fn render_class(&mut self, ct: &ClassType, pos: Position, scope: &Scope) -> String {
        match (ct.name.as_str(), pos) {
            ("java.lang.Object", Position::Param | Position::Arg | Position::Bound) => {
                return "typing.Any".to_string();
            }
            ("java.lang.String", Position::Return | Position::Field) if self.convert_strings => {
                return "str".to_string();
            }
            _ => {}
        }

        let plain = self.generic(ct, scope);
        if pos != Position::Param {
            return plain;
        }

        if let Some(py) = boxed_python_type(&ct.name) {
            return format!("typing.Union[{plain}, {py}]");
        }
        let args = |m: &mut Self, n: usize| -> Vec<String> {
            (0..n)
                .map(|i| match ct.args.get(i) {
                    Some(arg) => m.type_arg(arg, scope),
                    None => "typing.Any".to_string(),
                })
                .collect()
        };
        match ct.name.as_str() {
            "java.lang.Class" => {
                let t = args(self, 1).remove(0);
                format!("typing.Union[{plain}, typing.Type[{t}]]")
            }
            "java.util.List" => {
                let e = args(self, 1).remove(0);
                format!("typing.Union[{plain}, typing.Sequence[{e}], typing.List[{e}]]")
            }
            "java.util.Collection" => {
                let e = args(self, 1).remove(0);
                format!("typing.Union[{plain}, typing.Collection[{e}]]")
            }
            "java.util.Set" => {
                let e = args(self, 1).remove(0);
                format!("typing.Union[{plain}, typing.AbstractSet[{e}]]")
            }
            "java.util.Map" => {
                let kv = args(self, 2);
                format!("typing.Union[{plain}, typing.Mapping[{}, {}]]", kv[0], kv[1])
            }
            _ => plain,
        }
    }

    fn generic(&mut self, ct: &ClassType, scope: &Scope) -> String {
        let base = self.class_ref(&ct.name);
        if ct.args.is_empty() || base == "typing.Any" {
            return base;
        }
        let args: Vec<String> = ct.args.iter().map(|a| self.type_arg(a, scope)).collect();
        format!("{base}[{}]", args.join(", "))
    }

    fn type_arg(&mut self, arg: &TypeArg, scope: &Scope) -> String {
        match arg {
            TypeArg::Any => "typing.Any".to_string(),
            TypeArg::Extends(t) | TypeArg::Super(t) | TypeArg::Exact(t) => {
                self.render(t, Position::Arg, scope)
            }
        }
    }
}

fn primitive(p: Primitive) -> &'static str {
    match p {
        Primitive::Boolean => "bool",
        Primitive::Byte | Primitive::Short | Primitive::Int | Primitive::Long => "int",
        Primitive::Float | Primitive::Double => "float",
        Primitive::Char => "str",
        Primitive::Void => "None",
    }
}

fn boxed_python_type(name: &str) -> Option<&'static str> {
    Some(match name {
        "java.lang.String" | "java.lang.Character" => "str",
        "java.lang.Boolean" => "bool",
        "java.lang.Byte" | "java.lang.Short" | "java.lang.Integer" | "java.lang.Long" => "int",
        "java.lang.Float" | "java.lang.Double" => "float",
        _ => return None,
    })
}

/// Parameter names for one method: known names when present, otherwise
/// derived from the type; keywords escaped, duplicates numbered.
pub fn parameter_names(params: &[(Option<&str>, &JavaType)]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    used.insert("self".to_string());
    let mut out = Vec::with_capacity(params.len());
    for (name, ty) in params {
        let base = match name {
            Some(n) if is_python_identifier(n) => identifier(n),
            _ => identifier(&derived_name(ty)),
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while used.contains(&candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        used.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

fn derived_name(ty: &JavaType) -> String {
    match ty {
        JavaType::Primitive(p) => p.java_name().to_string(),
        JavaType::Array(inner) => format!("{}Array", derived_name(inner)),
        JavaType::TypeVar(name) => name.to_lowercase(),
        JavaType::Class(c) => {
            let trimmed = c.name.trim_end_matches('$');
            let simple: String = trimmed
                .rsplit(['.', '$'])
                .next()
                .unwrap_or(trimmed)
                .chars()
                .filter(|ch| *ch == '_' || ch.is_alphanumeric())
                .collect();
            let mut chars = simple.chars();
            match chars.next() {
                Some(first) if first.is_alphabetic() => first.to_lowercase().chain(chars).collect(),
                _ => "arg".to_string(),
            }
        }
    }
}
