//! Field/method descriptors and generic signatures (JVMS §4.3, §4.7.9.1).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid signature {input:?} at offset {at}: {message}")]
pub struct SignatureError {
    pub input: String,
    pub at: usize,
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            b'Z' => Self::Boolean,
            b'B' => Self::Byte,
            b'C' => Self::Char,
            b'S' => Self::Short,
            b'I' => Self::Int,
            b'J' => Self::Long,
            b'F' => Self::Float,
            b'D' => Self::Double,
            b'V' => Self::Void,
            _ => return None,
        })
    }

    pub fn java_name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Void => "void",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeArg {
    /// `?`
    Any,
    /// `? extends T`
    Extends(JavaType),
    /// `? super T`
    Super(JavaType),
    Exact(JavaType),
}

/// A class type by binary name (`java.util.Map$Entry`) with its own type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassType {
    pub name: String,
    pub args: Vec<TypeArg>,
}

impl ClassType {
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn is_object(&self) -> bool {
        self.name == "java.lang.Object"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JavaType {
    Primitive(Primitive),
    Array(Box<JavaType>),
    Class(ClassType),
    TypeVar(String),
}

impl JavaType {
    /// Short source-level spelling used to match declarations in `.java` files.
    pub fn simple_name(&self) -> String {
        match self {
            Self::Primitive(p) => p.java_name().to_string(),
            Self::Array(inner) => format!("{}[]", inner.simple_name()),
            Self::Class(c) => c
                .name
                .rsplit(['.', '$'])
                .next()
                .unwrap_or(&c.name)
                .to_string(),
            Self::TypeVar(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    pub bounds: Vec<JavaType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_params: Vec<TypeParam>,
    pub superclass: ClassType,
    pub interfaces: Vec<ClassType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_params: Vec<TypeParam>,
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

pub fn internal_to_binary(internal: &str) -> String {
    internal.replace('/', ".")
}

pub fn parse_field_descriptor(input: &str) -> Result<JavaType, SignatureError> {
    let mut p = Reader::new(input);
    let ty = p.java_type()?;
    p.finish()?;
    Ok(ty)
}

pub fn parse_method_descriptor(input: &str) -> Result<MethodSignature, SignatureError> {
    let mut p = Reader::new(input);
    let sig = p.method_signature()?;
    p.finish()?;
    Ok(sig)
}

pub fn parse_field_signature(input: &str) -> Result<JavaType, SignatureError> {
    parse_field_descriptor(input)
}

pub fn parse_method_signature(input: &str) -> Result<MethodSignature, SignatureError> {
    parse_method_descriptor(input)
}

pub fn parse_class_signature(input: &str) -> Result<ClassSignature, SignatureError> {
    let mut p = Reader::new(input);
    let type_params = p.type_params()?;
    let superclass = p.class_type()?;
    let mut interfaces = Vec::new();
    while !p.at_end() {
        interfaces.push(p.class_type()?);
    }
    Ok(ClassSignature {
        type_params,
        superclass,
        interfaces,
    })
}

struct Reader<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: &'static str) -> SignatureError {
        SignatureError {
            input: self.input.to_string(),
            at: self.pos,
            message,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<u8, SignatureError> {
        let b = self.peek().ok_or_else(|| self.error("unexpected end"))?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, want: u8, message: &'static str) -> Result<(), SignatureError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn finish(&self) -> Result<(), SignatureError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn identifier(&mut self) -> Result<&'a str, SignatureError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b';' | b'<' | b'>' | b'.' | b'/' | b':' | b'[') {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(&self.input[start..self.pos])
    }

    fn type_params(&mut self) -> Result<Vec<TypeParam>, SignatureError> {
        let mut params = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(params);
        }
        self.pos += 1;
        while self.peek() != Some(b'>') {
            let name = self.identifier()?.to_string();
            let mut bounds = Vec::new();
            // class bound, possibly empty
            self.expect(b':', "expected ':' in type parameter")?;
            if !matches!(self.peek(), Some(b':') | Some(b'>')) {
                bounds.push(self.reference_type()?);
            }
            while self.peek() == Some(b':') {
                self.pos += 1;
                bounds.push(self.reference_type()?);
            }
            params.push(TypeParam { name, bounds });
            if self.at_end() {
                return Err(self.error("unterminated type parameters"));
            }
        }
        self.pos += 1;
        Ok(params)
    }

    fn method_signature(&mut self) -> Result<MethodSignature, SignatureError> {
        let type_params = self.type_params()?;
        self.expect(b'(', "expected '('")?;
        let mut params = Vec::new();
        while self.peek() != Some(b')') {
            if self.at_end() {
                return Err(self.error("unterminated parameter list"));
            }
            params.push(self.java_type()?);
        }
        self.pos += 1;
        let ret = self.java_type()?;
        while self.peek() == Some(b'^') {
            self.pos += 1;
            let _ = self.reference_type()?;
        }
        Ok(MethodSignature {
            type_params,
            params,
            ret,
        })
    }

    fn java_type(&mut self) -> Result<JavaType, SignatureError> {
        match self.peek() {
            Some(tag) if Primitive::from_tag(tag).is_some() => {
                self.pos += 1;
                Ok(JavaType::Primitive(
                    Primitive::from_tag(tag).ok_or_else(|| self.error("bad primitive"))?,
                ))
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Result<JavaType, SignatureError> {
        match self.peek() {
            Some(b'L') => Ok(JavaType::Class(self.class_type()?)),
            Some(b'T') => {
                self.pos += 1;
                let name = self.identifier()?.to_string();
                self.expect(b';', "expected ';' after type variable")?;
                Ok(JavaType::TypeVar(name))
            }
            Some(b'[') => {
                self.pos += 1;
                Ok(JavaType::Array(Box::new(self.java_type()?)))
            }
            _ => Err(self.error("expected reference type")),
        }
    }

    fn class_type(&mut self) -> Result<ClassType, SignatureError> {
        self.expect(b'L', "expected 'L'")?;
        let mut name = String::new();
        loop {
            let part = self.identifier()?;
            name.push_str(part);
            if self.peek() == Some(b'/') {
                self.pos += 1;
                name.push('.');
            } else {
                break;
            }
        }
        let mut args = self.type_args()?;
        while self.peek() == Some(b'.') {
            self.pos += 1;
            name.push('$');
            name.push_str(self.identifier()?);
            args = self.type_args()?;
        }
        self.expect(b';', "expected ';' after class type")?;
        Ok(ClassType { name, args })
    }

    fn type_args(&mut self) -> Result<Vec<TypeArg>, SignatureError> {
        let mut args = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(args);
        }
        self.pos += 1;
        loop {
            let arg = match self.peek() {
                Some(b'>') => break,
                Some(b'*') => {
                    self.pos += 1;
                    TypeArg::Any
                }
                Some(b'+') => {
                    self.pos += 1;
                    TypeArg::Extends(self.reference_type()?)
                }
                Some(b'-') => {
                    self.pos += 1;
                    TypeArg::Super(self.reference_type()?)
                }
                Some(_) => TypeArg::Exact(self.reference_type()?),
                None => return Err(self.error("unterminated type arguments")),
            };
            args.push(arg);
        }
        let _ = self.bump()?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> JavaType {
        JavaType::Class(ClassType::raw(name))
    }

    #[test]
    fn parses_method_descriptor() {
        let sig = parse_method_descriptor("(I[Ljava/lang/String;J)V").unwrap();
        assert_eq!(
            sig.params,
            vec![
                JavaType::Primitive(Primitive::Int),
                JavaType::Array(Box::new(class("java.lang.String"))),
                JavaType::Primitive(Primitive::Long),
            ]
        );
        assert_eq!(sig.ret, JavaType::Primitive(Primitive::Void));
    }

    #[test]
    fn parses_generic_method_signature_with_throws() {
        let sig = parse_method_signature(
            "<T:Ljava/lang/Object;>(Ljava/util/List<+TT;>;)TT;^Ljava/io/IOException;",
        )
        .unwrap();
        assert_eq!(sig.type_params[0].name, "T");
        assert_eq!(sig.type_params[0].bounds, vec![class("java.lang.Object")]);
        assert_eq!(
            sig.params,
            vec![JavaType::Class(ClassType {
                name: "java.util.List".into(),
                args: vec![TypeArg::Extends(JavaType::TypeVar("T".into()))],
            })]
        );
        assert_eq!(sig.ret, JavaType::TypeVar("T".into()));
    }

    #[test]
    fn parses_class_signature_with_interface_only_bound() {
        let sig = parse_class_signature(
            "<K::Ljava/lang/Comparable<TK;>;V:Ljava/lang/Object;>Ljava/util/AbstractMap<TK;TV;>;Ljava/io/Serializable;",
        )
        .unwrap();
        assert_eq!(sig.type_params.len(), 2);
        assert_eq!(sig.type_params[0].name, "K");
        assert_eq!(sig.type_params[0].bounds.len(), 1);
        assert_eq!(sig.superclass.name, "java.util.AbstractMap");
        assert_eq!(sig.superclass.args.len(), 2);
        assert_eq!(sig.interfaces, vec![ClassType::raw("java.io.Serializable")]);
    }

    #[test]
    fn parses_inner_class_suffix_and_wildcards() {
        let ty = parse_field_signature("Lorg/example/Outer<TT;>.Inner<*>;").unwrap();
        assert_eq!(
            ty,
            JavaType::Class(ClassType {
                name: "org.example.Outer$Inner".into(),
                args: vec![TypeArg::Any],
            })
        );
        assert_eq!(ty.simple_name(), "Inner");
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_field_descriptor("Ljava/lang/String").unwrap_err();
        assert_eq!(err.message, "expected ';' after class type");
        assert!(parse_field_descriptor("Q").is_err());
        assert!(parse_method_descriptor("(I").is_err());
    }
}
