//! Class-file reader (JVMS chapter 4).
//!
//! Only the parts needed to describe a public API are decoded: the class
//! header, fields, methods and the handful of attributes carrying generic
//! signatures, nesting and parameter names. Everything else is skipped by
//! length.

use thiserror::Error;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
const ACC_MANDATED: u16 = 0x8000;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("not a class file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("class file truncated at offset {0}")]
    Truncated(usize),
    #[error("unknown constant pool tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("constant pool index {0} is out of range or has the wrong type")]
    BadConstant(u16),
}

type Result<T> = std::result::Result<T, ClassFileError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Constant {
    Unused,
    Utf8(String),
    Class(u16),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    /// From `MethodParameters`, else from the `LocalVariableTable`. One slot
    /// per declared parameter; `None` where the class file has no name.
    pub parameter_names: Vec<Option<String>>,
}

impl MemberInfo {
    pub fn has(&self, flag: u16) -> bool {
        self.access & flag != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub major_version: u16,
    pub access: u16,
    /// Internal form, `org/example/Outer$Inner`.
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub inner_classes: Vec<InnerClassEntry>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let magic = r.u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let _minor = r.u2()?;
        let major_version = r.u2()?;
        let pool = ConstantPool::read(&mut r)?;

        let access = r.u2()?;
        let this_class = pool.class_name(r.u2()?)?;
        let super_index = r.u2()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?)
        };

        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u2()?)?);
        }

        let fields = read_members(&mut r, &pool)?;
        let methods = read_members(&mut r, &pool)?;

        let mut signature = None;
        let mut inner_classes = Vec::new();
        let attr_count = r.u2()?;
        for _ in 0..attr_count {
            let name = pool.utf8(r.u2()?)?;
            let len = r.u4()? as usize;
            let body = r.take(len)?;
            let mut a = ByteReader::new(body);
            match name {
                "Signature" => signature = Some(pool.utf8(a.u2()?)?.to_string()),
                "InnerClasses" => {
                    let n = a.u2()?;
                    for _ in 0..n {
                        let inner = pool.class_name(a.u2()?)?;
                        let outer_index = a.u2()?;
                        let name_index = a.u2()?;
                        let access = a.u2()?;
                        inner_classes.push(InnerClassEntry {
                            inner,
                            outer: match outer_index {
                                0 => None,
                                i => Some(pool.class_name(i)?),
                            },
                            simple_name: match name_index {
                                0 => None,
                                i => Some(pool.utf8(i)?.to_string()),
                            },
                            access,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            major_version,
            access,
            this_class,
            super_class,
            interfaces,
            signature,
            fields,
            methods,
            inner_classes,
        })
    }

    pub fn has(&self, flag: u16) -> bool {
        self.access & flag != 0
    }

    /// The `InnerClasses` entry describing this class itself, if it is nested.
    pub fn own_inner_entry(&self) -> Option<&InnerClassEntry> {
        self.inner_classes.iter().find(|e| e.inner == self.this_class)
    }
}

fn read_members(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Vec<MemberInfo>> {
    let count = r.u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = r.u2()?;
        let name = pool.utf8(r.u2()?)?.to_string();
        let descriptor = pool.utf8(r.u2()?)?.to_string();
        let mut signature = None;
        let mut method_parameters = Vec::new();
        let mut local_names = Vec::new();

        let attr_count = r.u2()?;
        for _ in 0..attr_count {
            let attr_name = pool.utf8(r.u2()?)?;
            let len = r.u4()? as usize;
            let body = r.take(len)?;
            let mut a = ByteReader::new(body);
            match attr_name {
                "Signature" => signature = Some(pool.utf8(a.u2()?)?.to_string()),
                "MethodParameters" => {
                    let n = a.u1()?;
                    for _ in 0..n {
                        let name_index = a.u2()?;
                        let flags = a.u2()?;
                        if flags & (ACC_SYNTHETIC | ACC_MANDATED) != 0 {
                            continue;
                        }
                        let name = match name_index {
                            0 => None,
                            i => Some(pool.utf8(i)?.to_string()),
                        };
                        method_parameters.push(name);
                    }
                }
                "Code" => local_names = read_code_locals(&mut a, pool, access, &descriptor)?,
                _ => {}
            }
        }

        let parameter_names = if method_parameters.iter().any(Option::is_some) {
            method_parameters
        } else if !local_names.is_empty() {
            local_names
        } else {
            method_parameters
        };
        members.push(MemberInfo {
            access,
            name,
            descriptor,
            signature,
            parameter_names,
        });
    }
    Ok(members)
}

/// Parameter names from a `Code` attribute's `LocalVariableTable`; empty
/// unless every parameter slot is named.
fn read_code_locals(
    a: &mut ByteReader<'_>,
    pool: &ConstantPool,
    access: u16,
    descriptor: &str,
) -> Result<Vec<Option<String>>> {
    let _max_stack = a.u2()?;
    let _max_locals = a.u2()?;
    let code_len = a.u4()? as usize;
    a.take(code_len)?;
    let exception_len = a.u2()? as usize;
    a.take(exception_len * 8)?;

    let slots = parameter_slots(descriptor, access & ACC_STATIC != 0);
    let mut names: Vec<Option<String>> = vec![None; slots.len()];

    let attr_count = a.u2()?;
    for _ in 0..attr_count {
        let attr_name = pool.utf8(a.u2()?)?;
        let len = a.u4()? as usize;
        let body = a.take(len)?;
        if attr_name != "LocalVariableTable" {
            continue;
        }
        let mut t = ByteReader::new(body);
        let n = t.u2()?;
        for _ in 0..n {
            let start_pc = t.u2()?;
            let _length = t.u2()?;
            let name_index = t.u2()?;
            let _desc = t.u2()?;
            let index = t.u2()?;
            if start_pc != 0 {
                continue;
            }
            if let Some(pos) = slots.iter().position(|s| *s == index) {
                names[pos] = Some(pool.utf8(name_index)?.to_string());
            }
        }
    }

    if names.iter().all(Option::is_some) {
        Ok(names)
    } else {
        Ok(Vec::new())
    }
}

/// Local variable slot of each declared parameter.
fn parameter_slots(descriptor: &str, is_static: bool) -> Vec<u16> {
    let mut slots = Vec::new();
    let mut slot: u16 = if is_static { 0 } else { 1 };
    let bytes = descriptor.as_bytes();
    let mut i = 1;
    while i < bytes.len() && bytes[i] != b')' {
        slots.push(slot);
        let mut wide = false;
        let mut array = false;
        while i < bytes.len() && bytes[i] == b'[' {
            array = true;
            i += 1;
        }
        match bytes.get(i).copied().unwrap_or(b')') {
            b'L' => {
                while i < bytes.len() && bytes[i] != b';' {
                    i += 1;
                }
            }
            b'J' | b'D' => wide = !array,
            _ => {}
        }
        i += 1;
        slot += if wide { 2 } else { 1 };
    }
    slots
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unused);
        while entries.len() < count {
            let offset = r.pos;
            let tag = r.u1()?;
            let entry = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(r.take(len)?))
                }
                3 | 4 => {
                    r.take(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    r.take(8)?;
                    entries.push(Constant::Other);
                    Constant::Unused
                }
                7 => Constant::Class(r.u2()?),
                8 | 16 | 19 | 20 => {
                    r.take(2)?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    r.take(4)?;
                    Constant::Other
                }
                15 => {
                    r.take(3)?;
                    Constant::Other
                }
                _ => return Err(ClassFileError::UnknownTag { tag, offset }),
            };
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.entries.get(index as usize) {
            Some(Constant::Utf8(s)) => Ok(s),
            _ => Err(ClassFileError::BadConstant(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.entries.get(index as usize) {
            Some(Constant::Class(name)) => Ok(self.utf8(*name)?.to_string()),
            _ => Err(ClassFileError::BadConstant(index)),
        }
    }
}

/// Class files store strings as "modified UTF-8"; the two differences from
/// UTF-8 (encoded NUL and surrogate pairs) only show up in odd identifiers.
fn decode_modified_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let units: Vec<u16> = decode_java_chars(bytes);
            String::from_utf16_lossy(&units)
        }
    }
}

fn decode_java_chars(bytes: &[u8]) -> Vec<u16> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            out.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            out.push(((b & 0x1F) << 6) | (bytes[i + 1] as u16 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            out.push(
                ((b & 0x0F) << 12)
                    | ((bytes[i + 1] as u16 & 0x3F) << 6)
                    | (bytes[i + 2] as u16 & 0x3F),
            );
            i += 3;
        } else {
            out.push(0xFFFD);
            i += 1;
        }
    }
    out
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClassFileError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
