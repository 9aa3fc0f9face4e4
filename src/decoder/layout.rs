//! C ABI structure layouts built from ordered field lists.

use std::ffi::c_long;
use std::mem::{align_of, size_of};

use crate::error::DecodeError;

/// What a field holds and how wide it is on the build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    I32,
    U8,
    F32,
    F64,
    /// C `long`, whose width follows the target.
    Long,
    /// Any pointer.
    Ptr,
    /// `char[n]`.
    Text(usize),
    /// `int[n]`.
    I32Array(usize),
    /// `float[n]`.
    F32Array(usize),
    /// `char[count][len]`.
    TextArray { len: usize, count: usize },
    /// A nested structure stored by value.
    Embedded { size: usize, align: usize },
}

impl FieldKind {
    pub fn size(self) -> usize {
        match self {
            FieldKind::I32 => 4,
            FieldKind::U8 => 1,
            FieldKind::F32 => 4,
            FieldKind::F64 => 8,
            FieldKind::Long => size_of::<c_long>(),
            FieldKind::Ptr => size_of::<usize>(),
            FieldKind::Text(n) => n,
            FieldKind::I32Array(n) => 4 * n,
            FieldKind::F32Array(n) => 4 * n,
            FieldKind::TextArray { len, count } => len * count,
            FieldKind::Embedded { size, .. } => size,
        }
    }

    pub fn align(self) -> usize {
        match self {
            FieldKind::I32 | FieldKind::I32Array(_) => align_of::<i32>(),
            FieldKind::F32 | FieldKind::F32Array(_) => align_of::<f32>(),
            FieldKind::U8 | FieldKind::Text(_) | FieldKind::TextArray { .. } => 1,
            FieldKind::F64 => align_of::<f64>(),
            FieldKind::Long => align_of::<c_long>(),
            FieldKind::Ptr => align_of::<usize>(),
            FieldKind::Embedded { align, .. } => align,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            FieldKind::I32 => "int",
            FieldKind::U8 => "char",
            FieldKind::F32 => "float",
            FieldKind::F64 => "double",
            FieldKind::Long => "long",
            FieldKind::Ptr => "pointer",
            FieldKind::Text(_) => "char array",
            FieldKind::I32Array(_) => "int array",
            FieldKind::F32Array(_) => "float array",
            FieldKind::TextArray { .. } => "char table",
            FieldKind::Embedded { .. } => "embedded structure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
}

/// Byte layout of one native structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: &'static str,
    pub fields: Vec<Field>,
    pub size: usize,
    pub align: usize,
}

impl StructLayout {
    pub fn field(&self, name: &'static str) -> Result<&Field, DecodeError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or(DecodeError::MissingField { structure: self.name, field: name })
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Kind to use when this structure is embedded in another.
    pub fn embedded(&self) -> FieldKind {
        FieldKind::Embedded { size: self.size, align: self.align }
    }
}

/// Lays out fields in declaration order with natural alignment.
pub struct LayoutBuilder {
    name: &'static str,
    fields: Vec<Field>,
    offset: usize,
    align: usize,
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl LayoutBuilder {
    pub fn new(name: &'static str) -> Self {
        Self { name, fields: Vec::new(), offset: 0, align: 1 }
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        let align = kind.align();
        let offset = align_up(self.offset, align);
        self.fields.push(Field { name, offset, kind });
        self.offset = offset + kind.size();
        self.align = self.align.max(align);
        self
    }

    pub fn fields(self, list: &[(&'static str, FieldKind)]) -> Self {
        list.iter().fold(self, |b, &(name, kind)| b.field(name, kind))
    }

    pub fn build(self) -> StructLayout {
        StructLayout {
            name: self.name,
            size: align_up(self.offset, self.align),
            align: self.align,
            fields: self.fields,
        }
    }
}
