//! Field access for one decoded native structure.

use std::sync::Arc;

use super::array::ArrayElement;
use super::layout::{Field, FieldKind, StructLayout};
use super::lazy::{CountSource, LazyArray, LazyText};
use super::memory::{NativeAddr, NativeMemory};
use super::reader::{DataReader, decode_fixed_text};
use crate::error::DecodeError;

/// A copy of one native structure's bytes together with its layout.
///
/// Scalars and fixed buffers are read straight out of the copy; pointer
/// fields come back as lazy handles and are never followed here.
#[derive(Debug, Clone)]
pub struct Element {
    addr: NativeAddr,
    bytes: Vec<u8>,
    layout: Arc<StructLayout>,
}

impl Element {
    pub fn load(
        memory: &dyn NativeMemory,
        addr: NativeAddr,
        layout: Arc<StructLayout>,
    ) -> Result<Self, DecodeError> {
        let bytes = memory.read(addr, layout.size)?;
        Ok(Self { addr, bytes, layout })
    }

    pub fn addr(&self) -> NativeAddr {
        self.addr
    }

    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    pub fn has(&self, name: &str) -> bool {
        self.layout.has(name)
    }

    fn kind_error(&self, name: &'static str, expected: &'static str) -> DecodeError {
        DecodeError::FieldKind { structure: self.layout.name, field: name, expected }
    }

    fn short(&self, len: usize) -> DecodeError {
        DecodeError::UnmappedAddress { addr: self.addr, len }
    }

    fn slot(&self, name: &'static str, expected: FieldKind) -> Result<(&Field, &[u8]), DecodeError> {
        let field = self.layout.field(name)?;
        let same_kind = std::mem::discriminant(&field.kind) == std::mem::discriminant(&expected);
        if !same_kind {
            return Err(self.kind_error(name, expected.describe()));
        }
        let end = field.offset + field.kind.size();
        let bytes = self.bytes.get(field.offset..end).ok_or(self.short(end))?;
        Ok((field, bytes))
    }

    fn scalar<T>(
        &self,
        name: &'static str,
        kind: FieldKind,
        read: impl FnOnce(&mut DataReader<'_>) -> Option<T>,
    ) -> Result<T, DecodeError> {
        let (_, bytes) = self.slot(name, kind)?;
        read(&mut DataReader::new(bytes, 0)).ok_or(self.short(bytes.len()))
    }

    pub fn i32(&self, name: &'static str) -> Result<i32, DecodeError> {
        self.scalar(name, FieldKind::I32, |r| r.read_i32())
    }

    pub fn u8(&self, name: &'static str) -> Result<u8, DecodeError> {
        self.scalar(name, FieldKind::U8, |r| r.read_u8())
    }

    pub fn f32(&self, name: &'static str) -> Result<f32, DecodeError> {
        self.scalar(name, FieldKind::F32, |r| r.read_f32())
    }

    pub fn f64(&self, name: &'static str) -> Result<f64, DecodeError> {
        self.scalar(name, FieldKind::F64, |r| r.read_f64())
    }

    pub fn long(&self, name: &'static str) -> Result<i64, DecodeError> {
        self.scalar(name, FieldKind::Long, |r| r.read_long())
    }

    pub fn ptr(&self, name: &'static str) -> Result<NativeAddr, DecodeError> {
        self.scalar(name, FieldKind::Ptr, |r| r.read_ptr())
    }


    /// A fixed `char[n]` field.
    pub fn text(&self, name: &'static str) -> Result<String, DecodeError> {
        let (_, bytes) = self.slot(name, FieldKind::Text(0))?;
        decode_fixed_text(bytes).ok_or(DecodeError::InvalidText { field: name })
    }

    /// Checks `count` against a fixed table's capacity. Non-positive counts are empty.
    fn table_len(name: &'static str, count: i32, capacity: usize) -> Result<usize, DecodeError> {
        if count <= 0 {
            return Ok(0);
        }
        if count as usize > capacity {
            return Err(DecodeError::CountExceedsLimit { field: name, count, limit: capacity });
        }
        Ok(count as usize)
    }

    /// The first `count` rows of a fixed `char[count][len]` table.
    pub fn text_table(&self, name: &'static str, count: i32) -> Result<Vec<String>, DecodeError> {
        let (field, bytes) = self.slot(name, FieldKind::TextArray { len: 0, count: 0 })?;
        let FieldKind::TextArray { len, count: capacity } = field.kind else {
            return Err(self.kind_error(name, "char table"));
        };
        let rows = Self::table_len(name, count, capacity)?;
        bytes
            .chunks(len)
            .take(rows)
            .map(|row| decode_fixed_text(row).ok_or(DecodeError::InvalidText { field: name }))
            .collect()
    }

    /// The first `count` entries of a fixed `int[n]` table.
    pub fn i32_table(&self, name: &'static str, count: i32) -> Result<Vec<i32>, DecodeError> {
        let (field, bytes) = self.slot(name, FieldKind::I32Array(0))?;
        let FieldKind::I32Array(capacity) = field.kind else {
            return Err(self.kind_error(name, "int array"));
        };
        let rows = Self::table_len(name, count, capacity)?;
        let mut reader = DataReader::new(bytes, 0);
        (0..rows)
            .map(|_| reader.read_i32().ok_or(self.short(bytes.len())))
            .collect()
    }

    /// The first `count` entries of a fixed `float[n]` table.
    pub fn f32_table(&self, name: &'static str, count: i32) -> Result<Vec<f32>, DecodeError> {
        let (field, bytes) = self.slot(name, FieldKind::F32Array(0))?;
        let FieldKind::F32Array(capacity) = field.kind else {
            return Err(self.kind_error(name, "float array"));
        };
        let rows = Self::table_len(name, count, capacity)?;
        let mut reader = DataReader::new(bytes, 0);
        (0..rows)
            .map(|_| reader.read_f32().ok_or(self.short(bytes.len())))
            .collect()
    }

    /// A structure stored by value inside this one.
    pub fn embedded(
        &self,
        name: &'static str,
        layout: &Arc<StructLayout>,
    ) -> Result<Element, DecodeError> {
        let (field, bytes) = self.slot(name, FieldKind::Embedded { size: 0, align: 0 })?;
        Ok(Element {
            addr: self.addr.offset(field.offset)?,
            bytes: bytes.to_vec(),
            layout: Arc::clone(layout),
        })
    }

    /// A `char *` field, left unread.
    pub fn lazy_text(&self, name: &'static str) -> Result<LazyText, DecodeError> {
        Ok(LazyText::new(name, self.ptr(name)?))
    }

    /// A pointer to an array whose length lives elsewhere, left unread.
    pub fn lazy_array<T: ArrayElement>(
        &self,
        name: &'static str,
        shape: T::Shape,
        count: CountSource,
    ) -> Result<LazyArray<T>, DecodeError> {
        if let CountSource::Sibling(sibling) = count {
            self.layout.field(sibling)?;
        }
        Ok(LazyArray::new(name, self.ptr(name)?, shape, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{LayoutBuilder, MemoryImage};
    use crate::testutil::StructWriter;

    fn sample_layout() -> Arc<StructLayout> {
        Arc::new(
            LayoutBuilder::new("sample")
                .field("name", FieldKind::Text(8))
                .field("count", FieldKind::I32)
                .field("load", FieldKind::F32)
                .field("when", FieldKind::Long)
                .field("list", FieldKind::Ptr)
                .field("flag", FieldKind::U8)
                .field("rows", FieldKind::TextArray { len: 4, count: 3 })
                .field("refs", FieldKind::I32Array(3))
                .build(),
        )
    }

    #[test]
    fn test_scalar_fields() {
        let layout = sample_layout();
        let mut memory = MemoryImage::new();
        let bytes = StructWriter::new(&layout)
            .text("name", "abc\0xxxx")
            .i32("count", -4)
            .f32("load", 0.75)
            .long("when", 1_234_567)
            .ptr("list", NativeAddr(0xdead_0000))
            .u8("flag", b'Y')
            .finish();
        let addr = memory.alloc(bytes);

        let element = Element::load(&memory, addr, Arc::clone(&layout)).unwrap();
        assert_eq!(element.text("name").unwrap(), "abc");
        assert_eq!(element.i32("count").unwrap(), -4);
        assert_eq!(element.f32("load").unwrap(), 0.75);
        assert_eq!(element.long("when").unwrap(), 1_234_567);
        assert_eq!(element.ptr("list").unwrap(), NativeAddr(0xdead_0000));
        assert_eq!(element.u8("flag").unwrap(), b'Y');
        // one read for the whole structure; the list pointer is never followed
        assert_eq!(memory.reads(), 1);
    }

    #[test]
    fn test_full_width_text() {
        let layout = sample_layout();
        let mut memory = MemoryImage::new();
        let addr = memory.alloc(StructWriter::new(&layout).text("name", "abcdefgh").finish());
        let element = Element::load(&memory, addr, layout).unwrap();
        assert_eq!(element.text("name").unwrap(), "abcdefgh");
    }

    #[test]
    fn test_wrong_kind_and_missing_field() {
        let layout = sample_layout();
        let mut memory = MemoryImage::new();
        let addr = memory.alloc(StructWriter::new(&layout).finish());
        let element = Element::load(&memory, addr, layout).unwrap();

        assert_eq!(
            element.f32("count"),
            Err(DecodeError::FieldKind { structure: "sample", field: "count", expected: "float" })
        );
        assert_eq!(
            element.i32("cores"),
            Err(DecodeError::MissingField { structure: "sample", field: "cores" })
        );
        assert!(!element.has("cores"));
    }

    #[test]
    fn test_fixed_tables_are_count_gated() {
        let layout = sample_layout();
        let mut memory = MemoryImage::new();
        let bytes = StructWriter::new(&layout)
            .text_row("rows", 0, "a")
            .text_row("rows", 1, "bcd")
            .text_row("rows", 2, "zzz")
            .i32_at("refs", 0, 5)
            .i32_at("refs", 1, 6)
            .finish();
        let addr = memory.alloc(bytes);
        let element = Element::load(&memory, addr, layout).unwrap();

        assert_eq!(element.text_table("rows", 2).unwrap(), vec!["a", "bcd"]);
        assert!(element.text_table("rows", 0).unwrap().is_empty());
        assert!(element.text_table("rows", -1).unwrap().is_empty());
        assert_eq!(
            element.text_table("rows", 4),
            Err(DecodeError::CountExceedsLimit { field: "rows", count: 4, limit: 3 })
        );
        assert_eq!(element.i32_table("refs", 2).unwrap(), vec![5, 6]);
    }
}
