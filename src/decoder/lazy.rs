//! Pointer fields that stay unread until their size is known.

use std::fmt;

use super::array::{ArrayElement, CountedArrayRef};
use super::memory::{NativeAddr, NativeMemory};
use crate::error::DecodeError;

/// A `char *` field that has not been followed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyText {
    field: &'static str,
    addr: NativeAddr,
}

impl LazyText {
    pub fn new(field: &'static str, addr: NativeAddr) -> Self {
        Self { field, addr }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn addr(&self) -> NativeAddr {
        self.addr
    }

    /// Follows the pointer. A null pointer is an absent string.
    pub fn resolve(
        self,
        memory: &dyn NativeMemory,
        max_len: usize,
    ) -> Result<Option<String>, DecodeError> {
        if self.addr.is_null() {
            return Ok(None);
        }
        let bytes = memory.read_cstr(self.addr, max_len)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| DecodeError::InvalidText { field: self.field })
    }
}

/// Where the length of a lazy array comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    /// Another field of the same structure.
    Sibling(&'static str),
    /// A value from outside the structure, such as another query's result.
    External(&'static str),
}

impl fmt::Display for CountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountSource::Sibling(name) => write!(f, "sibling field {name}"),
            CountSource::External(name) => write!(f, "external {name}"),
        }
    }
}

/// A pointer to a variable-length array, decoded only when given a count.
pub struct LazyArray<T: ArrayElement> {
    field: &'static str,
    base: NativeAddr,
    shape: T::Shape,
    count_source: CountSource,
}

impl<T: ArrayElement> fmt::Debug for LazyArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyArray")
            .field("field", &self.field)
            .field("base", &self.base)
            .field("count_source", &self.count_source)
            .finish()
    }
}

impl<T: ArrayElement> LazyArray<T> {
    pub fn new(
        field: &'static str,
        base: NativeAddr,
        shape: T::Shape,
        count_source: CountSource,
    ) -> Self {
        Self { field, base, shape, count_source }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn count_source(&self) -> CountSource {
        self.count_source
    }

    /// Compares the pointer against null without following it.
    pub fn is_null(&self) -> bool {
        self.base.is_null()
    }

    /// Gates the pointer on `count` and hands back the checked array.
    pub fn gate(&self, count: i32, limit: usize) -> Result<CountedArrayRef, DecodeError> {
        CountedArrayRef::new(self.field, count, self.base, T::stride(&self.shape), limit)
    }

    /// Decodes `count` elements. Consumes the handle so it resolves once.
    pub fn resolve(
        self,
        memory: &dyn NativeMemory,
        count: i32,
        limit: usize,
    ) -> Result<Vec<T>, DecodeError> {
        let array = self.gate(count, limit)?;
        array.decode(|_, addr| T::decode(memory, addr, &self.shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MemoryImage;

    #[test]
    fn test_lazy_text() {
        let mut memory = MemoryImage::new();
        let addr = memory.alloc(b"hostA\0".to_vec());
        let text = LazyText::new("hostType", addr);
        assert_eq!(memory.reads(), 0);
        assert_eq!(text.resolve(&memory, 64).unwrap().as_deref(), Some("hostA"));

        let null = LazyText::new("hostType", NativeAddr::NULL);
        assert_eq!(null.resolve(&memory, 64).unwrap(), None);

        let bad = memory.alloc(vec![0xc3, 0x28, 0]);
        assert_eq!(
            LazyText::new("windows", bad).resolve(&memory, 64),
            Err(DecodeError::InvalidText { field: "windows" })
        );
    }

    #[test]
    fn test_lazy_string_array() {
        let mut memory = MemoryImage::new();
        let a = memory.alloc(b"mem\0".to_vec());
        let b = memory.alloc(b"swp\0".to_vec());
        let mut table = a.to_ptr_bytes();
        table.extend(b.to_ptr_bytes());
        let base = memory.alloc(table);

        let lazy: LazyArray<LazyText> =
            LazyArray::new("resources", base, "resources", CountSource::Sibling("nRes"));
        assert_eq!(lazy.count_source(), CountSource::Sibling("nRes"));
        let slots = lazy.resolve(&memory, 2, 16).unwrap();
        let names: Vec<_> = slots
            .into_iter()
            .map(|s| s.resolve(&memory, 64).unwrap().unwrap())
            .collect();
        assert_eq!(names, vec!["mem", "swp"]);
    }

    #[test]
    fn test_lazy_array_zero_count_reads_nothing() {
        let memory = MemoryImage::new();
        let lazy: LazyArray<f32> =
            LazyArray::new("li", NativeAddr(0xbad0), (), CountSource::External("numIndx"));
        assert!(lazy.resolve(&memory, 0, 16).unwrap().is_empty());
        assert_eq!(memory.reads(), 0);
    }
}
