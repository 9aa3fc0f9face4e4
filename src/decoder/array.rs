//! Count-gated decoding of native `(count, pointer)` arrays.

use std::sync::Arc;

use tracing::{debug, trace};

use super::element::Element;
use super::layout::StructLayout;
use super::lazy::LazyText;
use super::memory::{NativeAddr, NativeMemory};
use super::reader::DataReader;
use crate::error::DecodeError;

/// A native array whose pointer may only be followed once its count has
/// been checked.
///
/// The only constructor is [`CountedArrayRef::new`], so every walk over
/// native array memory goes through the zero-count guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedArrayRef(Inner);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Inner {
    Empty,
    Populated { base: NativeAddr, count: usize, stride: usize },
}

impl CountedArrayRef {
    /// Checks a declared count against its pointer.
    ///
    /// A count of zero or less yields an empty array whatever the pointer
    /// holds; the pointer is only compared against null for logging.
    pub fn new(
        field: &'static str,
        count: i32,
        base: NativeAddr,
        stride: usize,
        limit: usize,
    ) -> Result<Self, DecodeError> {
        if count <= 0 {
            if !base.is_null() {
                debug!(field, count, pointer = %base, "ignoring stale array pointer");
            }
            return Ok(Self(Inner::Empty));
        }
        if base.is_null() {
            return Err(DecodeError::InconsistentCount { field, count });
        }
        let len = count as usize;
        if len > limit {
            return Err(DecodeError::CountExceedsLimit { field, count, limit });
        }
        Ok(Self(Inner::Populated { base, count: len, stride }))
    }

    pub fn len(&self) -> usize {
        match self.0 {
            Inner::Empty => 0,
            Inner::Populated { count, .. } => count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element addresses in index order.
    pub fn addresses(&self) -> Result<Vec<NativeAddr>, DecodeError> {
        self.decode(|_, addr| Ok(addr))
    }

    /// Runs `element` once per index, in order, with the element's address.
    ///
    /// Can be repeated; nothing beyond `count` elements is ever addressed.
    pub fn decode<T, F>(&self, mut element: F) -> Result<Vec<T>, DecodeError>
    where
        F: FnMut(usize, NativeAddr) -> Result<T, DecodeError>,
    {
        let Inner::Populated { base, count, stride } = self.0 else {
            return Ok(Vec::new());
        };
        trace!(pointer = %base, count, stride, "decoding counted array");
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(element(i, base.element(i, stride)?)?);
        }
        Ok(out)
    }
}

/// Something that can be stored in a native array.
pub trait ArrayElement: Sized {
    /// Extra description needed to decode one element.
    type Shape: Clone;

    fn stride(shape: &Self::Shape) -> usize;

    fn decode(
        memory: &dyn NativeMemory,
        addr: NativeAddr,
        shape: &Self::Shape,
    ) -> Result<Self, DecodeError>;
}

impl ArrayElement for i32 {
    type Shape = ();

    fn stride(_: &()) -> usize {
        4
    }

    fn decode(memory: &dyn NativeMemory, addr: NativeAddr, _: &()) -> Result<Self, DecodeError> {
        let bytes = memory.read(addr, 4)?;
        DataReader::new(&bytes, 0)
            .read_i32()
            .ok_or(DecodeError::UnmappedAddress { addr, len: 4 })
    }
}

impl ArrayElement for f32 {
    type Shape = ();

    fn stride(_: &()) -> usize {
        4
    }

    fn decode(memory: &dyn NativeMemory, addr: NativeAddr, _: &()) -> Result<Self, DecodeError> {
        let bytes = memory.read(addr, 4)?;
        DataReader::new(&bytes, 0)
            .read_f32()
            .ok_or(DecodeError::UnmappedAddress { addr, len: 4 })
    }
}

/// A `char *` slot of a `char **` array; the string itself stays unread.
impl ArrayElement for LazyText {
    /// Name of the array field, carried into errors.
    type Shape = &'static str;

    fn stride(_: &&'static str) -> usize {
        std::mem::size_of::<usize>()
    }

    fn decode(
        memory: &dyn NativeMemory,
        addr: NativeAddr,
        field: &&'static str,
    ) -> Result<Self, DecodeError> {
        let width = std::mem::size_of::<usize>();
        let bytes = memory.read(addr, width)?;
        let target = NativeAddr::from_ptr_bytes(&bytes)
            .ok_or(DecodeError::UnmappedAddress { addr, len: width })?;
        Ok(LazyText::new(field, target))
    }
}

impl ArrayElement for Element {
    type Shape = Arc<StructLayout>;

    fn stride(layout: &Arc<StructLayout>) -> usize {
        layout.size
    }

    fn decode(
        memory: &dyn NativeMemory,
        addr: NativeAddr,
        layout: &Arc<StructLayout>,
    ) -> Result<Self, DecodeError> {
        Element::load(memory, addr, Arc::clone(layout))
    }
}
