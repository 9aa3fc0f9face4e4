//! Safe, count-gated decoding of native structures.
//!
//! Native memory is reached only through [`NativeMemory`]. Structures are
//! copied out whole into an [`Element`]; arrays are walked only after a
//! [`CountedArrayRef`] has checked their count; pointer fields come back as
//! [`LazyText`] or [`LazyArray`] handles that the caller resolves.

mod array;
mod element;
mod layout;
mod layouts;
mod lazy;
mod memory;
mod reader;

pub use array::{ArrayElement, CountedArrayRef};
pub use element::Element;
pub use layout::{Field, FieldKind, LayoutBuilder, StructLayout};
pub use layouts::{Layouts, RUSAGE_FIELDS, sizes};
pub use lazy::{CountSource, LazyArray, LazyText};
#[cfg(feature = "liblsf")]
pub use memory::ProcessMemory;
pub use memory::{MemoryImage, NativeAddr, NativeMemory};
pub use reader::{DataReader, decode_fixed_text};
