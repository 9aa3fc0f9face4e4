use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DecodeError;

/// An address in the native library's address space.
///
/// Addresses are plain numbers; nothing is dereferenced without going
/// through a [`NativeMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NativeAddr(pub u64);

impl NativeAddr {
    pub const NULL: NativeAddr = NativeAddr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn offset(self, bytes: usize) -> Result<NativeAddr, DecodeError> {
        u64::try_from(bytes)
            .ok()
            .and_then(|b| self.0.checked_add(b))
            .map(NativeAddr)
            .ok_or(DecodeError::AddressOverflow { addr: self, offset: bytes })
    }

    /// Address of element `index` in an array of `stride`-byte elements.
    pub fn element(self, index: usize, stride: usize) -> Result<NativeAddr, DecodeError> {
        let offset = index
            .checked_mul(stride)
            .ok_or(DecodeError::AddressOverflow { addr: self, offset: usize::MAX })?;
        self.offset(offset)
    }

    /// Reads a pointer-sized native-endian value.
    pub fn from_ptr_bytes(bytes: &[u8]) -> Option<NativeAddr> {
        const WIDTH: usize = std::mem::size_of::<usize>();
        let raw: [u8; WIDTH] = bytes.get(..WIDTH)?.try_into().ok()?;
        Some(NativeAddr(usize::from_ne_bytes(raw) as u64))
    }

    /// Encodes the address the way the native side stores a pointer.
    pub fn to_ptr_bytes(self) -> Vec<u8> {
        (self.0 as usize).to_ne_bytes().to_vec()
    }
}

impl fmt::Display for NativeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for NativeAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parses `0x`-prefixed hex or plain decimal.
impl FromStr for NativeAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => u64::from_str_radix(digits, 16),
            None => s.parse(),
        };
        parsed.map(NativeAddr).map_err(|e| format!("invalid address {s:?}: {e}"))
    }
}

impl<'de> Deserialize<'de> for NativeAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(NativeAddr(n)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Read-only access to native memory.
pub trait NativeMemory: Send + Sync {
    /// Copies `len` bytes starting at `addr`.
    fn read(&self, addr: NativeAddr, len: usize) -> Result<Vec<u8>, DecodeError>;

    /// Copies a NUL terminated string of at most `max_len` bytes, terminator excluded.
    fn read_cstr(&self, addr: NativeAddr, max_len: usize) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        for i in 0..=max_len {
            let byte = self.read(addr.offset(i)?, 1)?;
            match byte.first() {
                Some(0) => return Ok(out),
                Some(&b) if i < max_len => out.push(b),
                _ => break,
            }
        }
        Err(DecodeError::UnterminatedText { addr, max_len })
    }
}

/// A synthetic address space made of explicitly mapped byte regions.
///
/// Backs snapshot replay and tests. Every read is counted so callers can
/// assert that a decode touched no memory at all.
#[derive(Debug)]
pub struct MemoryImage {
    regions: BTreeMap<u64, Vec<u8>>,
    next: u64,
    reads: AtomicUsize,
}

const FIRST_ALLOC: u64 = 0x1000;
const ALLOC_ALIGN: u64 = 16;
// Unmapped gap between allocations so overruns fault instead of
// silently reading a neighbour.
const ALLOC_GAP: u64 = 64;

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryImage {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next: FIRST_ALLOC,
            reads: AtomicUsize::new(0),
        }
    }

    /// Maps `bytes` at `base`. Fails if the region overlaps an existing one.
    pub fn map(&mut self, base: NativeAddr, bytes: Vec<u8>) -> Result<(), String> {
        if base.is_null() {
            return Err("cannot map a region at address 0".to_string());
        }
        let end = base
            .0
            .checked_add(bytes.len() as u64)
            .ok_or_else(|| format!("region at {base} overflows the address space"))?;

        if let Some((&prev, prev_bytes)) = self.regions.range(..=base.0).next_back() {
            if prev + prev_bytes.len() as u64 > base.0 {
                return Err(format!("region at {base} overlaps region at {:#x}", prev));
            }
        }
        if let Some((&next, _)) = self.regions.range(base.0..).next() {
            if next < end {
                return Err(format!("region at {base} overlaps region at {:#x}", next));
            }
        }

        let aligned_end = end.div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN + ALLOC_GAP;
        self.next = self.next.max(aligned_end);
        self.regions.insert(base.0, bytes);
        Ok(())
    }

    /// Maps `bytes` at a fresh, aligned address and returns it.
    pub fn alloc(&mut self, bytes: Vec<u8>) -> NativeAddr {
        let base = NativeAddr(self.next);
        let len = bytes.len().max(1) as u64;
        self.next = (self.next + len).div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN + ALLOC_GAP;
        let bytes = if bytes.is_empty() { vec![0] } else { bytes };
        self.regions.insert(base.0, bytes);
        base
    }

    /// Overwrites mapped bytes in place.
    pub fn write(&mut self, addr: NativeAddr, bytes: &[u8]) -> Result<(), DecodeError> {
        let (base, region) = self
            .regions
            .range_mut(..=addr.0)
            .next_back()
            .ok_or(DecodeError::UnmappedAddress { addr, len: bytes.len() })?;
        let start = (addr.0 - base) as usize;
        let slot = region
            .get_mut(start..start + bytes.len())
            .ok_or(DecodeError::UnmappedAddress { addr, len: bytes.len() })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn regions(&self) -> impl Iterator<Item = (NativeAddr, &[u8])> {
        self.regions.iter().map(|(&base, bytes)| (NativeAddr(base), bytes.as_slice()))
    }
}

impl NativeMemory for MemoryImage {
    fn read(&self, addr: NativeAddr, len: usize) -> Result<Vec<u8>, DecodeError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let unmapped = DecodeError::UnmappedAddress { addr, len };
        let (base, region) = self.regions.range(..=addr.0).next_back().ok_or(unmapped.clone())?;
        let start = usize::try_from(addr.0 - base).map_err(|_| unmapped.clone())?;
        let end = start.checked_add(len).ok_or(unmapped.clone())?;
        region.get(start..end).map(<[u8]>::to_vec).ok_or(unmapped)
    }
}

/// Memory of the current process, as handed back by the linked library.
#[cfg(feature = "liblsf")]
#[derive(Debug)]
pub struct ProcessMemory {
    _private: (),
}

#[cfg(feature = "liblsf")]
impl ProcessMemory {
    /// # Safety
    ///
    /// Every address later passed to [`NativeMemory::read`] must point into
    /// memory owned by the native library that stays valid for the read.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(feature = "liblsf")]
impl NativeMemory for ProcessMemory {
    fn read(&self, addr: NativeAddr, len: usize) -> Result<Vec<u8>, DecodeError> {
        if addr.is_null() {
            return Err(DecodeError::UnmappedAddress { addr, len });
        }
        addr.offset(len)?;
        // SAFETY: the constructor's contract makes the caller vouch for
        // every address; null was rejected above.
        let bytes = unsafe { std::slice::from_raw_parts(addr.0 as usize as *const u8, len) };
        Ok(bytes.to_vec())
    }

    fn read_cstr(&self, addr: NativeAddr, max_len: usize) -> Result<Vec<u8>, DecodeError> {
        if addr.is_null() {
            return Err(DecodeError::UnmappedAddress { addr, len: 1 });
        }
        let ptr = addr.0 as usize as *const u8;
        let mut out = Vec::new();
        for i in 0..=max_len {
            // SAFETY: as in `read`; the scan stops at the terminator.
            let byte = unsafe { *ptr.add(i) };
            if byte == 0 {
                return Ok(out);
            }
            if i == max_len {
                break;
            }
            out.push(byte);
        }
        Err(DecodeError::UnterminatedText { addr, max_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        assert_eq!("0x1000".parse::<NativeAddr>().unwrap(), NativeAddr(0x1000));
        assert_eq!("4096".parse::<NativeAddr>().unwrap(), NativeAddr(4096));
        assert!("0xzz".parse::<NativeAddr>().is_err());

        let addr: NativeAddr = serde_json::from_str("\"0x2a\"").unwrap();
        assert_eq!(addr, NativeAddr(42));
        let addr: NativeAddr = serde_json::from_str("42").unwrap();
        assert_eq!(addr, NativeAddr(42));
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"0x2a\"");
    }

    #[test]
    fn test_alloc_and_read() {
        let mut mem = MemoryImage::new();
        let a = mem.alloc(vec![1, 2, 3, 4]);
        let b = mem.alloc(vec![5, 6]);
        assert_eq!(a.0 % ALLOC_ALIGN, 0);
        assert!(b.0 > a.0 + 4);

        assert_eq!(mem.read(a, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(mem.read(a.offset(2).unwrap(), 2).unwrap(), vec![3, 4]);
        assert_eq!(mem.read(b, 2).unwrap(), vec![5, 6]);
        assert_eq!(mem.reads(), 3);
    }

    #[test]
    fn test_unmapped_reads_fail() {
        let mut mem = MemoryImage::new();
        let a = mem.alloc(vec![0; 8]);

        assert!(matches!(
            mem.read(a.offset(4).unwrap(), 8),
            Err(DecodeError::UnmappedAddress { .. })
        ));
        assert!(matches!(
            mem.read(NativeAddr(0xdead_beef), 1),
            Err(DecodeError::UnmappedAddress { .. })
        ));
        assert!(matches!(mem.read(NativeAddr::NULL, 1), Err(DecodeError::UnmappedAddress { .. })));
    }

    #[test]
    fn test_map_rejects_overlap() {
        let mut mem = MemoryImage::new();
        mem.map(NativeAddr(0x10000), vec![0; 32]).unwrap();
        assert!(mem.map(NativeAddr(0x10010), vec![0; 4]).is_err());
        assert!(mem.map(NativeAddr(0xfff8), vec![0; 16]).is_err());
        assert!(mem.map(NativeAddr(0x10020), vec![0; 4]).is_ok());
        assert!(mem.map(NativeAddr::NULL, vec![0; 4]).is_err());

        // allocations land past mapped regions
        let a = mem.alloc(vec![1]);
        assert!(a.0 > 0x10024);
    }

    #[test]
    fn test_read_cstr() {
        let mut mem = MemoryImage::new();
        let s = mem.alloc(b"linux\0".to_vec());
        assert_eq!(mem.read_cstr(s, 64).unwrap(), b"linux");
        assert_eq!(mem.read_cstr(s, 5).unwrap(), b"linux");
        assert!(matches!(
            mem.read_cstr(s, 3),
            Err(DecodeError::UnterminatedText { max_len: 3, .. })
        ));

        let unterminated = mem.alloc(b"abc".to_vec());
        assert!(matches!(
            mem.read_cstr(unterminated, 64),
            Err(DecodeError::UnmappedAddress { .. })
        ));
    }

    #[test]
    fn test_addr_arithmetic() {
        assert_eq!(NativeAddr(0x1000).element(3, 16).unwrap(), NativeAddr(0x1030));
        assert!(NativeAddr(u64::MAX).offset(1).is_err());
        assert!(NativeAddr(8).element(usize::MAX, 2).is_err());
        assert_eq!(NativeAddr(0x2a).to_string(), "0x2a");

        let bytes = NativeAddr(0x1234).to_ptr_bytes();
        assert_eq!(NativeAddr::from_ptr_bytes(&bytes), Some(NativeAddr(0x1234)));
    }

    #[test]
    fn test_write_in_place() {
        let mut mem = MemoryImage::new();
        let a = mem.alloc(vec![0; 4]);
        mem.write(a.offset(1).unwrap(), &[9, 9]).unwrap();
        assert_eq!(mem.read(a, 4).unwrap(), vec![0, 9, 9, 0]);
        assert!(mem.write(a.offset(3).unwrap(), &[1, 1]).is_err());
    }
}
