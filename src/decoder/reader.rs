// Helper for reading native-endian data at specific offsets
pub struct DataReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataReader<'a> {
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, pos: offset }
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.read_bytes(N)?.try_into().ok()
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        Some(self.read_bytes(1)?[0])
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.read_array().map(i32::from_ne_bytes)
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_array().map(f32::from_ne_bytes)
    }

    pub fn read_f64(&mut self) -> Option<f64> {
        self.read_array().map(f64::from_ne_bytes)
    }

    /// Reads a C `long` of the build target's width.
    pub fn read_long(&mut self) -> Option<i64> {
        const WIDTH: usize = std::mem::size_of::<std::ffi::c_long>();
        self.read_array::<WIDTH>().map(|b| std::ffi::c_long::from_ne_bytes(b) as i64)
    }

    pub fn read_ptr(&mut self) -> Option<super::NativeAddr> {
        let bytes = self.read_bytes(std::mem::size_of::<usize>())?;
        super::NativeAddr::from_ptr_bytes(bytes)
    }
}

/// Decodes a fixed `char[n]` buffer: up to the first NUL, or the whole
/// buffer when none is present. Returns `None` for invalid UTF-8.
pub fn decode_fixed_text(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok().map(str::to_string)
}
