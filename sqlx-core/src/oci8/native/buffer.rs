use super::constants::{IND_NOT_NULL, IND_NULL, IND_TRUNCATED_UNKNOWN};

/// A fixed-stride array of native values with parallel length and
/// null-indicator arrays, the shape OCI reads binds from and writes
/// fetched rows into.
///
/// Every row slot is `element_size` bytes wide. The indicator of a slot
/// follows the OCI convention: `-1` for null, `0` for a complete value and a
/// positive number (the untruncated length) or `-2` when the value did not
/// fit.
#[derive(Debug, Clone)]
pub struct NativeBuffer {
    data_type: u16,
    element_size: usize,
    data: Vec<u8>,
    lengths: Vec<u32>,
    indicators: Vec<i16>,
}

impl NativeBuffer {
    /// Allocate `rows` null slots of `element_size` bytes each.
    pub fn new(data_type: u16, element_size: usize, rows: usize) -> Self {
        Self {
            data_type,
            element_size,
            data: vec![0; element_size * rows],
            lengths: vec![0; rows],
            indicators: vec![IND_NULL; rows],
        }
    }

    pub fn data_type(&self) -> u16 {
        self.data_type
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn rows(&self) -> usize {
        self.indicators.len()
    }

    pub fn indicator(&self, row: usize) -> i16 {
        self.indicators[row]
    }

    pub fn set_indicator(&mut self, row: usize, indicator: i16) {
        self.indicators[row] = indicator;
    }

    pub fn length(&self, row: usize) -> usize {
        self.lengths[row] as usize
    }

    pub fn set_length(&mut self, row: usize, len: usize) {
        self.lengths[row] = u32::try_from(len).unwrap_or(u32::MAX);
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.indicators[row] == IND_NULL
    }

    pub fn is_truncated(&self, row: usize) -> bool {
        self.indicators[row] > 0 || self.indicators[row] == IND_TRUNCATED_UNKNOWN
    }

    /// The whole slot, regardless of the recorded length.
    pub fn slot(&self, row: usize) -> &[u8] {
        let start = row * self.element_size;
        &self.data[start..start + self.element_size]
    }

    pub fn slot_mut(&mut self, row: usize) -> &mut [u8] {
        let start = row * self.element_size;
        &mut self.data[start..start + self.element_size]
    }

    /// The bytes of a slot as recorded by its length, `None` when the
    /// indicator says null.
    pub fn value(&self, row: usize) -> Option<&[u8]> {
        if self.is_null(row) {
            return None;
        }

        let len = self.length(row).min(self.element_size);
        Some(&self.slot(row)[..len])
    }

    /// Write a value (or null) into a slot.
    ///
    /// A value longer than the slot is cut to fit and the indicator records
    /// the original length, as the native library does on fetch. Returns
    /// `false` in that case.
    pub fn write(&mut self, row: usize, value: Option<&[u8]>) -> bool {
        let element_size = self.element_size;
        let slot = self.slot_mut(row);
        slot.fill(0);

        match value {
            None => {
                self.lengths[row] = 0;
                self.indicators[row] = IND_NULL;
                true
            }

            Some(bytes) if bytes.len() <= element_size => {
                slot[..bytes.len()].copy_from_slice(bytes);
                self.lengths[row] = bytes.len() as u32;
                self.indicators[row] = IND_NOT_NULL;
                true
            }

            Some(bytes) => {
                slot.copy_from_slice(&bytes[..element_size]);
                self.lengths[row] = element_size as u32;
                self.indicators[row] =
                    i16::try_from(bytes.len()).unwrap_or(IND_TRUNCATED_UNKNOWN);
                false
            }
        }
    }

    /// Clear a slot back to null with zeroed bytes.
    pub fn reset(&mut self, row: usize) {
        self.slot_mut(row).fill(0);
        self.lengths[row] = 0;
        self.indicators[row] = IND_NULL;
    }

    /// Bytes held by the buffer and its parallel arrays.
    pub fn allocated_bytes(&self) -> usize {
        self.data.len() + self.lengths.len() * 4 + self.indicators.len() * 2
    }
}

/// How a placeholder is addressed on the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// 1-based position.
    Position(u32),
    /// Name without the leading colon.
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDirection {
    In,
    Out,
    InOut,
}

impl BindDirection {
    pub fn is_input(self) -> bool {
        matches!(self, BindDirection::In | BindDirection::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, BindDirection::Out | BindDirection::InOut)
    }
}

/// What `OCIBindByPos`/`OCIBindByName` are told about a parameter.
#[derive(Debug, Clone)]
pub struct BindDesc {
    pub placeholder: Placeholder,
    pub data_type: u16,
    pub element_size: usize,
    pub direction: BindDirection,
    /// Value is supplied piecewise after execute reports `OCI_NEED_DATA`.
    pub data_at_exec: bool,
}

/// A registered bind together with the buffer execute reads from (and,
/// for output binds, writes back into).
#[derive(Debug)]
pub struct BindBuffer {
    pub(crate) desc: BindDesc,
    pub(crate) buffer: NativeBuffer,
}

impl BindBuffer {
    pub fn new(desc: BindDesc, buffer: NativeBuffer) -> Self {
        Self { desc, buffer }
    }

    pub fn desc(&self) -> &BindDesc {
        &self.desc
    }

    pub fn buffer(&self) -> &NativeBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut NativeBuffer {
        &mut self.buffer
    }
}

/// What `OCIDefineByPos` is told about a result column.
#[derive(Debug, Clone)]
pub struct DefineDesc {
    /// 1-based column position.
    pub position: u32,
    pub data_type: u16,
    pub element_size: usize,
}

/// A registered define together with the buffer fetch writes into.
#[derive(Debug)]
pub struct DefineBuffer {
    pub(crate) desc: DefineDesc,
    pub(crate) buffer: NativeBuffer,
}

impl DefineBuffer {
    pub fn new(desc: DefineDesc, buffer: NativeBuffer) -> Self {
        Self { desc, buffer }
    }

    pub fn desc(&self) -> &DefineDesc {
        &self.desc
    }

    pub fn buffer(&self) -> &NativeBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut NativeBuffer {
        &mut self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci8::native::constants::SQLT_CHR;

    #[test]
    fn it_records_truncation_in_the_indicator() {
        let mut buf = NativeBuffer::new(SQLT_CHR, 4, 2);

        assert!(buf.write(0, Some(b"abc")));
        assert!(!buf.write(1, Some(b"abcdef")));

        assert_eq!(buf.value(0), Some(&b"abc"[..]));
        assert!(!buf.is_truncated(0));
        assert!(buf.is_truncated(1));
        assert_eq!(buf.indicator(1), 6);
        assert_eq!(buf.value(1), Some(&b"abcd"[..]));
    }

    #[test]
    fn it_hides_stale_bytes_behind_a_null_indicator() {
        let mut buf = NativeBuffer::new(SQLT_CHR, 8, 1);
        buf.write(0, Some(b"stale"));
        buf.set_indicator(0, IND_NULL);

        assert!(buf.value(0).is_none());

        buf.reset(0);
        assert!(buf.slot(0).iter().all(|b| *b == 0));
    }
}
