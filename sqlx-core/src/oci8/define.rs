//! Output buffers of a result set and the decoding of fetched rows.

use std::sync::Arc;

use chrono_tz::Tz;

use crate::error::{Error, FetchError};
use crate::oci8::codec::{NativeKind, LOCATOR_LEN, NUMBER_TEXT_LEN};
use crate::oci8::handle::{HandleSet, OwnedHandle};
use crate::oci8::native::constants::*;
use crate::oci8::native::{
    AttrKind, ColumnDescription, DefineBuffer, DefineDesc, HandleType, NativeBuffer, RawHandle,
};
use crate::oci8::options::Oci8ConnectOptions;
use crate::oci8::rows::CancelSignal;
use crate::oci8::status::{check, translate, ErrorScope, Outcome};
use crate::oci8::{Oci8Column, Oci8DataType, Oci8Row, Oci8Value};

/// Widest `ROWID`/`UROWID` text the driver expects.
const ROWID_TEXT_LEN: usize = 4000;

/// Bytes one character can take once converted to the client character set.
const MAX_BYTES_PER_CHAR: usize = 4;

/// How a column is fetched, derived from its description.
pub(crate) fn fetch_kind(data_type: Oci8DataType) -> NativeKind {
    match data_type {
        Oci8DataType::Number {
            precision: 1..=18,
            scale: 0,
        } => NativeKind::Integer,
        Oci8DataType::Number { .. } | Oci8DataType::Float { .. } => NativeKind::NumberText,
        Oci8DataType::BinaryFloat => NativeKind::Float,
        Oci8DataType::BinaryDouble => NativeKind::Double,
        Oci8DataType::Long => NativeKind::LongText,
        Oci8DataType::LongRaw => NativeKind::LongBinary,
        Oci8DataType::Raw => NativeKind::Binary,
        Oci8DataType::Date => NativeKind::Date,
        Oci8DataType::Timestamp => NativeKind::Timestamp,
        Oci8DataType::TimestampTz | Oci8DataType::TimestampLtz => NativeKind::TimestampTz,
        Oci8DataType::IntervalYearToMonth => NativeKind::IntervalYearToMonth,
        Oci8DataType::IntervalDayToSecond => NativeKind::IntervalDayToSecond,
        Oci8DataType::Clob | Oci8DataType::NClob => NativeKind::Clob,
        Oci8DataType::Blob => NativeKind::Blob,
        Oci8DataType::Varchar2
        | Oci8DataType::NVarchar2
        | Oci8DataType::Char
        | Oci8DataType::NChar
        | Oci8DataType::RowId
        | Oci8DataType::URowId
        | Oci8DataType::Null
        | Oci8DataType::Unknown(_) => NativeKind::Text,
    }
}

fn element_size(kind: NativeKind, desc: &ColumnDescription, data_type: Oci8DataType, long: usize) -> usize {
    if let Some(len) = kind.fixed_len() {
        return len;
    }

    match (kind, data_type) {
        (NativeKind::NumberText, _) => NUMBER_TEXT_LEN,
        (NativeKind::LongText, _) | (NativeKind::LongBinary, _) => long,
        (_, Oci8DataType::RowId | Oci8DataType::URowId) => ROWID_TEXT_LEN,
        (NativeKind::Binary, _) => usize::from(desc.data_size).max(1),
        _ => usize::from(desc.data_size).max(1) * MAX_BYTES_PER_CHAR,
    }
}

/// The defines of one result set plus the window of rows last fetched.
///
/// Dropping the set releases every buffer and LOB locator it owns.
#[derive(Debug)]
pub(crate) struct DefineSet {
    columns: Arc<[Oci8Column]>,
    defines: Vec<DefineBuffer>,
    kinds: Vec<NativeKind>,
    /// One locator per window slot for LOB columns, empty otherwise.
    locators: Vec<Vec<OwnedHandle>>,
    window: u32,
    fetched: usize,
    next: usize,
    /// The library reported the end of the result set.
    drained: bool,
    timezone: Tz,
    lob_chunk_size: usize,
}

impl DefineSet {
    /// Describe the select list of an executed query and register a buffer
    /// for every column.
    pub(crate) fn define_columns(
        handles: &HandleSet,
        stmt: RawHandle,
        options: &Oci8ConnectOptions,
    ) -> Result<Self, Error> {
        let api = handles.api();
        let err = handles.err()?;
        let logger = handles.logger();

        let (status, count) = api.attr_get(stmt, HandleType::Stmt, AttrKind::ParamCount, err);
        check(api, status, err, ErrorScope::Fetch, "OCIAttrGet(OCI_ATTR_PARAM_COUNT)", logger)?;
        let count = count
            .as_u64()
            .ok_or_else(|| err_protocol!("OCI_ATTR_PARAM_COUNT returned {:?}", count))?;

        let window = options.fetch_window();
        let rows = window as usize;

        let mut columns = Vec::new();
        let mut defines = Vec::new();
        let mut kinds = Vec::new();
        let mut all_locators = Vec::new();

        for position in 1..=u32::try_from(count).unwrap_or(u32::MAX) {
            let (status, desc) = api.param_get(stmt, err, position);
            check(api, status, err, ErrorScope::Fetch, "OCIParamGet", logger)?;
            let desc = desc.ok_or_else(|| err_protocol!("OCIParamGet described nothing at {}", position))?;

            let column = Oci8Column::from_description(columns.len(), &desc);
            let data_type = column.type_info.data_type();
            let kind = fetch_kind(data_type);
            let size = element_size(kind, &desc, data_type, options.long_buffer_size);

            let define = DefineDesc {
                position,
                data_type: kind.sqlt(),
                element_size: size,
            };

            let status = api.define_by_pos(stmt, err, position, &define);
            check(api, status, err, ErrorScope::Fetch, "OCIDefineByPos", logger)?;

            let mut buffer = NativeBuffer::new(kind.sqlt(), size, rows);
            let mut locators = Vec::new();

            if kind.is_lob() {
                locators.reserve(rows);

                for row in 0..rows {
                    let locator = handles.alloc(HandleType::LobLocator, ErrorScope::Fetch)?;
                    let id = locator.raw().get() as u64;

                    buffer.slot_mut(row).copy_from_slice(&id.to_ne_bytes());
                    buffer.set_length(row, LOCATOR_LEN);
                    locators.push(locator);
                }
            }

            defines.push(DefineBuffer::new(define, buffer));
            kinds.push(kind);
            all_locators.push(locators);
            columns.push(column);
        }

        Ok(DefineSet {
            columns: columns.into(),
            defines,
            kinds,
            locators: all_locators,
            window,
            fetched: 0,
            next: 0,
            drained: false,
            timezone: options.timezone,
            lob_chunk_size: options.lob_chunk_size,
        })
    }

    pub(crate) fn columns(&self) -> &Arc<[Oci8Column]> {
        &self.columns
    }

    /// `true` once every fetched row was handed out and the library has no
    /// more.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.drained && self.next >= self.fetched
    }

    pub(crate) fn has_buffered_row(&self) -> bool {
        self.next < self.fetched
    }

    /// Fetch the next window of rows.
    pub(crate) fn fetch(&mut self, handles: &HandleSet, stmt: RawHandle) -> Result<(), Error> {
        let api = handles.api();
        let err = handles.err()?;
        let logger = handles.logger();

        let status = api.stmt_fetch(stmt, err, &mut self.defines, self.window, OCI_FETCH_NEXT, OCI_DEFAULT);

        match translate(api, status, err, HandleType::Error) {
            Outcome::Success => {}
            // truncated values are reported per column by their indicator
            Outcome::SuccessWithInfo(message) => {
                logger.notice(format_args!("OCIStmtFetch2: {}", message))
            }
            Outcome::Error { code, .. } if code == ORA_FETCHED_COLUMN_TRUNCATED => {}
            Outcome::NoData => self.drained = true,
            other => other.ok_or_error(ErrorScope::Fetch, "OCIStmtFetch2", logger)?,
        }

        let (status, fetched) = api.attr_get(stmt, HandleType::Stmt, AttrKind::RowsFetched, err);
        check(api, status, err, ErrorScope::Fetch, "OCIAttrGet(OCI_ATTR_ROWS_FETCHED)", logger)?;

        self.fetched = fetched.as_u64().unwrap_or(0).min(u64::from(self.window)) as usize;
        self.next = 0;

        if self.fetched == 0 {
            self.drained = true;
        }

        Ok(())
    }

    /// Decode the next buffered row, reading LOBs chunk by chunk.
    pub(crate) fn materialize(
        &mut self,
        handles: &HandleSet,
        cancel: &CancelSignal,
    ) -> Result<Oci8Row, Error> {
        let row = self.next;
        self.next += 1;

        let mut values = Vec::with_capacity(self.defines.len());

        for (column, (define, kind)) in self.defines.iter().zip(&self.kinds).enumerate() {
            let buffer = define.buffer();

            if buffer.is_null(row) {
                values.push(Oci8Value::Null);
                continue;
            }

            if buffer.is_truncated(row) {
                return Err(FetchError::Truncated {
                    column,
                    len: usize::try_from(buffer.indicator(row)).unwrap_or(buffer.element_size()),
                    capacity: buffer.element_size(),
                }
                .into());
            }

            let value = if kind.is_lob() {
                let locator = self.locators[column]
                    .get(row)
                    .map(OwnedHandle::raw)
                    .ok_or_else(|| err_protocol!("no locator for row {} of column {}", row, column))?;

                let bytes = read_lob(handles, locator, self.lob_chunk_size, cancel)?;

                match kind {
                    NativeKind::Clob => String::from_utf8(bytes)
                        .map(Oci8Value::Text)
                        .map_err(|e| FetchError::Malformed {
                            column,
                            message: e.to_string(),
                        })?,
                    _ => Oci8Value::Binary(bytes),
                }
            } else {
                let bytes = buffer.value(row).unwrap_or_default();

                kind.decode(bytes, self.timezone)
                    .map_err(|message| FetchError::Malformed { column, message })?
            };

            values.push(value);
        }

        Ok(Oci8Row {
            columns: Arc::clone(&self.columns),
            values,
        })
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        self.defines
            .iter()
            .map(|define| define.buffer().allocated_bytes())
            .sum()
    }
}

/// Close an open cursor early with a zero-row fetch.
///
/// The outcome only matters to the notice log.
pub(crate) fn cancel_cursor(handles: &HandleSet, stmt: RawHandle) {
    let Ok(err) = handles.err() else { return };
    let api = handles.api();

    let status = api.stmt_fetch(stmt, err, &mut [], 0, OCI_FETCH_NEXT, OCI_DEFAULT);

    match translate(api, status, err, HandleType::Error) {
        Outcome::Success | Outcome::NoData => {}
        Outcome::SuccessWithInfo(message) => {
            handles.logger().notice(format_args!("OCIStmtFetch2: {}", message))
        }
        other => handles
            .logger()
            .notice(format_args!("cancelling the cursor failed: {:?}", other)),
    }
}

/// Read a whole LOB, `chunk` bytes per round-trip.
fn read_lob(
    handles: &HandleSet,
    locator: RawHandle,
    chunk: usize,
    cancel: &CancelSignal,
) -> Result<Vec<u8>, Error> {
    let api = handles.api();
    let err = handles.err()?;
    let svc = handles.svc()?;

    let mut data = Vec::new();
    let mut buf = vec![0_u8; chunk.max(1)];

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (status, read) = api.lob_read(svc, err, locator, data.len() as u64, &mut buf);
        let read = read.min(buf.len());

        match translate(api, status, err, HandleType::Error) {
            Outcome::NeedData if read == 0 => {
                return Err(err_protocol!("OCILobRead2 wants to continue but returned no data"))
            }
            Outcome::NeedData => data.extend_from_slice(&buf[..read]),
            Outcome::NoData => return Ok(data),
            outcome => {
                outcome.ok_or_error(ErrorScope::Fetch, "OCILobRead2", handles.logger())?;
                data.extend_from_slice(&buf[..read]);
                return Ok(data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_fetches_small_integers_natively() {
        let kind = |precision, scale| fetch_kind(Oci8DataType::Number { precision, scale });

        assert_eq!(kind(10, 0), NativeKind::Integer);
        assert_eq!(kind(18, 0), NativeKind::Integer);
        assert_eq!(kind(19, 0), NativeKind::NumberText);
        assert_eq!(kind(10, 2), NativeKind::NumberText);
        assert_eq!(kind(0, -127), NativeKind::NumberText);
        assert_eq!(fetch_kind(Oci8DataType::Unknown(999)), NativeKind::Text);
        assert_eq!(fetch_kind(Oci8DataType::NClob), NativeKind::Clob);
    }

    #[test]
    fn it_caps_text_buffers_by_character_width() {
        let desc = ColumnDescription {
            name: "NAME".into(),
            data_type: SQLT_CHR,
            data_size: 30,
            precision: 0,
            scale: 0,
            nullable: true,
            charset_form: SQLCS_IMPLICIT,
        };

        assert_eq!(element_size(NativeKind::Text, &desc, Oci8DataType::Varchar2, 100), 120);
        assert_eq!(element_size(NativeKind::Binary, &desc, Oci8DataType::Raw, 100), 30);
        assert_eq!(element_size(NativeKind::LongText, &desc, Oci8DataType::Long, 100), 100);
        assert_eq!(element_size(NativeKind::Date, &desc, Oci8DataType::Date, 100), 7);
    }
}
