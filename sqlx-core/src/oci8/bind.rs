//! Encoding of parameters into native bind buffers.
//!
//! Each parameter gets one [`BindBuffer`] holding a slot per row of the
//! batch, sized to the widest value any row supplies. Values longer than
//! the piece size are not copied into the buffer at all: they are bound for
//! data-at-execution and handed over piece by piece when execute asks.

use std::borrow::Cow;

use chrono_tz::Tz;

use crate::error::{BindError, Error};
use crate::logger::NoticeLogger;
use crate::oci8::arguments::{Oci8Argument, Oci8Arguments};
use crate::oci8::codec::{encode_value, NativeKind, NUMBER_TEXT_LEN};
use crate::oci8::native::constants::{IND_NOT_NULL, IND_NULL};
use crate::oci8::native::{
    BindBuffer, BindDesc, BindDirection, NativeBuffer, OciApi, Piece, PieceRequest, Placeholder,
    RawHandle,
};
use crate::oci8::options::PlaceholderStyle;
use crate::oci8::query_result::Oci8OutValue;
use crate::oci8::status::{check, ErrorScope};
use crate::oci8::Oci8Value;
use crate::type_info::TypeInfo;

/// What the encoder remembers about a parameter beyond its buffer.
#[derive(Debug)]
struct Param {
    kind: NativeKind,
    name: Option<String>,
    /// Input bytes of an in/out parameter, restored before every execute.
    pristine: Option<NativeBuffer>,
    /// Per row: the value of a data-at-execution bind, and how much of it
    /// has been handed over.
    long_values: Vec<Option<Vec<u8>>>,
    offsets: Vec<usize>,
}

/// The bind buffers of one statement, in parameter order.
#[derive(Debug)]
pub(crate) struct BindSet {
    buffers: Vec<BindBuffer>,
    params: Vec<Param>,
    rows: usize,
    piece_size: usize,
}

impl BindSet {
    pub(crate) fn encode(
        args: &Oci8Arguments,
        placeholders: usize,
        style: PlaceholderStyle,
        piece_size: usize,
    ) -> Result<Self, Error> {
        let width = args.len();
        let first = args.first_row();

        for row in &args.rows {
            if row.len() != width {
                return Err(BindError::CountMismatch {
                    expected: width,
                    actual: row.len(),
                }
                .into());
            }
        }

        match style {
            PlaceholderStyle::QuestionMark => {
                if let Some(name) = first.iter().find_map(|arg| arg.name.as_ref()) {
                    return Err(BindError::NamedInPositional(name.clone()).into());
                }

                if width != placeholders {
                    return Err(BindError::CountMismatch {
                        expected: placeholders,
                        actual: width,
                    }
                    .into());
                }
            }

            // named arguments are matched by the library; only a purely
            // positional list can be counted against the text
            PlaceholderStyle::Named => {
                if first.iter().all(|arg| arg.name.is_none()) && width != placeholders {
                    return Err(BindError::CountMismatch {
                        expected: placeholders,
                        actual: width,
                    }
                    .into());
                }
            }
        }

        let rows = args.batch_size();
        let mut set = BindSet {
            buffers: Vec::with_capacity(width),
            params: Vec::with_capacity(width),
            rows,
            piece_size: piece_size.max(1),
        };

        for index in 0..width {
            let column: Vec<&Oci8Argument> = args.rows.iter().map(|row| &row[index]).collect();
            let (buffer, param) = encode_param(index, &column, style, set.piece_size)?;

            set.buffers.push(buffer);
            set.params.push(param);
        }

        Ok(set)
    }

    /// Register every buffer with the statement.
    pub(crate) fn register(
        &self,
        api: &dyn OciApi,
        stmt: RawHandle,
        err: RawHandle,
        logger: &NoticeLogger,
    ) -> Result<(), Error> {
        for bind in &self.buffers {
            let desc = bind.desc();

            match &desc.placeholder {
                Placeholder::Position(position) => {
                    let status = api.bind_by_pos(stmt, err, *position, desc);
                    check(api, status, err, ErrorScope::Bind, "OCIBindByPos", logger)?;
                }
                Placeholder::Name(name) => {
                    let status = api.bind_by_name(stmt, err, name, desc);
                    check(api, status, err, ErrorScope::Bind, "OCIBindByName", logger)?;
                }
            }
        }

        Ok(())
    }

    /// Execute iterations for a DML statement.
    pub(crate) fn iters(&self) -> u32 {
        u32::try_from(self.rows).unwrap_or(u32::MAX)
    }

    /// Bring output buffers back to their pre-execute state: outputs
    /// become null with zeroed bytes, in/out parameters get their input
    /// back, and piecewise transfers start over.
    pub(crate) fn prepare_for_execute(&mut self) {
        for (bind, param) in self.buffers.iter_mut().zip(&mut self.params) {
            match bind.desc.direction {
                BindDirection::In => {}
                BindDirection::Out => {
                    for row in 0..bind.buffer.rows() {
                        bind.buffer.reset(row);
                    }
                }
                BindDirection::InOut => {
                    if let Some(pristine) = &param.pristine {
                        bind.buffer = pristine.clone();
                    }
                }
            }

            param.offsets.iter_mut().for_each(|offset| *offset = 0);
        }
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut [BindBuffer] {
        &mut self.buffers
    }

    /// The next piece of the data-at-execution value `request` asks for.
    pub(crate) fn next_piece(&mut self, request: PieceRequest) -> Result<(Piece, &[u8]), Error> {
        let piece_size = self.piece_size;
        let row = request.iteration as usize;

        let param = self
            .params
            .get_mut(request.bind)
            .ok_or_else(|| err_protocol!("library asked for data of unknown bind {}", request.bind))?;

        let value = match param.long_values.get(row) {
            Some(Some(value)) => value,
            Some(None) => return Ok((Piece::Last, &[][..])),
            None => {
                return Err(err_protocol!(
                    "library asked for row {} of bind {}, which is not piecewise",
                    row,
                    request.bind
                ))
            }
        };

        let start = param.offsets[row];
        let end = value.len().min(start + piece_size);
        param.offsets[row] = end;

        let piece = match (start == 0, end == value.len()) {
            (true, true) => Piece::One,
            (true, false) => Piece::First,
            (false, false) => Piece::Next,
            (false, true) => Piece::Last,
        };

        Ok((piece, &value[start..end]))
    }

    /// Decode what execute wrote into output and in/out buffers.
    pub(crate) fn read_outputs(&self, tz: Tz) -> Result<Vec<Oci8OutValue>, Error> {
        let mut out = Vec::new();

        for (index, (bind, param)) in self.buffers.iter().zip(&self.params).enumerate() {
            if !bind.desc.direction.is_output() {
                continue;
            }

            let buffer = bind.buffer();

            for row in 0..buffer.rows() {
                if buffer.is_truncated(row) {
                    return Err(BindError::Overflow {
                        index,
                        len: usize::try_from(buffer.indicator(row)).unwrap_or(buffer.element_size()),
                        capacity: buffer.element_size(),
                    }
                    .into());
                }

                let value = match buffer.value(row) {
                    None => Oci8Value::Null,
                    Some(bytes) => param
                        .kind
                        .decode(bytes, tz)
                        .map_err(|message| BindError::OutOfRange { index, message })?,
                };

                out.push(Oci8OutValue {
                    name: param.name.clone(),
                    position: index + 1,
                    row,
                    value,
                });
            }
        }

        Ok(out)
    }
}

fn encode_param(
    index: usize,
    column: &[&Oci8Argument],
    style: PlaceholderStyle,
    piece_size: usize,
) -> Result<(BindBuffer, Param), Error> {
    let head = column[0];
    let direction = head.direction;

    let sample = column.iter().map(|arg| &arg.value).find(|value| !value.is_null());

    for arg in column {
        let same_value_kind = match sample {
            Some(sample) => arg.value.same_kind(sample),
            None => true,
        };

        if !same_value_kind || arg.direction != direction || arg.name != head.name {
            return Err(BindError::TypeMismatch { index }.into());
        }
    }

    let unsupported = || BindError::UnsupportedType {
        index,
        type_name: head.type_info.name().to_owned(),
    };

    let mut kind = match (direction, sample) {
        (BindDirection::Out, _) | (BindDirection::InOut, None) => {
            NativeKind::of_output(&head.type_info).ok_or_else(unsupported)?
        }
        (_, Some(sample)) => NativeKind::of_value(sample),
        (BindDirection::In, None) => NativeKind::Text,
    };

    let encoded = column
        .iter()
        .map(|arg| match direction {
            BindDirection::Out => Ok(None),
            _ => encode_value(&arg.value),
        })
        .collect::<Result<Vec<Option<Cow<'_, [u8]>>>, String>>()
        .map_err(|message| BindError::OutOfRange { index, message })?;

    let widest = encoded.iter().flatten().map(|bytes| bytes.len()).max().unwrap_or(0);

    let mut data_at_exec = false;
    let element_size = if direction.is_output() {
        let capacity = match (kind.fixed_len(), kind) {
            (Some(len), _) => len,
            (None, NativeKind::NumberText) => head.capacity.max(NUMBER_TEXT_LEN),
            (None, _) => head.capacity.max(1),
        };

        if widest > capacity {
            return Err(BindError::Overflow {
                index,
                len: widest,
                capacity,
            }
            .into());
        }

        capacity
    } else {
        match kind.fixed_len() {
            Some(len) => len,
            None if widest > piece_size => {
                kind = kind.long_form();
                data_at_exec = true;
                0
            }
            None => widest.max(1),
        }
    };

    let rows = column.len();
    let mut buffer = NativeBuffer::new(kind.sqlt(), element_size, rows);
    let mut long_values = Vec::new();

    if data_at_exec {
        long_values.reserve(rows);

        for (row, bytes) in encoded.into_iter().enumerate() {
            match bytes {
                Some(bytes) => {
                    buffer.set_indicator(row, IND_NOT_NULL);
                    buffer.set_length(row, bytes.len());
                    long_values.push(Some(bytes.into_owned()));
                }
                None => {
                    buffer.set_indicator(row, IND_NULL);
                    long_values.push(None);
                }
            }
        }
    } else {
        for (row, bytes) in encoded.iter().enumerate() {
            buffer.write(row, bytes.as_deref());
        }
    }

    let placeholder = match (&head.name, style) {
        (Some(name), PlaceholderStyle::Named) => Placeholder::Name(name.clone()),
        _ => Placeholder::Position(u32::try_from(index + 1).unwrap_or(u32::MAX)),
    };

    let desc = BindDesc {
        placeholder,
        data_type: kind.sqlt(),
        element_size,
        direction,
        data_at_exec,
    };

    let pristine = (direction == BindDirection::InOut).then(|| buffer.clone());

    let param = Param {
        kind,
        name: head.name.clone(),
        pristine,
        offsets: vec![0; long_values.len()],
        long_values,
    };

    Ok((BindBuffer::new(desc, buffer), param))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci8::native::constants::*;
    use crate::oci8::{Oci8Argument, Oci8TypeInfo};

    fn encode(args: &Oci8Arguments, placeholders: usize) -> Result<BindSet, Error> {
        BindSet::encode(args, placeholders, PlaceholderStyle::QuestionMark, 4000)
    }

    #[test]
    fn it_rejects_a_wrong_parameter_count() {
        let mut args = Oci8Arguments::default();
        args.add(1_i64);

        for placeholders in [0, 2] {
            let err = encode(&args, placeholders).unwrap_err();
            assert!(matches!(
                err,
                Error::Bind(BindError::CountMismatch { expected, actual: 1 }) if expected == placeholders
            ));
        }

        assert!(encode(&args, 1).is_ok());
    }

    #[test]
    fn it_sizes_text_to_the_widest_row() {
        let mut args = Oci8Arguments::default();
        args.add("a");
        args.next_row();
        args.add("abcdef");
        args.next_row();
        args.add(None::<&str>);

        let set = encode(&args, 1).unwrap();
        let buffer = set.buffers[0].buffer();

        assert_eq!(set.iters(), 3);
        assert_eq!(buffer.data_type(), SQLT_CHR);
        assert_eq!(buffer.element_size(), 6);
        assert_eq!(buffer.value(0), Some(&b"a"[..]));
        assert_eq!(buffer.value(1), Some(&b"abcdef"[..]));
        assert!(buffer.is_null(2));
    }

    #[test]
    fn it_rejects_rows_of_different_types() {
        let mut args = Oci8Arguments::default();
        args.add(1_i64);
        args.next_row();
        args.add("one");

        assert!(matches!(
            encode(&args, 1),
            Err(Error::Bind(BindError::TypeMismatch { index: 0 }))
        ));
    }

    #[test]
    fn it_binds_null_as_text_with_a_null_indicator() {
        let mut args = Oci8Arguments::default();
        args.add(Oci8Value::Null);

        let set = encode(&args, 1).unwrap();
        let bind = &set.buffers[0];

        assert_eq!(bind.desc().data_type, SQLT_CHR);
        assert_eq!(bind.buffer().indicator(0), IND_NULL);
    }

    #[test]
    fn it_feeds_long_values_piecewise() {
        let mut args = Oci8Arguments::default();
        args.add(vec![7_u8; 10]);

        let mut set = BindSet::encode(&args, 1, PlaceholderStyle::QuestionMark, 4).unwrap();
        assert!(set.buffers[0].desc().data_at_exec);
        assert_eq!(set.buffers[0].desc().data_type, SQLT_LBI);

        let request = PieceRequest {
            bind: 0,
            iteration: 0,
            piece: Piece::First,
        };

        let mut pieces = Vec::new();
        loop {
            let (piece, data) = set.next_piece(request).unwrap();
            pieces.push((piece, data.len()));
            if piece == Piece::Last {
                break;
            }
        }

        assert_eq!(
            pieces,
            vec![(Piece::First, 4), (Piece::Next, 4), (Piece::Last, 2)]
        );

        set.prepare_for_execute();
        assert_eq!(set.next_piece(request).unwrap().0, Piece::First);
    }

    #[test]
    fn it_resets_outputs_before_execute() {
        let mut args = Oci8Arguments::default();
        args.add_argument(Oci8Argument::output(Oci8TypeInfo::VARCHAR2, 16).named("msg"));
        args.add_argument(Oci8Argument::in_out(5_i64, 0).named("n"));

        let mut set = BindSet::encode(&args, 2, PlaceholderStyle::Named, 4000).unwrap();
        assert_eq!(set.buffers[0].desc().placeholder, Placeholder::Name("msg".into()));

        // what a previous execute left behind
        set.buffers[0].buffer_mut().write(0, Some(&b"stale"[..]));
        set.buffers[1].buffer_mut().write(0, Some(&99_i64.to_ne_bytes()[..]));

        set.prepare_for_execute();

        let outputs = set.read_outputs(Tz::UTC).unwrap();
        assert_eq!(outputs[0].value, Oci8Value::Null);
        assert_eq!(outputs[1].value, Oci8Value::Integer(5));
    }

    #[test]
    fn it_checks_in_out_values_against_their_capacity() {
        let mut args = Oci8Arguments::default();
        args.add_argument(Oci8Argument::in_out("too long", 3));

        assert!(matches!(
            encode(&args, 1),
            Err(Error::Bind(BindError::Overflow {
                index: 0,
                len: 8,
                capacity: 3
            }))
        ));
    }

    #[test]
    fn it_refuses_names_with_question_marks() {
        let mut args = Oci8Arguments::default();
        args.add_named("id", 1_i64);

        assert!(matches!(
            encode(&args, 1),
            Err(Error::Bind(BindError::NamedInPositional(ref n))) if n == "id"
        ));
    }
}
