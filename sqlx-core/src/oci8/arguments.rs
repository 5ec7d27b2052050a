use crate::oci8::native::BindDirection;
use crate::oci8::types::Encode;
use crate::oci8::{Oci8TypeInfo, Oci8Value};

/// One parameter of a statement, with its placeholder name (if bound by
/// name) and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Oci8Argument {
    pub(crate) name: Option<String>,
    pub(crate) value: Oci8Value,
    pub(crate) type_info: Oci8TypeInfo,
    pub(crate) direction: BindDirection,
    pub(crate) capacity: usize,
}

impl Oci8Argument {
    /// An input parameter.
    pub fn input<T: Encode>(value: T) -> Self {
        let value = value.encode();

        Self {
            name: None,
            type_info: value.type_info(),
            value,
            direction: BindDirection::In,
            capacity: 0,
        }
    }

    /// An output parameter of SQL type `ty`, receiving at most `capacity`
    /// bytes (ignored for fixed width types).
    pub fn output(ty: Oci8TypeInfo, capacity: usize) -> Self {
        Self {
            name: None,
            value: Oci8Value::Null,
            type_info: ty,
            direction: BindDirection::Out,
            capacity,
        }
    }

    /// A parameter that sends `value` and receives up to `capacity` bytes
    /// back in its place.
    pub fn in_out<T: Encode>(value: T, capacity: usize) -> Self {
        Self {
            direction: BindDirection::InOut,
            capacity,
            ..Self::input(value)
        }
    }

    /// Bind to the placeholder `:name` instead of by position.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.trim_start_matches(':').to_owned());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn direction(&self) -> BindDirection {
        self.direction
    }
}

/// Parameters of one execution; several rows make an array (batch) bind.
///
/// Every row must supply the same parameters in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Oci8Arguments {
    pub(crate) rows: Vec<Vec<Oci8Argument>>,
}

impl Oci8Arguments {
    /// Add a positional input parameter to the current row.
    pub fn add<T: Encode>(&mut self, value: T) {
        self.add_argument(Oci8Argument::input(value));
    }

    /// Add an input parameter bound to `:name` to the current row.
    pub fn add_named<T: Encode>(&mut self, name: &str, value: T) {
        self.add_argument(Oci8Argument::input(value).named(name));
    }

    pub fn add_argument(&mut self, argument: Oci8Argument) {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }

        if let Some(row) = self.rows.last_mut() {
            row.push(argument);
        }
    }

    /// Start the next row of a batch.
    pub fn next_row(&mut self) {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }

        self.rows.push(Vec::new());
    }

    /// Parameters per row.
    pub fn len(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in the batch; `1` for a plain execution.
    pub fn batch_size(&self) -> usize {
        self.rows.len().max(1)
    }

    pub(crate) fn first_row(&self) -> &[Oci8Argument] {
        self.rows.first().map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_batches_row_by_row() {
        let mut args = Oci8Arguments::default();
        args.add(1_i64);
        args.add("one");
        args.next_row();
        args.add(2_i64);
        args.add(None::<String>);

        assert_eq!(args.len(), 2);
        assert_eq!(args.batch_size(), 2);
        assert_eq!(args.rows[1][1].value, Oci8Value::Null);
    }

    #[test]
    fn it_strips_the_colon_of_names() {
        let arg = Oci8Argument::output(Oci8TypeInfo::NUMBER, 0).named(":total");
        assert_eq!(arg.name(), Some("total"));
        assert_eq!(arg.direction(), BindDirection::Out);
    }
}
