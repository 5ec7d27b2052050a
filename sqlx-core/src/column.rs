use crate::error::Error;
use crate::type_info::TypeInfo;
use std::fmt::Debug;

pub trait Column: 'static + Send + Sync + Debug {
    type TypeInfo: TypeInfo;

    /// Gets the column ordinal.
    ///
    /// This can be used to unambiguously refer to this column within a row in case more than
    /// one column have the same name
    fn ordinal(&self) -> usize;

    /// Gets the column name or alias.
    ///
    /// The column name is unreliable (and can change between database minor versions) if this
    /// column is an expression that has not been aliased.
    fn name(&self) -> &str;

    /// Gets the type information for the column.
    fn type_info(&self) -> &Self::TypeInfo;
}

/// A type that can be used to index into a [`Row`](crate::oci8::Oci8Row) or
/// the columns of a statement.
///
/// The [`get`](crate::oci8::Oci8Row::get) and
/// [`try_get`](crate::oci8::Oci8Row::try_get) methods of a row accept any
/// type that implements `ColumnIndex`. This trait is implemented for strings
/// which are used to look up a column by name, and for `usize` which is used
/// as a positional index into the row.
pub trait ColumnIndex<T: ?Sized>: Debug {
    /// Returns a valid positional index into the row or statement, [`ColumnIndexOutOfBounds`], or,
    /// [`ColumnNotFound`].
    ///
    /// [`ColumnNotFound`]: Error::ColumnNotFound
    /// [`ColumnIndexOutOfBounds`]: Error::ColumnIndexOutOfBounds
    fn index(&self, container: &T) -> Result<usize, Error>;
}

impl<T: ?Sized, I: ColumnIndex<T> + ?Sized> ColumnIndex<T> for &'_ I {
    #[inline]
    fn index(&self, row: &T) -> Result<usize, Error> {
        (**self).index(row)
    }
}
