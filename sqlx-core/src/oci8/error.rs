use std::fmt::{self, Display};

use crate::error::ErrorKind;

/// An error reported by the native client library or the server behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oci8DatabaseError {
    pub(crate) code: i32,
    pub(crate) message: String,
}

impl Oci8DatabaseError {
    pub(crate) fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The `ORA-nnnnn` number, `0` when the library reported no code.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code {
            1 => ErrorKind::UniqueViolation,
            1400 | 1407 => ErrorKind::NotNullViolation,
            2291 | 2292 => ErrorKind::ForeignKeyViolation,
            2290 => ErrorKind::CheckViolation,
            _ => ErrorKind::Other,
        }
    }
}

impl Display for Oci8DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // server messages already carry their "ORA-nnnnn: " prefix
        if self.code == 0 || self.message.starts_with("ORA-") {
            f.write_str(&self.message)
        } else {
            write!(f, "ORA-{:05}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Oci8DatabaseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_constraint_violations() {
        let err = Oci8DatabaseError::new(1, "unique constraint (APP.PK_T) violated");
        assert_eq!(err.kind(), ErrorKind::UniqueViolation);
        assert_eq!(
            err.to_string(),
            "ORA-00001: unique constraint (APP.PK_T) violated"
        );

        let err = Oci8DatabaseError::new(2291, "ORA-02291: integrity constraint violated");
        assert_eq!(err.kind(), ErrorKind::ForeignKeyViolation);
        assert_eq!(err.to_string(), "ORA-02291: integrity constraint violated");

        assert_eq!(Oci8DatabaseError::new(942, "").kind(), ErrorKind::Other);
    }
}
