//! Numeric vocabulary of the OCI client library.

use super::Sword;

// return codes
pub const OCI_SUCCESS: Sword = 0;
pub const OCI_SUCCESS_WITH_INFO: Sword = 1;
pub const OCI_NEED_DATA: Sword = 99;
pub const OCI_NO_DATA: Sword = 100;
pub const OCI_ERROR: Sword = -1;
pub const OCI_INVALID_HANDLE: Sword = -2;
pub const OCI_STILL_EXECUTING: Sword = -3123;

// modes
pub const OCI_DEFAULT: u32 = 0x0000_0000;
pub const OCI_THREADED: u32 = 0x0000_0001;
pub const OCI_OBJECT: u32 = 0x0000_0002;
pub const OCI_DESCRIBE_ONLY: u32 = 0x0000_0010;
pub const OCI_COMMIT_ON_SUCCESS: u32 = 0x0000_0020;
pub const OCI_DATA_AT_EXEC: u32 = 0x0000_0002;
pub const OCI_NTV_SYNTAX: u32 = 1;
pub const OCI_FETCH_NEXT: u16 = 0x0002;

// session modes
pub const OCI_SYSDBA: u32 = 0x0000_0002;
pub const OCI_SYSOPER: u32 = 0x0000_0004;
pub const OCI_SYSASM: u32 = 0x0000_8000;

// credentials
pub const OCI_CRED_RDBMS: u32 = 1;
pub const OCI_CRED_EXT: u32 = 2;

// transaction flags
pub const OCI_TRANS_NEW: u32 = 0x0000_0001;
pub const OCI_TRANS_READONLY: u32 = 0x0000_0100;
pub const OCI_TRANS_READWRITE: u32 = 0x0000_0200;
pub const OCI_TRANS_SERIALIZABLE: u32 = 0x0000_0400;

// statement types reported by OCI_ATTR_STMT_TYPE
pub const OCI_STMT_UNKNOWN: u16 = 0;
pub const OCI_STMT_SELECT: u16 = 1;
pub const OCI_STMT_UPDATE: u16 = 2;
pub const OCI_STMT_DELETE: u16 = 3;
pub const OCI_STMT_INSERT: u16 = 4;
pub const OCI_STMT_CREATE: u16 = 5;
pub const OCI_STMT_DROP: u16 = 6;
pub const OCI_STMT_ALTER: u16 = 7;
pub const OCI_STMT_BEGIN: u16 = 8;
pub const OCI_STMT_DECLARE: u16 = 9;
pub const OCI_STMT_CALL: u16 = 10;
pub const OCI_STMT_MERGE: u16 = 16;

// internal (describe) data types
pub const SQLT_CHR: u16 = 1;
pub const SQLT_NUM: u16 = 2;
pub const SQLT_INT: u16 = 3;
pub const SQLT_FLT: u16 = 4;
pub const SQLT_STR: u16 = 5;
pub const SQLT_LNG: u16 = 8;
pub const SQLT_RID: u16 = 11;
pub const SQLT_DAT: u16 = 12;
pub const SQLT_BFLOAT: u16 = 21;
pub const SQLT_BDOUBLE: u16 = 22;
pub const SQLT_BIN: u16 = 23;
pub const SQLT_LBI: u16 = 24;
pub const SQLT_AFC: u16 = 96;
pub const SQLT_IBFLOAT: u16 = 100;
pub const SQLT_IBDOUBLE: u16 = 101;
pub const SQLT_RDD: u16 = 104;
pub const SQLT_CLOB: u16 = 112;
pub const SQLT_BLOB: u16 = 113;
pub const SQLT_TIMESTAMP_INTERNAL: u16 = 180;
pub const SQLT_TIMESTAMP_TZ_INTERNAL: u16 = 181;
pub const SQLT_INTERVAL_YM_INTERNAL: u16 = 182;
pub const SQLT_INTERVAL_DS_INTERNAL: u16 = 183;
pub const SQLT_TIMESTAMP: u16 = 187;
pub const SQLT_TIMESTAMP_TZ: u16 = 188;
pub const SQLT_INTERVAL_YM: u16 = 189;
pub const SQLT_INTERVAL_DS: u16 = 190;
pub const SQLT_UROWID: u16 = 208;
pub const SQLT_TIMESTAMP_LTZ_INTERNAL: u16 = 231;
pub const SQLT_TIMESTAMP_LTZ: u16 = 232;

// character set forms
pub const SQLCS_IMPLICIT: u8 = 1;
pub const SQLCS_NCHAR: u8 = 2;

// indicator values
pub const IND_NULL: i16 = -1;
pub const IND_NOT_NULL: i16 = 0;
pub const IND_TRUNCATED_UNKNOWN: i16 = -2;

// a few server error codes the driver reacts to
pub const ORA_NO_DATA_FOUND: i32 = 1403;
pub const ORA_FETCHED_COLUMN_TRUNCATED: i32 = 1406;
pub const ORA_NOT_ALL_VARIABLES_BOUND: i32 = 1008;
pub const ORA_ILLEGAL_VARIABLE: i32 = 1036;
