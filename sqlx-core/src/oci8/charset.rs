//! Process-wide default character set.
//!
//! The id of `AL32UTF8` is resolved once, through a throwaway environment,
//! by [`bootstrap`]. Connections read it with [`default_charset`] and never
//! resolve it themselves. There is no teardown: the id is a plain number and
//! the environment used to look it up is freed before `bootstrap` returns.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::logger::NoticeLogger;
use crate::oci8::handle::OwnedHandle;
use crate::oci8::native::constants::OCI_DEFAULT;
use crate::oci8::native::OciApi;

static DEFAULT_CHARSET: OnceCell<u16> = OnceCell::new();

const DEFAULT_CHARSET_NAME: &str = "AL32UTF8";

/// Resolve the default character set id, once per process.
///
/// Later calls return the id resolved by the first successful one, whatever
/// library they are given.
pub fn bootstrap(api: &Arc<dyn OciApi>) -> Result<u16, Error> {
    DEFAULT_CHARSET
        .get_or_try_init(|| {
            let env = OwnedHandle::env(api, OCI_DEFAULT, 0, NoticeLogger::disabled())?;
            let id = api.nls_charset_id(env.raw(), DEFAULT_CHARSET_NAME);

            if id == 0 {
                return Err(err_protocol!(
                    "client library does not know character set {}",
                    DEFAULT_CHARSET_NAME
                ));
            }

            log::debug!("default character set {} has id {}", DEFAULT_CHARSET_NAME, id);

            Ok(id)
        })
        .copied()
}

/// The id resolved by [`bootstrap`], if it ran.
pub fn default_charset() -> Option<u16> {
    DEFAULT_CHARSET.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci8::mock::{MockCall, MockOci};

    #[test]
    fn it_resolves_once_and_frees_the_lookup_environment() {
        let mock = MockOci::new();
        let api: Arc<dyn OciApi> = Arc::new(mock.clone());

        let id = bootstrap(&api).unwrap();
        assert_eq!(default_charset(), Some(id));
        assert_eq!(mock.handle_stats().outstanding, 0);

        let other = MockOci::new();
        let other_api: Arc<dyn OciApi> = Arc::new(other.clone());
        assert_eq!(bootstrap(&other_api).unwrap(), id);
        assert!(!other.calls().contains(&MockCall::NlsCharsetId));
    }
}
