use std::time::Instant;

use log::{Level, LevelFilter};

use crate::connection::LogSettings;

pub(crate) const NOTICE_TARGET: &str = "sqlx_oci8::notice";
pub(crate) const QUERY_TARGET: &str = "sqlx::query";

/// Sink for recoverable notices and teardown failures.
///
/// A disabled logger (the default) discards everything without formatting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NoticeLogger {
    level: Option<Level>,
}

impl NoticeLogger {
    pub(crate) fn new(level: LevelFilter) -> Self {
        Self {
            level: level.to_level(),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self { level: None }
    }

    pub(crate) fn notice(&self, args: std::fmt::Arguments<'_>) {
        if let Some(level) = self.level {
            log::log!(target: NOTICE_TARGET, level, "{}", args);
        }
    }
}

/// Times one statement and logs it when dropped.
///
/// A query's logger travels with its rows, so the entry covers the whole
/// fetch and counts the rows handed out.
#[derive(Debug)]
pub(crate) struct QueryLogger {
    sql: String,
    pub(crate) rows_affected: u64,
    pub(crate) rows_returned: u64,
    start: Instant,
    settings: LogSettings,
}

impl QueryLogger {
    pub(crate) fn new(sql: String, settings: LogSettings) -> Self {
        Self {
            sql,
            rows_affected: 0,
            rows_returned: 0,
            start: Instant::now(),
            settings,
        }
    }

    pub(crate) fn increase_rows_affected(&mut self, n: u64) {
        self.rows_affected += n;
    }

    pub(crate) fn increment_rows_returned(&mut self) {
        self.rows_returned += 1;
    }

    fn finish(&self) {
        let elapsed = self.start.elapsed();

        let lvl = if elapsed >= self.settings.slow_statements_duration {
            self.settings.slow_statements_level
        } else {
            self.settings.statements_level
        };

        if let Some(lvl) = lvl.to_level() {
            if log::log_enabled!(target: QUERY_TARGET, lvl) {
                let summary = summarize(&self.sql);

                log::log!(
                    target: QUERY_TARGET,
                    lvl,
                    "{}; rows affected: {}, rows returned: {}, elapsed: {:.3?}\n\n{}",
                    summary,
                    self.rows_affected,
                    self.rows_returned,
                    elapsed,
                    self.sql
                );
            }
        }
    }
}

impl Drop for QueryLogger {
    fn drop(&mut self) {
        self.finish();
    }
}

fn summarize(sql: &str) -> String {
    let mut summary: String = sql.split_whitespace().take(4).collect::<Vec<_>>().join(" ");

    if sql.split_whitespace().nth(4).is_some() {
        summary.push_str(" …");
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_summarizes_long_statements() {
        assert_eq!(summarize("SELECT 1 FROM dual"), "SELECT 1 FROM dual");
        assert_eq!(
            summarize("SELECT id,\n  name FROM t WHERE id = :1"),
            "SELECT id, name FROM t …"
        );
    }

    #[test]
    fn it_counts_what_the_statement_did() {
        let mut logger = QueryLogger::new("UPDATE t SET x = 1".into(), LogSettings::default());
        logger.increase_rows_affected(2);
        logger.increase_rows_affected(3);
        logger.increment_rows_returned();

        assert_eq!(logger.rows_affected, 5);
        assert_eq!(logger.rows_returned, 1);
    }
}
