//! Console session lookup through `query user`.

use regex::Regex;
use tracing::{debug, warn};

use isoforge::process::{CommandSpec, ProcessRunner};

/// Parses the table printed by `query user`.
///
/// ```text
///  USERNAME              SESSIONNAME        ID  STATE   IDLE TIME  LOGON TIME
/// >user                  console             1  Active      none   1/1/2024 9:00 AM
/// ```
///
/// The third column is the session id. The first is the user name, with the
/// `>` marking the current session removed.
#[derive(Debug, Clone)]
pub struct SessionTable {
    separator: Regex,
}

impl SessionTable {
    /// Creates a parser splitting rows on runs of whitespace.
    ///
    /// # Errors
    ///
    /// Fails only if the column separator pattern does not compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            separator: Regex::new(r"\s+")?,
        })
    }

    /// User name of session `id`, if a row has it.
    pub fn user_for(&self, output: &str, id: u32) -> Option<String> {
        let id = id.to_string();
        output.lines().find_map(|line| {
            let columns: Vec<&str> = self.separator.split(line.trim()).collect();
            if columns.get(2) != Some(&id.as_str()) {
                return None;
            }
            let name = columns[0].strip_prefix('>').unwrap_or(columns[0]);
            (!name.is_empty()).then(|| name.to_string())
        })
    }
}

/// Runs `query user` and returns the user of session `id`.
///
/// A missing program or a non-zero exit counts as no user.
pub async fn lookup_user(runner: &ProcessRunner, table: &SessionTable, id: u32) -> Option<String> {
    let spec = CommandSpec::new("query").arg("user").unchecked().quiet();
    match runner.run(&spec).await {
        Ok(output) if output.success() => {
            let user = table.user_for(&output.stdout, id);
            debug!(session = id, ?user, "session lookup");
            user
        }
        Ok(output) => {
            debug!(session = id, exit_code = ?output.exit_code, "query user found nothing");
            None
        }
        Err(e) => {
            warn!(error = %e, "could not run query user");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TABLE: &str = " USERNAME              SESSIONNAME        ID  STATE   IDLE TIME  LOGON TIME
>jdoe                  console             1  Active      none   10/19/2026 9:00 AM
 admin                 rdp-tcp#0           2  Active         5   10/19/2026 9:05 AM
";

    #[test]
    fn test_current_session_strips_marker() {
        let table = SessionTable::new().unwrap();
        assert_eq!(table.user_for(TABLE, 1).as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_other_session() {
        let table = SessionTable::new().unwrap();
        assert_eq!(table.user_for(TABLE, 2).as_deref(), Some("admin"));
    }

    #[test]
    fn test_unknown_session() {
        let table = SessionTable::new().unwrap();
        assert_eq!(table.user_for(TABLE, 7), None);
        assert_eq!(table.user_for("", 1), None);
    }

    #[test]
    fn test_tabs_and_spaces_separate_columns() {
        let table = SessionTable::new().unwrap();
        assert_eq!(table.user_for(">jdoe\tconsole \t 1\tActive\n", 1).as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let table = SessionTable::new().unwrap();
        assert_eq!(table.user_for("No User exists for *\n>x 1\n", 1), None);
    }
}
