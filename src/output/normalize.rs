//! ANSI stripping and noise classification for raw Cucumber/JVM output lines.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*m").expect("Invalid ANSI regex pattern")
});

/// `YYYY-MM-DD HH:MM:SS` at line start: the application's own logging.
static APP_LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}")
        .expect("Invalid application log regex pattern")
});

/// Remove CSI color/style sequences (`ESC [ params m`).
///
/// Repeats until nothing matches, so removing one sequence can't leave
/// behind a freshly joined one and the result is a fixed point.
pub fn normalize(line: &str) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(line);
    while ANSI_RE.is_match(&current) {
        current = Cow::Owned(ANSI_RE.replace_all(&current, "").into_owned());
    }
    current
}

/// True for timestamped application log lines, which must never be read as
/// stack traces even when they contain "ERROR" or "Exception".
pub fn is_application_log(line: &str) -> bool {
    APP_LOG_RE.is_match(line)
}
