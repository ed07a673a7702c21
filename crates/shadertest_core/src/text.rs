//! Text policy shared by expectation files and compiler output.
//!
//! Expectation files must be byte-identical across hosts, so both sides of every comparison go through the same
//! normalization before they are compared.

/// Placeholder that replaces the project root directory in compiler output.
pub const ROOT_PLACEHOLDER: &str = "<root>";

/// Token an expectation file starts with when the test is known to fail.
pub const SKIP_TOKEN: &str = "SKIP";

/// Header written in front of the compiler output when recording a failing test as skipped.
pub const SKIP_FAILED_HEADER: &str = "SKIP: FAILED\n\n";

const HASH_MARKER_OPEN: &str = "<<HASH: ";
const HASH_MARKER_CLOSE: &str = ">>\n";

/// Convert `\r\n` line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Replace every occurrence of `root` with [`ROOT_PLACEHOLDER`].
///
/// `root` should already use `/` separators; an empty root leaves the text untouched.
pub fn substitute_root(text: &str, root: &str) -> String {
    if root.is_empty() {
        return text.to_string();
    }
    text.replace(root, ROOT_PLACEHOLDER)
}

/// Whether expectation content marks a known-failing test.
pub fn is_skip_sentinel(expected: &str) -> bool {
    expected.starts_with(SKIP_TOKEN)
}

/// Expectation content recorded for a test that failed or was skipped.
pub fn skip_expectation(output: &str) -> String {
    format!("{SKIP_FAILED_HEADER}{output}")
}

/// Strip validation hash markers from compiler output.
///
/// ## Returns
/// - `(String, Vec<String>)`: the output with every `<<HASH: value>>\n` line removed, and the values in order of
///   appearance.
///
/// ## Notes
/// - A marker value may not contain `>`; a marker without its trailing newline is left in place.
pub fn extract_hashes(text: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut hashes = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(HASH_MARKER_OPEN) {
        let after_open = &rest[start + HASH_MARKER_OPEN.len()..];
        let value_len = after_open.find('>').unwrap_or(after_open.len());
        if after_open[value_len..].starts_with(HASH_MARKER_CLOSE) {
            out.push_str(&rest[..start]);
            hashes.push(after_open[..value_len].to_string());
            rest = &after_open[value_len + HASH_MARKER_CLOSE.len()..];
        } else {
            // Not a marker: keep the opening bracket and continue scanning after it.
            out.push_str(&rest[..start + 1]);
            rest = &rest[start + 1..];
        }
    }
    out.push_str(rest);
    (out, hashes)
}

/// Parse the per-file `flags:` header.
///
/// Only the first line of the test source is considered. It must look like `// flags: a b c` or `; flags: a b c`
/// (leading spaces allowed) and be terminated by a newline.
pub fn parse_flags_header(source: &str) -> Vec<String> {
    let Some((line, _)) = source.split_once('\n') else {
        return Vec::new();
    };
    let line = line.trim_start_matches(' ');
    let Some(line) = line.strip_prefix("//").or_else(|| line.strip_prefix(';')) else {
        return Vec::new();
    };
    let Some(flags) = line.trim_start_matches(' ').strip_prefix("flags:") else {
        return Vec::new();
    };
    flags.split_whitespace().map(str::to_string).collect()
}
