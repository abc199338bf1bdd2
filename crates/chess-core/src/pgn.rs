//! PGN header parsing, header formatting and main-line extraction.

use regex::Regex;

/// Parse all `[Key "Value"]` header pairs in order of appearance.
pub fn parse_headers(pgn: &str) -> Vec<(String, String)> {
    let header_re = match Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    header_re
        .captures_iter(pgn)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

/// Extract a string value from a PGN header (e.g. FEN, SetUp).
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() { None } else { Some(value) }
}

/// Render one header line, escaping quotes and backslashes in the value.
pub fn format_header(key: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("[{key} \"{escaped}\"]")
}

/// Move-number prefix for the move played from a position at `ply`
/// (0 = White's first move). Black moves only get a prefix when `force` is
/// set, e.g. at the start of a variation.
pub fn move_number_prefix(ply: u32, force: bool) -> Option<String> {
    let number = ply / 2 + 1;
    if ply % 2 == 0 {
        Some(format!("{number}."))
    } else if force {
        Some(format!("{number}..."))
    } else {
        None
    }
}

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// SAN tokens of the main line, in order. Headers, comments, side lines,
/// move numbers, NAGs and the result are skipped.
pub fn mainline_sans(pgn: &str) -> Vec<String> {
    let noise = match Regex::new(r"(?m)^\[.*\]\s*$|\{[^}]*\}|;[^\n]*") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let stripped = noise.replace_all(pgn, " ");

    let mut depth = 0usize;
    let mut mainline = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => mainline.push(c),
            _ => {}
        }
    }

    mainline
        .split_whitespace()
        .filter(|token| !RESULTS.contains(token) && !token.starts_with('$'))
        .map(|token| token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
