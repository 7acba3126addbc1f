//! Client filename sanitization.
//!
//! Turns an untrusted, client-supplied filename into a flat name that is safe
//! to use as a key inside the upload directory. Steps run in this order:
//!
//! 1. Latin-1 accented letters fold to their ASCII base letter, every other
//!    non-ASCII character is dropped
//! 2. `/` and `\` become spaces, so no path component survives
//! 3. The name is split on whitespace and rejoined with `_`, so each run of
//!    whitespace becomes one `_`
//! 4. Anything outside `[A-Za-z0-9_.-]` is removed (after the join, so
//!    `"a * b.txt"` keeps both underscores: `a__b.txt`)
//! 5. Leading and trailing `.` / `_` are stripped, so `..` and hidden names
//!    cannot appear
//! 6. Windows device names (`CON`, `NUL`, `COM1`, ...) get a `_` prefix
//! 7. Length is capped at 255 bytes (Linux NAME_MAX)
//!
//! Folding covers Latin-1 only; letters outside it with a decomposable
//! accent (`ź`, `ő`, `č`) are dropped rather than reduced to their base
//! letter.
//!
//! The result may be empty; callers must treat that as a rejected name.

const NAME_MAX: usize = 255;

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a client-supplied filename.
///
/// ```
/// use fileshelf::upload::sanitize::sanitize;
///
/// assert_eq!(sanitize("My cool movie.mov"), "My_cool_movie.mov");
/// assert_eq!(sanitize("../../../etc/passwd"), "etc_passwd");
/// assert_eq!(sanitize("../.."), "");
/// ```
pub fn sanitize(raw: &str) -> String {
    let ascii: String = raw
        .chars()
        .filter_map(fold_to_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii
        .split(is_separator_space)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    let mut name = if is_windows_device_name(trimmed) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    };

    // ASCII only at this point, so any byte index is a char boundary.
    name.truncate(NAME_MAX);
    name
}

// ASCII whitespace plus VT and the file/group/record/unit separators.
fn is_separator_space(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '\x0b' | '\x1c'..='\x1f')
}

/// Map a character to ASCII, folding common Latin-1 letters to their base.
fn fold_to_ascii(c: char) -> Option<char> {
    if c.is_ascii() {
        return Some(c);
    }

    let folded = match c {
        '\u{a0}' => ' ',
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' | 'Ø' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' => 'Y',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(folded)
}

fn is_windows_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem))
}
