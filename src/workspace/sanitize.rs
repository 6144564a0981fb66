//! File-name sanitisation for extracted sub-sounds
//!
//! Internal sample names come from game data and may contain anything.
//! Characters that are meaningful to shells or invalid on common filesystems
//! are replaced with readable full-width equivalents; remaining control
//! characters become underscores; reserved device names get a leading
//! underscore so they never collide with the OS namespace.

/// Reserved device names (case-insensitive stem match)
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitise a name for use as a single path component.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        out.push(match c {
            ':' => '：',
            '*' => '＊',
            '?' => '？',
            '"' => '＂',
            '<' => '＜',
            '>' => '＞',
            '|' => '｜',
            '/' => '／',
            '\\' => '＼',
            c if c.is_control() => '_',
            c => c,
        });
    }

    let stem = out.split('.').next().unwrap_or(&out);
    if RESERVED_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(stem))
    {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replaces_special_characters_with_full_width() {
        assert_eq!(sanitize_file_name(r#"a:b*c?d"e<f>g|h/i\j"#), "a：b＊c？d＂e＜f＞g｜h／i＼j");
    }

    #[test]
    fn replaces_control_characters_with_underscore() {
        assert_eq!(sanitize_file_name("a\tb\nc\u{1}d"), "a_b_c_d");
    }

    #[test]
    fn prefixes_reserved_device_names() {
        assert_eq!(sanitize_file_name("CON"), "_CON");
        assert_eq!(sanitize_file_name("con"), "_con");
        assert_eq!(sanitize_file_name("Com7"), "_Com7");
        assert_eq!(sanitize_file_name("NUL.wav"), "_NUL.wav");
        // Not reserved: COM10, CONSOLE
        assert_eq!(sanitize_file_name("COM10"), "COM10");
        assert_eq!(sanitize_file_name("CONSOLE"), "CONSOLE");
    }

    #[test]
    fn leaves_ordinary_names_alone() {
        assert_eq!(sanitize_file_name("music_theme-01 (final)"), "music_theme-01 (final)");
    }
}
