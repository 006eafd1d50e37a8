//! Member path sanitization for extraction.
//!
//! Archive member names are attacker-controlled; before they are used
//! to create files the path is reduced to a relative, traversal-free
//! form with platform-illegal characters replaced.

/// Sanitize a member path using Unix filename rules.
pub fn sanitize_unix(name: &str) -> String {
    sanitize(name, false)
}

/// Sanitize a member path using Windows filename rules: drive prefixes
/// are dropped, more characters are illegal and components may not end
/// in a dot or space.
pub fn sanitize_win32(name: &str) -> String {
    sanitize(name, true)
}

fn is_bad_char(c: char, win32: bool) -> bool {
    match c {
        '\0'..='\x1f' | '<' | '>' | '|' | '"' | '?' | '*' => true,
        ':' => win32,
        _ => false,
    }
}

fn sanitize(name: &str, win32: bool) -> String {
    let mut name = name.replace('\\', "/");

    if win32 && name.as_bytes().get(1) == Some(&b':') {
        name = name[2..].to_string();
    }

    let mut parts = vec![];

    for seg in name.split('/') {
        if seg.is_empty() || seg == "." || seg == ".." {
            continue;
        }

        let mut seg: String = seg
            .chars()
            .map(|c| if is_bad_char(c, win32) { '_' } else { c })
            .collect();

        if win32 && (seg.ends_with('.') || seg.ends_with(' ')) {
            seg.pop();
            seg.push('_');
        }

        parts.push(seg);
    }

    parts.join("/")
}
