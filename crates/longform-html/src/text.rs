//! Plain-text normalization helpers

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn named_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "ndash" => "–",
        "mdash" => "—",
        "hellip" => "…",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        "times" => "×",
        "middot" => "·",
        "copy" => "©",
        "reg" => "®",
        "deg" => "°",
        "plusmn" => "±",
        "sect" => "§",
        _ => return None,
    })
}

/// Decode numeric and the common named HTML entities; anything else is
/// passed through untouched.
pub fn decode_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find(';').filter(|&idx| idx <= 32);
        match end {
            Some(end) if end > 1 => {
                let body = &tail[1..end];
                let replacement = if let Some(digits) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                    u32::from_str_radix(digits, 16).ok().and_then(char::from_u32).map(String::from)
                } else if let Some(digits) = body.strip_prefix('#') {
                    digits.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
                } else {
                    named_entity(body).map(String::from)
                };
                match replacement {
                    Some(value) => {
                        decoded.push_str(&value);
                        rest = &tail[end + 1..];
                    }
                    None => {
                        decoded.push('&');
                        rest = &tail[1..];
                    }
                }
            }
            _ => {
                decoded.push('&');
                rest = &tail[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

/// Normalize whitespace line by line while preserving paragraph breaks:
/// entities decode, intra-line whitespace collapses, runs of blank lines
/// collapse to one, and leading/trailing blanks are removed.
pub fn normalize_text_preserve_paragraphs(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut normalized_lines: Vec<String> = Vec::new();

    for line in unified.split('\n') {
        let cleaned = normalize_whitespace(&decode_entities(line));
        if !cleaned.is_empty() {
            normalized_lines.push(cleaned);
        } else if normalized_lines
            .last()
            .map(|last| !last.is_empty())
            .unwrap_or(false)
        {
            normalized_lines.push(String::new());
        }
    }

    while normalized_lines.last().map(String::is_empty).unwrap_or(false) {
        normalized_lines.pop();
    }
    normalized_lines.join("\n")
}

/// Truncate to at most `max_chars` characters without splitting a code
/// point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
