/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Length of `html` as Telegram counts it: after parsing, in UTF-16 code
/// units. Tags count for nothing and each entity counts as one unit.
pub fn visible_len(html: &str) -> usize {
    let mut n = 0usize;
    let mut chars = html.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                }
            }
            '&' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                n += 1;
            }
            _ => n += ch.len_utf16(),
        }
    }
    n
}

/// Split plain text into pieces of at most `max_units` UTF-16 code units.
/// Characters are never split.
pub fn split_text(s: &str, max_units: usize) -> Vec<String> {
    let max_units = max_units.max(2);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut count = 0usize;

    for ch in s.chars() {
        let n = ch.len_utf16();
        if count + n > max_units {
            out.push(std::mem::take(&mut cur));
            count = 0;
        }
        cur.push(ch);
        count += n;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}
