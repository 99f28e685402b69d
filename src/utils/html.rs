use std::collections::HashSet;

/// Reduce user-supplied comment text to plain text using the ammonia library.
///
/// No tag survives: harmless markup (like <b>) is unwrapped to its text, while
/// <script> and <style> are removed together with their content. The result is
/// plain text, so the escaping ammonia applies on serialization is undone and
/// characters like `&` and `<` come back as typed.
pub fn strip_markup(input: &str) -> String {
    let cleaned = ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string();

    unescape_text(&cleaned)
}

/// Inverse of the escaping html5ever applies to text nodes. `&amp;` goes last
/// so an escaped entity name is not decoded twice.
fn unescape_text(escaped: &str) -> String {
    escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
