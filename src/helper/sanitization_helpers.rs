use std::collections::HashSet;

/// Strips all HTML tags from input (for titles/summaries)
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Plain single-line text: tags stripped, entities decoded, whitespace collapsed,
/// cut to `max_chars` characters.
pub fn clean_text_field(input: &str, max_chars: usize) -> String {
    let stripped = strip_all_html(input);
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ").chars().take(max_chars).collect()
}
