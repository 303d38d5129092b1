//! CHAT content heuristic: decide whether rendered content should be
//! sent as a structured card or as plain text.

/// A card payload is a JSON object carrying a `config` or `header`
/// field; anything else — including malformed JSON that merely starts
/// with `{` — falls back to plain text.
pub fn is_structured_card(content: &str) -> bool {
    let trimmed = content.trim_start();
    if !trimmed.starts_with('{') {
        return false;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => map.contains_key("config") || map.contains_key("header"),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_card_markers() {
        assert!(is_structured_card(r#"{"header": {"title": "hi"}}"#));
        assert!(is_structured_card(r#"{"config": {"wide_screen_mode": true}}"#));
    }

    #[test]
    fn plain_text_and_malformed_json_are_not_cards() {
        assert!(!is_structured_card("hello there"));
        assert!(!is_structured_card("{not valid json"));
        assert!(!is_structured_card(r#"{"unrelated": 1}"#));
    }
}
