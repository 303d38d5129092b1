//! Variable substitution: literal, greedy `{{name}}` replacement. This
//! is intentionally not a templating engine — no conditionals, no
//! loops, no escaping rules beyond "replace the exact token".

use msgq_store::TemplateData;

/// Replaces every occurrence of `{{key}}` in `content` with `value`, one
/// key at a time, in the order `data` iterates. A key with no matching
/// token is silently a no-op; a token with no matching key is left
/// untouched in the output.
pub fn render(content: &str, data: &TemplateData) -> String {
    let mut result = content.to_string();
    for (key, value) in data {
        let token = format!("{{{{{key}}}}}");
        result = result.replace(&token, value);
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn replaces_known_placeholders() {
        let mut data = TemplateData::new();
        data.insert("name".to_string(), "Ada".to_string());
        data.insert("code".to_string(), "42".to_string());
        let out = render("Hi {{name}}, your code is {{code}}.", &data);
        assert_eq!(out, "Hi Ada, your code is 42.");
    }

    #[test]
    fn leaves_unmatched_placeholders_untouched() {
        let data = TemplateData::new();
        let out = render("Hi {{name}}", &data);
        assert_eq!(out, "Hi {{name}}");
    }

    #[test]
    fn replaces_every_occurrence_of_a_repeated_key() {
        let mut data = TemplateData::new();
        data.insert("x".to_string(), "1".to_string());
        let out = render("{{x}}-{{x}}-{{x}}", &data);
        assert_eq!(out, "1-1-1");
    }
}
