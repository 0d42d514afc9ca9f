use std::collections::HashMap;

/// Substitute `{{variable}}` placeholders with test-case inputs.
///
/// Both `{{name}}` and the padded form `{{ name }}` are recognized.
/// Placeholders with no matching input are left untouched so missing
/// variables stay visible in the rendered output.
pub fn render(template: &str, inputs: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in inputs {
        rendered = rendered.replace(&format!("{{{{{}}}}}", name), value);
        rendered = rendered.replace(&format!("{{{{ {} }}}}", name), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_single_variable() {
        let inputs = make_inputs(&[("city", "Prague")]);
        assert_eq!(render("Weather in {{city}}?", &inputs), "Weather in Prague?");
    }

    #[test]
    fn test_render_padded_placeholder() {
        let inputs = make_inputs(&[("city", "Prague")]);
        assert_eq!(render("Weather in {{ city }}?", &inputs), "Weather in Prague?");
    }

    #[test]
    fn test_render_repeated_variable() {
        let inputs = make_inputs(&[("x", "a")]);
        assert_eq!(render("{{x}}-{{x}}", &inputs), "a-a");
    }

    #[test]
    fn test_render_multiple_variables() {
        let inputs = make_inputs(&[("a", "1"), ("b", "2")]);
        assert_eq!(render("{{a}}+{{b}}", &inputs), "1+2");
    }

    #[test]
    fn test_unknown_placeholder_left_as_is() {
        let inputs = make_inputs(&[("a", "1")]);
        assert_eq!(render("{{a}} {{missing}}", &inputs), "1 {{missing}}");
    }

    #[test]
    fn test_no_placeholders() {
        let inputs = make_inputs(&[("a", "1")]);
        assert_eq!(render("plain text", &inputs), "plain text");
    }
}
