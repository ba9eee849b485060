//! Literal placeholder substitution applied to bodies before composition

use tracing::warn;

/// Token the agent writes where the sender's name belongs
pub const SENDER_NAME_TOKEN: &str = "{name}";

/// Unfilled salutations and their generic polite replacements
const SALUTATIONS: &[(&str, &str)] = &[
    ("尊敬的XXX", "尊敬的先生/女士"),
    ("Dear XXX", "Dear Sir/Madam"),
];

/// Fixed set of literal substitutions.
///
/// Rules run in order. A rule whose replacement could form its own pattern
/// or an earlier rule's pattern, alone or together with the text around it,
/// is dropped when the rewriter is built, so applying the rewriter twice
/// equals applying it once.
#[derive(Debug, Clone)]
pub struct BodyRewriter {
    plain: Vec<(String, String)>,
    html: Vec<(String, String)>,
}

impl BodyRewriter {
    pub fn new(display_name: &str) -> Self {
        let escaped = html_escape::encode_double_quoted_attribute(display_name);
        Self {
            plain: build_rules(display_name),
            html: build_rules(&escaped),
        }
    }

    /// HTML bodies get the sender's name with markup characters escaped
    pub fn apply(&self, body: &str, is_html: bool) -> String {
        let rules = if is_html { &self.html } else { &self.plain };
        rules
            .iter()
            .fold(body.to_string(), |text, (from, to)| text.replace(from.as_str(), to))
    }
}

fn build_rules(display_name: &str) -> Vec<(String, String)> {
    let candidates = std::iter::once((SENDER_NAME_TOKEN.to_string(), display_name.to_string()))
        .chain(
            SALUTATIONS
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string())),
        );

    let mut rules: Vec<(String, String)> = Vec::new();
    for (from, to) in candidates {
        let clash = rules
            .iter()
            .map(|(pattern, _)| pattern.as_str())
            .chain(std::iter::once(from.as_str()))
            .find(|pattern| can_form(&to, pattern))
            .map(str::to_string);
        match clash {
            Some(pattern) => {
                warn!("Dropping body substitution for '{from}': replacement could form '{pattern}'");
            }
            None => rules.push((from, to)),
        }
    }
    rules
}

/// Whether inserting `to` can make `pattern` appear: it contains the
/// pattern, fits inside it, or overlaps either end of it.
fn can_form(to: &str, pattern: &str) -> bool {
    if to.contains(pattern) || pattern.contains(to) {
        return true;
    }
    (1..pattern.len())
        .filter(|&i| pattern.is_char_boundary(i))
        .any(|i| to.ends_with(&pattern[..i]) || to.starts_with(&pattern[i..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_sender_name() {
        let rw = BodyRewriter::new("OpenManus");
        assert_eq!(
            rw.apply("<p>Regards,<br>{name}</p>", true),
            "<p>Regards,<br>OpenManus</p>"
        );
    }

    #[test]
    fn test_normalizes_salutations() {
        let rw = BodyRewriter::new("OpenManus");
        assert_eq!(rw.apply("尊敬的XXX：您好", false), "尊敬的先生/女士：您好");
        assert_eq!(rw.apply("Dear XXX,\nthanks", false), "Dear Sir/Madam,\nthanks");
        assert_eq!(rw.apply("<p>Dear XXX,</p>", true), "<p>Dear Sir/Madam,</p>");
    }

    #[test]
    fn test_leaves_other_text_alone() {
        let rw = BodyRewriter::new("OpenManus");
        let html = "<html><body style=\"color:red\">{nam} XXX {{name}</body></html>";
        assert_eq!(
            rw.apply(html, true),
            "<html><body style=\"color:red\">{nam} XXX {OpenManus</body></html>"
        );
    }

    #[test]
    fn test_idempotent() {
        let rw = BodyRewriter::new("OpenManus");
        for body in [
            "",
            "plain text",
            "Dear XXX, from {name} {name}",
            "尊敬的XXX 尊敬的XXX {name}",
        ] {
            for is_html in [false, true] {
                let once = rw.apply(body, is_html);
                assert_eq!(rw.apply(&once, is_html), once);
            }
        }
    }

    #[test]
    fn test_self_referencing_display_name_is_dropped() {
        let rw = BodyRewriter::new("Bot {name}");
        let once = rw.apply("Hi from {name}, Dear XXX", false);
        assert_eq!(once, "Hi from {name}, Dear Sir/Madam");
        assert_eq!(rw.apply(&once, false), once);
    }

    #[test]
    fn test_name_forming_placeholder_with_surroundings_is_dropped() {
        // "{name" + "}" and "{" + "name" + "}" would both recreate the token
        for (name, body) in [("{name", "{name}}"), ("name", "{{name}}"), ("", "{{name}name}")] {
            let rw = BodyRewriter::new(name);
            let once = rw.apply(body, false);
            assert_eq!(once, body, "{name:?}");
            assert_eq!(rw.apply(&once, false), once, "{name:?}");
        }
    }

    #[test]
    fn test_ordinary_names_are_kept() {
        for name in ["OpenManus", "ACME D", "Team X", "Zoë {beta"] {
            let rw = BodyRewriter::new(name);
            assert_eq!(rw.apply("{name}", false), name);
        }
    }

    #[test]
    fn test_html_escapes_display_name() {
        let rw = BodyRewriter::new("A <b> & \"Co\"");
        assert_eq!(
            rw.apply("<p>{name}</p>", true),
            "<p>A &lt;b&gt; &amp; &quot;Co&quot;</p>"
        );
        assert_eq!(rw.apply("From {name}", false), "From A <b> & \"Co\"");

        let once = rw.apply("<p>{name}</p>", true);
        assert_eq!(rw.apply(&once, true), once);
    }
}
