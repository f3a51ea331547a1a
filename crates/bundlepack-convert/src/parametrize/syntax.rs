//! Expression syntax of the generated templates
//!
//! The parametrize engine only decides *where* expressions go; a
//! [`TemplateSyntax`] decides how they are written.

use serde_json::Value as JsonValue;

use super::to_yaml;
use crate::error::ParametrizeError;

/// Where a marked field sits inside its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSite {
    /// Value of a mapping key
    Key(String),
    /// Item of a sequence
    Item,
}

/// A block replacing one marked line
#[derive(Debug)]
pub struct Block<'a> {
    /// Marker identifying the instruction
    pub token: &'a str,
    /// Templating expression supplied by the caller
    pub expression: &'a str,
    /// Column the field starts at
    pub indent: usize,
    pub site: &'a FieldSite,
    /// Literal value the field held before marking
    pub literal: &'a JsonValue,
}

impl Block<'_> {
    /// The literal re-serialized in place, as `key: literal` or `- literal`
    pub fn literal_in_place(&self) -> Result<String, ParametrizeError> {
        let wrapped = match self.site {
            FieldSite::Key(key) => {
                let mut map = serde_json::Map::new();
                map.insert(key.clone(), self.literal.clone());
                JsonValue::Object(map)
            }
            FieldSite::Item => JsonValue::Array(vec![self.literal.clone()]),
        };
        Ok(indent_lines(&to_yaml(&wrapped)?, self.indent))
    }
}

/// Renders instruction expressions in a concrete templating language
pub trait TemplateSyntax {
    /// Inline expression substituted for a scalar
    fn value(&self, expression: &str) -> String;

    /// Lines wrapping the literal field in a conditional
    fn conditional(&self, block: &Block<'_>) -> Result<String, ParametrizeError>;

    /// Lines deep-merging the literal field with the expression at render time
    ///
    /// The literal's own shape picks list concatenation or map merging;
    /// `site` only decides whether the result is written back as a key or an item.
    fn merge(&self, block: &Block<'_>) -> Result<String, ParametrizeError>;

    /// Make literal document text inert, so it renders as itself
    fn escape(&self, text: &str) -> String;
}

/// MiniJinja syntax, as rendered by bundlepack-engine
#[derive(Debug, Default, Clone, Copy)]
pub struct Jinja;

impl TemplateSyntax for Jinja {
    fn value(&self, expression: &str) -> String {
        format!("{{{{ {} }}}}", expression)
    }

    fn conditional(&self, block: &Block<'_>) -> Result<String, ParametrizeError> {
        let pad = " ".repeat(block.indent);
        Ok(format!(
            "{pad}{{%- if {} %}}\n{}\n{pad}{{%- endif %}}",
            block.expression,
            self.escape(&block.literal_in_place()?),
        ))
    }

    fn merge(&self, block: &Block<'_>) -> Result<String, ParametrizeError> {
        let snippet = to_yaml(block.literal)?;
        let combine = if block.literal.is_array() {
            "concat"
        } else {
            "merge_overwrite"
        };
        let merged = format!(
            "({} | fromyaml) | {}({})",
            block.token, combine, block.expression
        );
        let wrapped = match block.site {
            FieldSite::Key(key) => format!("{{{}: {}}}", quote(key), merged),
            FieldSite::Item => format!("[{}]", merged),
        };

        Ok(format!(
            "{{%- set {} %}}\n{}\n{{%- endset %}}\n{{{{ {} | toyaml | indent({}) }}}}",
            block.token,
            self.escape(snippet.trim_end()),
            wrapped,
            block.indent
        ))
    }

    fn escape(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, chars.peek()) {
                ('{', Some(&next @ ('{' | '%' | '#'))) => {
                    chars.next();
                    escaped.push_str(&format!("{{{{ \"{{{}\" }}}}", next));
                }
                _ => escaped.push(c),
            }
        }
        escaped
    }
}

/// Jinja string literal for `text`
pub fn quote(text: &str) -> String {
    // JSON string escapes are a subset of what Jinja string literals accept
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

fn indent_lines(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    text.trim_end_matches('\n')
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value() {
        assert_eq!(Jinja.value("release.namespace"), "{{ release.namespace }}");
    }

    #[test]
    fn test_conditional_key() {
        let site = FieldSite::Key("affinity".to_string());
        let literal = json!({"nodeAffinity": {}});
        let block = Block {
            token: "pm_0",
            expression: "values.affinity is defined",
            indent: 6,
            site: &site,
            literal: &literal,
        };

        assert_eq!(
            Jinja.conditional(&block).unwrap(),
            "      {%- if values.affinity is defined %}\n      affinity:\n        nodeAffinity: {}\n      {%- endif %}"
        );
    }

    #[test]
    fn test_merge_sequence_item() {
        let site = FieldSite::Item;
        let literal = json!(["a"]);
        let block = Block {
            token: "pm_1",
            expression: "values.extra",
            indent: 2,
            site: &site,
            literal: &literal,
        };

        assert_eq!(
            Jinja.merge(&block).unwrap(),
            "{%- set pm_1 %}\n- a\n{%- endset %}\n{{ [(pm_1 | fromyaml) | concat(values.extra)] | toyaml | indent(2) }}"
        );
    }

    #[test]
    fn test_escape() {
        assert_eq!(Jinja.escape("a: b"), "a: b");
        assert_eq!(Jinja.escape("x: {{ .Name }}"), "x: {{ \"{{\" }} .Name }}");
        assert_eq!(Jinja.escape("{%"), "{{ \"{%\" }}");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("olm.targetNamespaces"), "\"olm.targetNamespaces\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
