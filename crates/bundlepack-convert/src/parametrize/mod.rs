//! Parametrize engine
//!
//! Turns a concrete object into a template in three steps:
//!
//! 1. **mark**: every instruction replaces its target field with a unique
//!    token, remembering the literal value it displaced (lowest priority first);
//! 2. **serialize**: the token-bearing document is written out as YAML once;
//! 3. **replace**: every line holding a token is rewritten into the
//!    instruction's expression, at the line's own indentation (highest
//!    priority first, so a block still sees the tokens of the instructions
//!    nested inside its literal).
//!
//! The engine knows nothing about the templating language; expressions are
//! written by a [`TemplateSyntax`].

pub mod syntax;

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::error::ParametrizeError;
pub use syntax::{Block, FieldSite, Jinja, TemplateSyntax, quote};

/// Prefix of every marker token
pub const TOKEN_PREFIX: &str = "pm_";

/// The three instruction variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    /// Replace a scalar with an expression
    Value,
    /// Keep the field only when a condition holds
    Conditional,
    /// Deep-merge the literal field with an expression at render time
    Merge,
}

impl InstructionKind {
    /// Marking order; replacement runs in reverse
    pub fn priority(&self) -> u8 {
        match self {
            Self::Value => 0,
            Self::Conditional => 1,
            Self::Merge => 2,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Conditional => "conditional",
            Self::Merge => "merge",
        }
    }
}

/// One field-level rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    kind: InstructionKind,
    expression: String,
    path: String,
}

impl Instruction {
    /// Substitute the scalar at `path` with `expression`
    pub fn value(expression: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(InstructionKind::Value, expression, path)
    }

    /// Emit the field at `path` only when `condition` holds
    pub fn conditional(condition: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(InstructionKind::Conditional, condition, path)
    }

    /// Merge the field at `path` with the value of `expression`
    pub fn merge(expression: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(InstructionKind::Merge, expression, path)
    }

    fn new(kind: InstructionKind, expression: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            expression: expression.into(),
            path: path.into(),
        }
    }

    pub fn kind(&self) -> InstructionKind {
        self.kind
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Dot-separated field path; numeric segments index sequences and `\.`
    /// is a literal dot inside a key
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Deterministic marker for the instruction at position `ordinal`
    fn token(&self, ordinal: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.label().as_bytes());
        hasher.update([0]);
        hasher.update(self.expression.as_bytes());
        hasher.update([0]);
        hasher.update(self.path.as_bytes());
        hasher.update([0]);
        hasher.update(ordinal.to_string().as_bytes());
        let digest = hasher.finalize();

        let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        format!("{}{}", TOKEN_PREFIX, hex)
    }
}

struct Mark<'a> {
    instruction: &'a Instruction,
    token: String,
    literal: JsonValue,
    site: FieldSite,
}

/// Apply `instructions` to `document` and return the Jinja template text
pub fn execute(document: &JsonValue, instructions: &[Instruction]) -> Result<String, ParametrizeError> {
    execute_with(&Jinja, document, instructions)
}

/// Apply `instructions` to `document`, writing expressions with `syntax`
pub fn execute_with(
    syntax: &dyn TemplateSyntax,
    document: &JsonValue,
    instructions: &[Instruction],
) -> Result<String, ParametrizeError> {
    let mut document = document.clone();

    let mut order: Vec<usize> = (0..instructions.len()).collect();
    order.sort_by_key(|&i| instructions[i].kind.priority());

    let mut marks = Vec::with_capacity(instructions.len());
    for ordinal in order {
        let instruction = &instructions[ordinal];
        let token = instruction.token(ordinal);
        match mark(&mut document, &instruction.path, &token)? {
            Some((literal, site)) => marks.push(Mark {
                instruction,
                token,
                literal,
                site,
            }),
            None => tracing::warn!(
                path = %instruction.path,
                kind = instruction.kind.label(),
                "field not found, instruction skipped"
            ),
        }
    }

    let mut text = syntax.escape(&to_yaml(&document)?);

    for mark in marks.iter().rev() {
        text = replace(syntax, &text, mark)?;
    }

    Ok(text)
}

pub(crate) fn to_yaml(value: &JsonValue) -> Result<String, ParametrizeError> {
    Ok(serde_yaml::to_string(value)?)
}

/// Put `token` at `path`, returning the displaced value and its site
fn mark(
    document: &mut JsonValue,
    path: &str,
    token: &str,
) -> Result<Option<(JsonValue, FieldSite)>, ParametrizeError> {
    let segments = split_path(path);
    if segments.iter().any(String::is_empty) {
        return Err(ParametrizeError::EmptyPath);
    }

    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err(ParametrizeError::EmptyPath),
    };

    let mut current = document;
    for segment in parents {
        current = match child_mut(current, segment) {
            Some(child) => child,
            None => return Ok(None),
        };
    }

    let site = match current {
        JsonValue::Array(_) => FieldSite::Item,
        _ => FieldSite::Key(last.clone()),
    };

    Ok(child_mut(current, last.as_str()).map(|field| {
        let literal = std::mem::replace(field, JsonValue::String(token.to_string()));
        (literal, site)
    }))
}

/// Join path segments, escaping dots and backslashes inside them
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref().replace('\\', "\\\\").replace('.', "\\."))
        .collect::<Vec<_>>()
        .join(".")
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = vec![String::new()];
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        let c = match c {
            '.' => {
                segments.push(String::new());
                continue;
            }
            '\\' => chars.next().unwrap_or('\\'),
            c => c,
        };
        if let Some(segment) = segments.last_mut() {
            segment.push(c);
        }
    }
    segments
}

fn child_mut<'a>(value: &'a mut JsonValue, segment: &str) -> Option<&'a mut JsonValue> {
    match value {
        JsonValue::Object(map) => map.get_mut(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

fn replace(syntax: &dyn TemplateSyntax, text: &str, mark: &Mark<'_>) -> Result<String, ParametrizeError> {
    if !text.contains(&mark.token) {
        tracing::warn!(
            path = %mark.instruction.path,
            "marker not found in serialized document, instruction skipped"
        );
        return Ok(text.to_string());
    }

    let mut lines = Vec::new();
    for line in text.lines() {
        if !line.contains(&mark.token) {
            lines.push(line.to_string());
            continue;
        }

        match mark.instruction.kind {
            InstructionKind::Value => {
                let expression = syntax.value(&mark.instruction.expression);
                let replaced = line
                    .replace(&format!("\"{}\"", mark.token), &expression)
                    .replace(&format!("'{}'", mark.token), &expression)
                    .replace(&mark.token, &expression);
                lines.push(replaced);
            }
            kind => {
                let (prefix, indent) = block_position(line, &mark.site);
                if let Some(prefix) = prefix {
                    lines.push(prefix);
                }
                let block = Block {
                    token: &mark.token,
                    expression: &mark.instruction.expression,
                    indent,
                    site: &mark.site,
                    literal: &mark.literal,
                };
                let rendered = if kind == InstructionKind::Merge {
                    syntax.merge(&block)?
                } else {
                    syntax.conditional(&block)?
                };
                lines.push(rendered);
            }
        }
        tracing::debug!(path = %mark.instruction.path, "replaced marker");
    }

    let mut replaced = lines.join("\n");
    if text.ends_with('\n') {
        replaced.push('\n');
    }
    Ok(replaced)
}

/// Column a block starts at, plus any sequence markers that must stay on
/// their own line (`- - key: TOKEN` keeps `- -` as an empty first line)
fn block_position(line: &str, site: &FieldSite) -> (Option<String>, usize) {
    let leading = line.len() - line.trim_start_matches(' ').len();
    let mut rest = &line[leading..];
    let mut column = leading;
    while let Some(after) = rest.strip_prefix("- ") {
        rest = after;
        column += 2;
    }

    // An item owns the last sequence marker on its line
    let column = match site {
        FieldSite::Item if column > leading => column - 2,
        _ => column,
    };

    let prefix = (column > leading).then(|| line[..column].trim_end().to_string());
    (prefix, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use serde_json::json;

    fn redact(text: &str) -> String {
        let tokens = Regex::new(r"pm_[0-9a-f]{16}").unwrap();
        tokens.replace_all(text, "TOKEN").to_string()
    }

    fn deployment() -> JsonValue {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "banana", "namespace": "fruits"},
            "spec": {
                "replicas": 1,
                "template": {
                    "spec": {
                        "affinity": null,
                        "containers": [{
                            "image": "quay.io/banana:latest",
                            "env": [{"name": "HTTP_PROXY", "value": "xxx"}]
                        }]
                    }
                }
            }
        })
    }

    #[test]
    fn test_execute_nested_instructions() {
        let out = execute(
            &deployment(),
            &[
                Instruction::value("values.namespace", "metadata.namespace"),
                Instruction::value("values.image", "spec.template.spec.containers.0.image"),
                Instruction::value("values.replicas", "spec.replicas"),
                Instruction::value("values.affinity | tojson", "spec.template.spec.affinity"),
                Instruction::conditional("values.affinity is defined", "spec.template.spec.affinity"),
                Instruction::value(
                    "values.proxy | tojson",
                    "spec.template.spec.containers.0.env.0.value",
                ),
                Instruction::conditional(
                    "values.proxy is defined",
                    "spec.template.spec.containers.0.env.0",
                ),
            ],
        )
        .unwrap();

        insta::assert_snapshot!(out.trim_end(), @r"
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: banana
          namespace: {{ values.namespace }}
        spec:
          replicas: {{ values.replicas }}
          template:
            spec:
              {%- if values.affinity is defined %}
              affinity: {{ values.affinity | tojson }}
              {%- endif %}
              containers:
              - env:
                {%- if values.proxy is defined %}
                - name: HTTP_PROXY
                  value: {{ values.proxy | tojson }}
                {%- endif %}
                image: {{ values.image }}
        ");
    }

    #[test]
    fn test_merge_map() {
        let config_map = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "banana"},
            "data": {"field1": "val1", "field2": "val2"}
        });

        let out = execute(
            &config_map,
            &[Instruction::merge("values.data | default(none)", "data")],
        )
        .unwrap();

        insta::assert_snapshot!(redact(out.trim_end()), @r#"
        apiVersion: v1
        {%- set TOKEN %}
        field1: val1
        field2: val2
        {%- endset %}
        {{ {"data": (TOKEN | fromyaml) | merge_overwrite(values.data | default(none))} | toyaml | indent(0) }}
        kind: ConfigMap
        metadata:
          name: banana
        "#);
    }

    #[test]
    fn test_merge_sequence_uses_concat() {
        let config_map = json!({
            "kind": "ConfigMap",
            "data": [{"field1": "val1"}, {"field2": "val2"}]
        });

        let out = execute(&config_map, &[Instruction::merge("values.data", "data")]).unwrap();

        assert!(out.contains("- field1: val1\n- field2: val2\n{%- endset %}"));
        assert!(redact(&out).contains(
            "{{ {\"data\": (TOKEN | fromyaml) | concat(values.data)} | toyaml | indent(0) }}"
        ));
    }

    #[test]
    fn test_merge_map_item_inside_sequence() {
        let config_map = json!({
            "kind": "ConfigMap",
            "data": [{"field1": "val1"}, {"field2": "val2"}]
        });

        let out = execute(&config_map, &[Instruction::merge("values.first", "data.0")]).unwrap();

        let out = redact(&out);
        assert!(out.contains(
            "{{ [(TOKEN | fromyaml) | merge_overwrite(values.first)] | toyaml | indent(0) }}"
        ));
        assert!(!out.contains("concat"));
        assert!(out.contains("- field2: val2"));
    }

    #[test]
    fn test_block_keeps_sequence_marker() {
        let doc = json!({"items": [{"name": "a", "tags": {"x": "y"}}]});

        let out = execute(&doc, &[Instruction::conditional("show", "items.0.name")]).unwrap();

        assert_eq!(
            out,
            "items:\n-\n  {%- if show %}\n  name: a\n  {%- endif %}\n  tags:\n    x: y\n"
        );
    }

    #[test]
    fn test_value_strips_quotes() {
        let doc = json!({"metadata": {"namespace": ""}});
        let mut quoted = execute(&doc, &[Instruction::value("ns", "metadata.namespace")]).unwrap();
        assert_eq!(quoted, "metadata:\n  namespace: {{ ns }}\n");

        quoted = replace(
            &Jinja,
            "a: 'pm_0000000000000000'\n",
            &Mark {
                instruction: &Instruction::value("x", "a"),
                token: "pm_0000000000000000".to_string(),
                literal: JsonValue::Null,
                site: FieldSite::Key("a".to_string()),
            },
        )
        .unwrap();
        assert_eq!(quoted, "a: {{ x }}\n");
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let doc = json!({"a": 1});
        let out = execute(&doc, &[Instruction::value("x", "b.c")]).unwrap();
        assert_eq!(out, "a: 1\n");
    }

    #[test]
    fn test_empty_path_segment_rejected() {
        let doc = json!({"a": 1});
        assert!(matches!(
            execute(&doc, &[Instruction::value("x", "a..b")]),
            Err(ParametrizeError::EmptyPath)
        ));
    }

    #[test]
    fn test_literal_text_is_escaped() {
        let doc = json!({"description": "use {{ .Name }}"});
        let out = execute(&doc, &[]).unwrap();
        assert!(out.contains("use {{ \"{{\" }} .Name }}"));
        assert!(!out.contains("{{ .Name"));
    }

    #[test]
    fn test_escaped_dots_in_path() {
        let path = join_path(&["metadata", "annotations", "cert-manager.io/inject-ca-from"]);
        assert_eq!(path, "metadata.annotations.cert-manager\\.io/inject-ca-from");
        assert_eq!(
            split_path(&path),
            vec!["metadata", "annotations", "cert-manager.io/inject-ca-from"]
        );

        let doc = json!({"metadata": {"annotations": {"cert-manager.io/inject-ca-from": ""}}});
        let out = execute(&doc, &[Instruction::value("ca", path)]).unwrap();
        assert!(out.contains("cert-manager.io/inject-ca-from: {{ ca }}"));
    }

    #[test]
    fn test_tokens_are_deterministic() {
        let instruction = Instruction::merge("values.spec", "spec");
        assert_eq!(instruction.token(0), instruction.token(0));
        assert_ne!(instruction.token(0), instruction.token(1));
        assert_eq!(instruction.token(0).len(), TOKEN_PREFIX.len() + 16);
    }
}
