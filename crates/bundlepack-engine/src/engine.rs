//! Template engine based on MiniJinja

use bundlepack_core::chart::TEMPLATES_DIR;
use bundlepack_core::{Chart, RenderContext};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;

/// Result of rendering a chart
#[derive(Debug, Default)]
pub struct RenderResult {
    /// Rendered manifests keyed by chart-relative template path
    pub manifests: BTreeMap<String, String>,
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a configured MiniJinja environment
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(UndefinedBehavior::Lenient);
        }

        // Manifests are YAML: the extension-based default would JSON-escape them
        env.set_auto_escape_callback(|_| AutoEscape::None);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("fromyaml", filters::fromyaml);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("merge_overwrite", filters::merge_overwrite);
        env.add_filter("concat", filters::concat);
        env.add_filter("merge_by_name", filters::merge_by_name);
        env.add_filter("compact", filters::compact);
        env.add_filter("splitlist", filters::splitlist);

        env.add_function("fail", functions::fail);

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &RenderContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();

        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| template_error(&e, template_name, template))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| template_error(&e, template_name, template))?;

        tmpl.render(build_context(context))
            .map_err(|e| template_error(&e, template_name, template))
    }

    /// Render every non-helper template of an in-memory chart
    pub fn render_chart(&self, chart: &Chart, context: &RenderContext) -> Result<RenderResult> {
        let mut env = self.create_environment();
        let mut sources: HashMap<String, String> = HashMap::new();

        // Load everything first so templates can import helpers
        for file in &chart.templates {
            let name = template_name(&file.path).to_string();
            let content = file.text()?.to_string();
            env.add_template_owned(name.clone(), content.clone())
                .map_err(|e| template_error(&e, &name, &content))?;
            sources.insert(name, content);
        }

        let ctx = build_context(context);
        let mut result = RenderResult::default();

        for file in &chart.templates {
            if file.is_helper() {
                continue;
            }

            let name = template_name(&file.path);
            let source = sources.get(name).map(String::as_str).unwrap_or_default();

            let tmpl = env
                .get_template(name)
                .map_err(|e| template_error(&e, name, source))?;
            let rendered = tmpl
                .render(&ctx)
                .map_err(|e| template_error(&e, name, source))?;

            let trimmed = rendered.trim();
            if trimmed.is_empty() || trimmed == "---" {
                tracing::debug!(template = %file.path, "rendered empty, skipping");
                continue;
            }

            result.manifests.insert(file.path.clone(), rendered);
        }

        Ok(result)
    }

    /// Render a chart stored on disk
    pub fn render_chart_dir(&self, dir: &Path, context: &RenderContext) -> Result<RenderResult> {
        let chart = Chart::load(dir)?;
        self.render_chart(&chart, context)
    }
}

/// Name a template is registered under: its path below `templates/`
fn template_name(path: &str) -> &str {
    path.strip_prefix(TEMPLATES_DIR)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

fn build_context(context: &RenderContext) -> minijinja::Value {
    minijinja::context! {
        values => &context.values,
        release => &context.release,
        chart => &context.chart,
    }
}

fn template_error(err: &minijinja::Error, name: &str, source: &str) -> EngineError {
    EngineError::Template {
        template: name.to_string(),
        source: TemplateError::from_minijinja(err, name, source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlepack_core::{ChartFile, ChartMetadata, ReleaseInfo, Values};
    use semver::Version;
    use serde_json::json;

    fn create_test_context(values: serde_json::Value) -> RenderContext {
        let metadata = ChartMetadata::new("etcd", Version::new(0, 9, 4));
        RenderContext::new(
            Values(values),
            ReleaseInfo::new("etcd", "operators"),
            &metadata,
        )
    }

    fn chart(templates: Vec<ChartFile>) -> Chart {
        Chart {
            metadata: ChartMetadata::new("etcd", Version::new(0, 9, 4)),
            values: Values::new(),
            values_schema: json!({"type": "object"}),
            templates,
        }
    }

    #[test]
    fn test_render_simple() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({"watchNamespace": "team-a"}));

        let result = engine
            .render_string("ns: {{ values.watchNamespace }}", &ctx, "test.yaml")
            .unwrap();

        assert_eq!(result, "ns: team-a");
    }

    #[test]
    fn test_render_release_and_chart() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({}));

        let template = "{{ release.namespace }}/{{ chart.name }}-{{ chart.version }}";
        let result = engine.render_string(template, &ctx, "test.yaml").unwrap();

        assert_eq!(result, "operators/etcd-0.9.4");
    }

    #[test]
    fn test_yaml_is_not_escaped() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({}));

        let result = engine
            .render_string("a: {{ \"x\\\"y\" }}", &ctx, "test.yaml")
            .unwrap();

        assert_eq!(result, "a: x\"y");
    }

    #[test]
    fn test_undefined_error() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({}));

        let err = engine
            .render_string("value: {{ values.missing }}", &ctx, "test.yaml")
            .unwrap_err();

        assert!(err.template_error().is_some());
    }

    #[test]
    fn test_default_guard_on_missing_value() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({}));

        let result = engine
            .render_string(
                "{{ values.installMode | default(\"AllNamespaces\") }}",
                &ctx,
                "test.yaml",
            )
            .unwrap();

        assert_eq!(result, "AllNamespaces");
    }

    #[test]
    fn test_render_chart_with_helper_import() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({}));
        let chart = chart(vec![
            ChartFile::new(
                "templates/_helpers.names.tpl",
                "{%- macro ns(release) -%}{{ release.namespace }}{%- endmacro %}",
            ),
            ChartFile::new(
                "templates/core.ConfigMap-a.yaml",
                "{%- from \"_helpers.names.tpl\" import ns %}\nnamespace: {{ ns(release) }}\n",
            ),
            ChartFile::new("templates/core.ConfigMap-b.yaml", "{%- if false %}x{% endif %}"),
        ]);

        let result = engine.render_chart(&chart, &ctx).unwrap();

        assert_eq!(result.manifests.len(), 1);
        assert_eq!(
            result.manifests["templates/core.ConfigMap-a.yaml"],
            "\nnamespace: operators"
        );
    }

    #[test]
    fn test_render_chart_error_names_template() {
        let engine = Engine::default();
        let ctx = create_test_context(json!({}));
        let chart = chart(vec![ChartFile::new(
            "templates/core.ConfigMap-a.yaml",
            "a: {{ fail(\"boom\") }}",
        )]);

        let err = engine.render_chart(&chart, &ctx).unwrap_err();

        match err {
            EngineError::Template { template, source } => {
                assert_eq!(template, "core.ConfigMap-a.yaml");
                assert_eq!(source.message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_chart_dir() {
        let dir = tempfile::tempdir().unwrap();
        let chart = chart(vec![ChartFile::new(
            "templates/core.ServiceAccount-etcd-operator.yaml",
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: etcd-operator\n  namespace: {{ release.namespace }}\n",
        )]);
        chart.write_to_dir(dir.path()).unwrap();

        let result = Engine::default()
            .render_chart_dir(dir.path(), &create_test_context(json!({})))
            .unwrap();

        let rendered = &result.manifests["templates/core.ServiceAccount-etcd-operator.yaml"];
        assert!(rendered.contains("namespace: operators"));
    }

    #[test]
    fn test_template_name() {
        assert_eq!(template_name("templates/a.yaml"), "a.yaml");
        assert_eq!(template_name("a.yaml"), "a.yaml");
    }
}
