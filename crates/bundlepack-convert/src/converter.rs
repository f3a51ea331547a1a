//! Main converter logic
//!
//! Orchestrates the conversion of a registry+v1 bundle into a chart:
//! - validates the bundle and resolves its scoping configuration
//! - generates the helper templates every object template imports
//! - generates service accounts, RBAC, deployments, webhook wiring, CRDs
//!   and the bundle's static manifests
//! - builds the chart metadata and the values schema

use bundlepack_core::{Bundle, Chart, ChartFile, ChartMaintainer, ChartMetadata, Values};
use semver::Version;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::certprovider::{CertificateProvider, CertificateProviders};
use crate::deployment::deployment_files;
use crate::error::{ConvertError, Result};
use crate::helpers;
use crate::manifest::TemplateFile;
use crate::objects::{crd_files, passthrough_files};
use crate::rbac::{cluster_permissions_files, permissions_files, service_account_files};
use crate::scoping::{self, ScopingConfig};
use crate::validate::validate;
use crate::values_schema::values_schema;
use crate::webhooks::{certificate_secrets, webhook_files};

/// Options for the converter
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Name of the certificate provider wiring webhook TLS, e.g. `cert-manager`
    pub certificate_provider: Option<String>,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn certificate_provider(mut self, name: impl Into<String>) -> Self {
        self.certificate_provider = Some(name.into());
        self
    }
}

/// Convert registry+v1 bundles into charts
#[derive(Debug, Clone)]
pub struct Converter {
    options: ConvertOptions,
    providers: CertificateProviders,
}

impl Converter {
    /// A converter using the built-in certificate providers
    pub fn new(options: ConvertOptions) -> Self {
        Self::with_providers(options, CertificateProviders::builtin())
    }

    /// A converter looking certificate providers up in `providers`
    pub fn with_providers(options: ConvertOptions, providers: CertificateProviders) -> Self {
        Self { options, providers }
    }

    /// Scoping configuration the chart for `bundle` exposes
    pub fn scoping(&self, bundle: &Bundle) -> Result<ScopingConfig> {
        scoping::resolve(&bundle.csv.supported_install_modes())
    }

    /// Convert `bundle` into a chart
    ///
    /// Nothing is returned unless every template could be generated.
    pub fn convert(&self, bundle: &Bundle) -> Result<Chart> {
        validate(bundle)?;
        let scoping = self.scoping(bundle)?;
        let provider = self.provider(bundle)?;

        let templates = self.templates(bundle, &scoping, provider.as_deref())?;
        let metadata = chart_metadata(bundle)?;
        let values_schema = values_schema(&scoping)?;

        tracing::info!(
            package = %bundle.package_name,
            version = %metadata.version,
            templates = templates.len(),
            scoping = ?scoping.field.map(|f| f.name()),
            "converted bundle"
        );

        Ok(Chart {
            metadata,
            values: Values::new(),
            values_schema,
            templates,
        })
    }

    /// The configured provider; required as soon as the bundle has webhooks
    fn provider(&self, bundle: &Bundle) -> Result<Option<Arc<dyn CertificateProvider>>> {
        let provider = self
            .options
            .certificate_provider
            .as_deref()
            .map(|name| self.providers.get(name))
            .transpose()?;

        if provider.is_none() {
            if let Some(webhook) = bundle.csv.spec.webhook_definitions.first() {
                return Err(ConvertError::MissingCertificateProvider {
                    deployment: webhook.deployment_name.clone(),
                });
            }
        }
        Ok(provider)
    }

    fn templates(
        &self,
        bundle: &Bundle,
        scoping: &ScopingConfig,
        provider: Option<&dyn CertificateProvider>,
    ) -> Result<Vec<ChartFile>> {
        let csv = &bundle.csv;
        let mut files = vec![helpers::target_namespaces(scoping)];
        let mut errors = Vec::new();

        let mut add = |generated: Result<Vec<TemplateFile>>| match generated {
            Ok(generated) => files.extend(generated),
            Err(e) => errors.push(e),
        };

        add(service_account_files(csv));
        add(permissions_files(csv));
        add(cluster_permissions_files(csv));

        let certificates = provider
            .map(|provider| certificate_secrets(csv, provider))
            .unwrap_or_default();
        add(deployment_files(csv, &certificates).and_then(|deployments| {
            let mut generated = vec![helpers::deployments(&deployments.defaults)?];
            generated.extend(deployments.files);
            Ok(generated)
        }));

        if let Some(provider) = provider {
            add(webhook_files(csv, provider));
        }
        add(crd_files(bundle, provider));
        add(passthrough_files(bundle));

        ConvertError::collect(errors)?;
        ordered(files)
    }
}

/// Templates sorted by path; two objects may not share a path
fn ordered(files: Vec<TemplateFile>) -> Result<Vec<ChartFile>> {
    let mut by_path = BTreeMap::new();
    let mut errors = Vec::new();

    for file in files {
        if by_path.contains_key(&file.path) {
            errors.push(ConvertError::invalid_bundle(format!(
                "two generated objects share the template path {}",
                file.path
            )));
            continue;
        }
        tracing::debug!(path = %file.path, bytes = file.content.len(), "generated template");
        by_path.insert(file.path, file.content);
    }

    ConvertError::collect(errors)?;
    Ok(by_path
        .into_iter()
        .map(|(path, content)| ChartFile::new(path, content))
        .collect())
}

/// `Chart.yaml` from the CSV
fn chart_metadata(bundle: &Bundle) -> Result<ChartMetadata> {
    let spec = &bundle.csv.spec;
    let version = spec
        .version
        .as_deref()
        .ok_or_else(|| ConvertError::invalid_bundle("cluster service version has no spec.version"))?;
    let version = Version::parse(version).map_err(|source| ConvertError::InvalidVersion {
        version: version.to_string(),
        source,
    })?;

    let mut metadata = ChartMetadata::new(&bundle.package_name, version);
    metadata.description = spec.description.clone().filter(|d| !d.is_empty());
    metadata.keywords = spec.keywords.clone();
    metadata.maintainers = spec
        .maintainers
        .iter()
        .map(|m| ChartMaintainer {
            name: m.name.clone(),
            email: Some(m.email.clone()).filter(|e| !e.is_empty()),
        })
        .collect();
    metadata.home = spec
        .provider
        .as_ref()
        .and_then(|p| p.url.clone())
        .filter(|u| !u.is_empty());
    metadata.sources = spec.links.iter().map(|l| l.url.clone()).collect();
    metadata.kube_version = spec
        .min_kube_version
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| format!(">= {}", v));
    metadata.annotations = bundle.csv.annotations();
    Ok(metadata)
}

/// Convert `bundle` with the built-in certificate providers
pub fn convert(bundle: &Bundle, options: ConvertOptions) -> Result<Chart> {
    Converter::new(options).convert(bundle)
}
