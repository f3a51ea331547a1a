//! Certificate providers
//!
//! Webhook-serving deployments need a TLS certificate, and the webhook
//! registrations need the matching CA bundle. Both are delegated to a
//! [`CertificateProvider`], looked up by name in a [`CertificateProviders`]
//! registry when the chart is built.

mod certmanager;

pub use certmanager::CertManager;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConvertError, Result};
use crate::manifest::TemplateObject;
use crate::naming::{name_with_suffix, webhook_service_name};

/// What a provider knows about one webhook-serving deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateConfig {
    /// Service the webhooks are reached through
    pub webhook_service_name: String,
    /// Name of the certificate, and of the secret holding it
    pub cert_name: String,
}

impl CertificateConfig {
    pub fn new(csv_name: &str, deployment_name: &str) -> Self {
        Self {
            webhook_service_name: webhook_service_name(deployment_name),
            cert_name: name_with_suffix(&format!("{}-{}", csv_name, deployment_name), "cert"),
        }
    }
}

/// Where the serving certificate is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSecretInfo {
    pub secret_name: String,
    pub certificate_key: String,
    pub private_key_key: String,
}

/// Supplies TLS material for webhook-serving deployments
///
/// Objects handed to the `modify_*` hooks are rendered as templates
/// afterwards: values only known at install time (the release namespace)
/// must be set through instructions, see
/// [`TemplateObject::set_annotation_expr`].
pub trait CertificateProvider: fmt::Debug + Send + Sync {
    /// Registry key, e.g. `cert-manager`
    fn name(&self) -> &str;

    fn modify_service(&self, _service: &mut TemplateObject, _config: &CertificateConfig) {}

    fn modify_validating_webhook(&self, webhook: &mut TemplateObject, config: &CertificateConfig);

    fn modify_mutating_webhook(&self, webhook: &mut TemplateObject, config: &CertificateConfig);

    /// Called for CRDs whose conversion webhook the deployment serves
    fn modify_crd(&self, crd: &mut TemplateObject, config: &CertificateConfig);

    /// Extra objects to install next to the deployment
    fn additional_objects(&self, config: &CertificateConfig) -> Result<Vec<TemplateObject>>;

    fn cert_secret_info(&self, config: &CertificateConfig) -> CertSecretInfo;
}

/// Certificate providers by name
#[derive(Debug, Clone, Default)]
pub struct CertificateProviders {
    providers: BTreeMap<String, Arc<dyn CertificateProvider>>,
}

impl CertificateProviders {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the providers that ship with the crate
    pub fn builtin() -> Self {
        let mut providers = Self::new();
        providers.register(Arc::new(CertManager));
        providers
    }

    /// Add a provider, replacing any provider of the same name
    pub fn register(&mut self, provider: Arc<dyn CertificateProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn CertificateProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ConvertError::UnknownCertificateProvider {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
