use super::NamespacedTargetRef;
use crate::refs::SecretObjectReference;

#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "gateway.flomesh.io",
    version = "v1alpha2",
    kind = "UpstreamTLSPolicy",
    root = "UpstreamTlsPolicy",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTlsPolicySpec {
    #[serde(default)]
    pub target_refs: Vec<NamespacedTargetRef>,
    pub default_config: Option<UpstreamTlsConfig>,
    #[serde(default)]
    pub ports: Vec<PortUpstreamTls>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTlsConfig {
    pub certificate_ref: SecretObjectReference,
    #[serde(rename = "mTLS")]
    pub mtls: Option<bool>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortUpstreamTls {
    pub port: i32,
    pub config: Option<UpstreamTlsConfig>,
}

// === impl UpstreamTlsPolicySpec ===

impl UpstreamTlsPolicySpec {
    /// Every certificate the policy refers to, default first.
    pub fn certificate_refs(&self) -> impl Iterator<Item = &SecretObjectReference> {
        self.default_config
            .iter()
            .chain(self.ports.iter().filter_map(|p| p.config.as_ref()))
            .map(|c| &c.certificate_ref)
    }
}
