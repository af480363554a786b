//! Extension filters: user-defined processing steps that plug into routes and
//! listeners by reference.

use crate::refs::LocalObjectReference;

#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "extension.gateway.flomesh.io",
    version = "v1alpha1",
    kind = "Filter",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub definition_ref: Option<LocalObjectReference>,
    pub config_ref: Option<LocalObjectReference>,
}

#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "extension.gateway.flomesh.io",
    version = "v1alpha1",
    kind = "ListenerFilter",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ListenerFilterSpec {
    #[serde(rename = "type")]
    pub filter_type: String,
    #[serde(default)]
    pub target_refs: Vec<ListenerTargetRef>,
    pub definition_ref: Option<LocalObjectReference>,
    pub config_ref: Option<LocalObjectReference>,
    pub priority: Option<i32>,
}

/// Names a listener by gateway and port.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerTargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub port: i32,
}

#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "extension.gateway.flomesh.io",
    version = "v1alpha1",
    kind = "FilterDefinition",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinitionSpec {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub scope: Option<String>,
    pub protocol: Option<String>,
    pub script: String,
}

#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "extension.gateway.flomesh.io",
    version = "v1alpha1",
    kind = "FilterConfig",
    namespaced,
    schema = "disabled"
)]
pub struct FilterConfigSpec {
    /// Free-form YAML handed to the filter script.
    pub config: String,
}

macro_rules! filter_configs {
    ($( $spec:ident => $kind:tt as $root:tt ),+ $(,)?) => {
        $(
            #[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
            #[kube(
                group = "extension.gateway.flomesh.io",
                version = "v1alpha1",
                kind = $kind,
                root = $root,
                namespaced,
                schema = "disabled"
            )]
            pub struct $spec {
                #[serde(flatten)]
                pub config: serde_json::Map<String, serde_json::Value>,
            }
        )+
    };
}

filter_configs! {
    CircuitBreakerSpec => "CircuitBreaker" as "CircuitBreaker",
    ConcurrencyLimitSpec => "ConcurrencyLimit" as "ConcurrencyLimit",
    DnsModifierSpec => "DNSModifier" as "DnsModifier",
    ExternalRateLimitSpec => "ExternalRateLimit" as "ExternalRateLimit",
    FaultInjectionSpec => "FaultInjection" as "FaultInjection",
    HttpLogSpec => "HTTPLog" as "HttpLog",
    IpRestrictionSpec => "IPRestriction" as "IpRestriction",
    MetricsSpec => "Metrics" as "Metrics",
    ProxyTagSpec => "ProxyTag" as "ProxyTag",
    RateLimitSpec => "RateLimit" as "RateLimit",
    RequestTerminationSpec => "RequestTermination" as "RequestTermination",
    ZipkinSpec => "Zipkin" as "Zipkin",
}
