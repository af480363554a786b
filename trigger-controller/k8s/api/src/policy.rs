//! Policy-attachment resources.
//!
//! Most policies only matter to the controller through their target refs, so
//! their configuration is carried opaquely and passed through to generated
//! configuration as-is.

pub mod target_ref;
pub mod tls;

pub use self::{
    target_ref::{LocalTargetRef, NamespacedTargetRef, RuleTargetRef},
    tls::{UpstreamTlsPolicy, UpstreamTlsPolicySpec},
};
use crate::refs::LocalObjectReference;

pub type Config = serde_json::Map<String, serde_json::Value>;

macro_rules! policies {
    ($( $spec:ident => $kind:tt as $root:tt ),+ $(,)?) => {
        $(
            #[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
            #[kube(
                group = "gateway.flomesh.io",
                version = "v1alpha2",
                kind = $kind,
                root = $root,
                namespaced,
                schema = "disabled"
            )]
            #[serde(rename_all = "camelCase")]
            pub struct $spec {
                #[serde(default)]
                pub target_refs: Vec<NamespacedTargetRef>,
                #[serde(flatten)]
                pub config: Config,
            }
        )+
    };
}

policies! {
    AccessControlPolicySpec => "AccessControlPolicy" as "AccessControlPolicy",
    RateLimitPolicySpec => "RateLimitPolicy" as "RateLimitPolicy",
    FaultInjectionPolicySpec => "FaultInjectionPolicy" as "FaultInjectionPolicy",
    HealthCheckPolicySpec => "HealthCheckPolicy" as "HealthCheckPolicy",
    LoadBalancerPolicySpec => "LoadBalancerPolicy" as "LoadBalancerPolicy",
    SessionStickyPolicySpec => "SessionStickyPolicy" as "SessionStickyPolicy",
    RetryPolicySpec => "RetryPolicy" as "RetryPolicy",
}

#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "gateway.flomesh.io",
    version = "v1alpha2",
    kind = "BackendLBPolicy",
    root = "BackendLbPolicy",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct BackendLbPolicySpec {
    #[serde(default)]
    pub target_refs: Vec<LocalTargetRef>,
    #[serde(flatten)]
    pub config: Config,
}

/// Attaches filters to named rules of TCP and UDP routes.
#[derive(Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize)]
#[kube(
    group = "gateway.flomesh.io",
    version = "v1alpha2",
    kind = "RouteRuleFilterPolicy",
    root = "RouteRuleFilterPolicy",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteRuleFilterPolicySpec {
    #[serde(default)]
    pub target_refs: Vec<RuleTargetRef>,
    #[serde(default)]
    pub filter_refs: Vec<LocalObjectReference>,
}
