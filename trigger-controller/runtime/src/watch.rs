use crate::{
    core::kind::{CORE_GROUP, DISCOVERY_GROUP},
    k8s::{self, extension, gateway, multicluster, policy, Classify},
    SharedDispatch,
};
use kube::{
    runtime::watcher, Client, ClusterResourceScope, NamespaceResourceScope, Resource,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{info_span, warn, Instrument};

/// Spawns a watch feeding dispatch for every registered kind.
pub(crate) async fn spawn_all<S>(runtime: &mut kubert::Runtime<S>, dispatch: &SharedDispatch) {
    // Anchors
    cluster::<gateway::GatewayClass, _>(runtime, dispatch).await;
    namespaced::<gateway::Gateway, _>(runtime, dispatch).await;

    // Routes
    namespaced::<gateway::HTTPRoute, _>(runtime, dispatch).await;
    namespaced::<gateway::GRPCRoute, _>(runtime, dispatch).await;
    namespaced::<gateway::TCPRoute, _>(runtime, dispatch).await;
    namespaced::<gateway::TLSRoute, _>(runtime, dispatch).await;
    namespaced::<gateway::UDPRoute, _>(runtime, dispatch).await;

    // Policies
    namespaced::<policy::AccessControlPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::RateLimitPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::FaultInjectionPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::RouteRuleFilterPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::HealthCheckPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::LoadBalancerPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::SessionStickyPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::UpstreamTlsPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::RetryPolicy, _>(runtime, dispatch).await;
    namespaced::<policy::BackendLbPolicy, _>(runtime, dispatch).await;
    namespaced::<gateway::BackendTLSPolicy, _>(runtime, dispatch).await;

    // Filters
    namespaced::<extension::Filter, _>(runtime, dispatch).await;
    cluster::<extension::FilterDefinition, _>(runtime, dispatch).await;
    namespaced::<extension::FilterConfig, _>(runtime, dispatch).await;
    namespaced::<extension::ListenerFilter, _>(runtime, dispatch).await;
    namespaced::<extension::CircuitBreaker, _>(runtime, dispatch).await;
    namespaced::<extension::ConcurrencyLimit, _>(runtime, dispatch).await;
    namespaced::<extension::DnsModifier, _>(runtime, dispatch).await;
    namespaced::<extension::ExternalRateLimit, _>(runtime, dispatch).await;
    namespaced::<extension::FaultInjection, _>(runtime, dispatch).await;
    namespaced::<extension::HttpLog, _>(runtime, dispatch).await;
    namespaced::<extension::IpRestriction, _>(runtime, dispatch).await;
    namespaced::<extension::Metrics, _>(runtime, dispatch).await;
    namespaced::<extension::ProxyTag, _>(runtime, dispatch).await;
    namespaced::<extension::RateLimit, _>(runtime, dispatch).await;
    namespaced::<extension::RequestTermination, _>(runtime, dispatch).await;
    namespaced::<extension::Zipkin, _>(runtime, dispatch).await;

    // Referents
    namespaced::<k8s::Service, _>(runtime, dispatch).await;
    namespaced::<multicluster::ServiceImport, _>(runtime, dispatch).await;
    namespaced::<k8s::Endpoints, _>(runtime, dispatch).await;
    namespaced::<k8s::EndpointSlice, _>(runtime, dispatch).await;
    namespaced::<k8s::Secret, _>(runtime, dispatch).await;
    namespaced::<k8s::ConfigMap, _>(runtime, dispatch).await;
    namespaced::<gateway::ReferenceGrant, _>(runtime, dispatch).await;
}

async fn namespaced<T, S>(runtime: &mut kubert::Runtime<S>, dispatch: &SharedDispatch)
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    T: Classify + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    if !is_served::<T>(&runtime.client()).await {
        return;
    }
    let events = runtime.watch_all::<T>(watcher::Config::default());
    tokio::spawn(
        kubert::index::namespaced(dispatch.clone(), events)
            .instrument(info_span!("watch", kind = %T::kind(&()))),
    );
}

async fn cluster<T, S>(runtime: &mut kubert::Runtime<S>, dispatch: &SharedDispatch)
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>,
    T: Classify + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    if !is_served::<T>(&runtime.client()).await {
        return;
    }
    let events = runtime.watch_all::<T>(watcher::Config::default());
    tokio::spawn(
        kubert::index::cluster(dispatch.clone(), events)
            .instrument(info_span!("watch", kind = %T::kind(&()))),
    );
}

/// Built-in kinds are always served; custom resources only once their CRDs
/// are installed.
async fn is_served<T>(client: &Client) -> bool
where
    T: Resource<DynamicType = ()>,
{
    let group = T::group(&());
    if group == CORE_GROUP || group == DISCOVERY_GROUP {
        return true;
    }
    if api_resource_exists::<T>(client).await {
        return true;
    }
    warn!(
        kind = %T::kind(&()),
        %group,
        "resource kind not found, skipping watches"
    );
    false
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource<DynamicType = ()>,
{
    client
        .list_api_group_resources(&T::api_version(&()))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&()))
}
