//! The static kind registry.

use crate::{Error, GroupKind};

pub const CORE_GROUP: &str = "";
pub const DISCOVERY_GROUP: &str = "discovery.k8s.io";
pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";
pub const POLICY_GROUP: &str = "gateway.flomesh.io";
pub const EXTENSION_GROUP: &str = "extension.gateway.flomesh.io";
pub const MULTICLUSTER_GROUP: &str = "flomesh.io";

/// The part an object plays in determining the emitted configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Anchor,
    Route,
    Policy,
    Filter,
    Referent,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Namespaced,
    Cluster,
}

/// The rule that decides whether an event on a kind is effective.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Every event is effective.
    Always,
    /// Insert requires acceptance; delete requires presence in the index.
    AcceptedGateway,
    /// At least one parent ref resolves to an anchor in the index.
    EffectiveRoute,
    /// A target ref resolves to an effective anchor, route or routable service.
    EffectiveTargetRefs,
    /// A target ref names a routable Service or ServiceImport.
    RoutableTargetServices,
    /// A target ref names a routable Service or ServiceImport in the policy's
    /// own namespace.
    RoutableLocalTargetServices,
    /// A target ref names an observed TCPRoute or UDPRoute in the policy's own
    /// namespace.
    ValidLocalTargetRoutes,
    Filter,
    ListenerFilter,
    FilterDefinition,
    FilterConfig,
    /// The object is itself a routable service.
    RoutableService,
    /// Acts on the Service of the same name.
    Endpoints,
    /// Acts on the Service named by the slice's label or owner.
    EndpointSlice,
    Secret,
    ConfigMap,
}

/// A registry entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KindInfo {
    pub group: &'static str,
    pub kind: &'static str,
    pub role: Role,
    pub scope: Scope,
    pub trigger: Trigger,
    /// For policies, the kinds a target ref may name.
    pub targets: &'static [(&'static str, &'static str)],
}

const ROUTE_AND_GATEWAY_TARGETS: &[(&str, &str)] = &[
    (GATEWAY_GROUP, "Gateway"),
    (GATEWAY_GROUP, "HTTPRoute"),
    (GATEWAY_GROUP, "GRPCRoute"),
    (CORE_GROUP, "Service"),
    (MULTICLUSTER_GROUP, "ServiceImport"),
];

const ROUTE_TARGETS: &[(&str, &str)] = &[(GATEWAY_GROUP, "HTTPRoute"), (GATEWAY_GROUP, "GRPCRoute")];

const SERVICE_TARGETS: &[(&str, &str)] = &[
    (CORE_GROUP, "Service"),
    (MULTICLUSTER_GROUP, "ServiceImport"),
];

const LOCAL_ROUTE_TARGETS: &[(&str, &str)] = &[
    (GATEWAY_GROUP, "TCPRoute"),
    (GATEWAY_GROUP, "UDPRoute"),
];

const GATEWAY_TARGETS: &[(&str, &str)] = &[(GATEWAY_GROUP, "Gateway")];

const fn entry(
    group: &'static str,
    kind: &'static str,
    role: Role,
    trigger: Trigger,
) -> KindInfo {
    KindInfo {
        group,
        kind,
        role,
        scope: Scope::Namespaced,
        trigger,
        targets: &[],
    }
}

const fn cluster(group: &'static str, kind: &'static str, role: Role, trigger: Trigger) -> KindInfo {
    KindInfo {
        scope: Scope::Cluster,
        ..entry(group, kind, role, trigger)
    }
}

const fn policy(
    kind: &'static str,
    trigger: Trigger,
    targets: &'static [(&'static str, &'static str)],
) -> KindInfo {
    KindInfo {
        targets,
        ..entry(POLICY_GROUP, kind, Role::Policy, trigger)
    }
}

const fn filter_config(kind: &'static str) -> KindInfo {
    entry(EXTENSION_GROUP, kind, Role::Filter, Trigger::FilterConfig)
}

/// Every kind the controller understands.
pub static KINDS: &[KindInfo] = &[
    // Anchors
    cluster(GATEWAY_GROUP, "GatewayClass", Role::Anchor, Trigger::Always),
    entry(
        GATEWAY_GROUP,
        "Gateway",
        Role::Anchor,
        Trigger::AcceptedGateway,
    ),
    // Routes
    entry(GATEWAY_GROUP, "HTTPRoute", Role::Route, Trigger::EffectiveRoute),
    entry(GATEWAY_GROUP, "GRPCRoute", Role::Route, Trigger::EffectiveRoute),
    entry(GATEWAY_GROUP, "TCPRoute", Role::Route, Trigger::EffectiveRoute),
    entry(GATEWAY_GROUP, "TLSRoute", Role::Route, Trigger::EffectiveRoute),
    entry(GATEWAY_GROUP, "UDPRoute", Role::Route, Trigger::EffectiveRoute),
    // Policies
    policy(
        "AccessControlPolicy",
        Trigger::EffectiveTargetRefs,
        ROUTE_AND_GATEWAY_TARGETS,
    ),
    policy(
        "RateLimitPolicy",
        Trigger::EffectiveTargetRefs,
        ROUTE_AND_GATEWAY_TARGETS,
    ),
    policy(
        "FaultInjectionPolicy",
        Trigger::EffectiveTargetRefs,
        ROUTE_TARGETS,
    ),
    policy(
        "RouteRuleFilterPolicy",
        Trigger::ValidLocalTargetRoutes,
        LOCAL_ROUTE_TARGETS,
    ),
    policy(
        "HealthCheckPolicy",
        Trigger::RoutableTargetServices,
        SERVICE_TARGETS,
    ),
    policy(
        "LoadBalancerPolicy",
        Trigger::RoutableTargetServices,
        SERVICE_TARGETS,
    ),
    policy(
        "SessionStickyPolicy",
        Trigger::RoutableTargetServices,
        SERVICE_TARGETS,
    ),
    policy(
        "UpstreamTLSPolicy",
        Trigger::RoutableTargetServices,
        SERVICE_TARGETS,
    ),
    policy(
        "RetryPolicy",
        Trigger::RoutableTargetServices,
        SERVICE_TARGETS,
    ),
    policy(
        "BackendLBPolicy",
        Trigger::RoutableLocalTargetServices,
        SERVICE_TARGETS,
    ),
    KindInfo {
        targets: SERVICE_TARGETS,
        ..entry(
            GATEWAY_GROUP,
            "BackendTLSPolicy",
            Role::Policy,
            Trigger::RoutableLocalTargetServices,
        )
    },
    // Filters
    entry(EXTENSION_GROUP, "Filter", Role::Filter, Trigger::Filter),
    cluster(
        EXTENSION_GROUP,
        "FilterDefinition",
        Role::Filter,
        Trigger::FilterDefinition,
    ),
    filter_config("FilterConfig"),
    KindInfo {
        targets: GATEWAY_TARGETS,
        ..entry(
            EXTENSION_GROUP,
            "ListenerFilter",
            Role::Filter,
            Trigger::ListenerFilter,
        )
    },
    filter_config("CircuitBreaker"),
    filter_config("ConcurrencyLimit"),
    filter_config("DNSModifier"),
    filter_config("ExternalRateLimit"),
    filter_config("FaultInjection"),
    filter_config("HTTPLog"),
    filter_config("IPRestriction"),
    filter_config("Metrics"),
    filter_config("ProxyTag"),
    filter_config("RateLimit"),
    filter_config("RequestTermination"),
    filter_config("Zipkin"),
    // Referents
    entry(CORE_GROUP, "Service", Role::Referent, Trigger::RoutableService),
    entry(
        MULTICLUSTER_GROUP,
        "ServiceImport",
        Role::Referent,
        Trigger::RoutableService,
    ),
    entry(CORE_GROUP, "Endpoints", Role::Referent, Trigger::Endpoints),
    entry(
        DISCOVERY_GROUP,
        "EndpointSlice",
        Role::Referent,
        Trigger::EndpointSlice,
    ),
    entry(CORE_GROUP, "Secret", Role::Referent, Trigger::Secret),
    entry(CORE_GROUP, "ConfigMap", Role::Referent, Trigger::ConfigMap),
    entry(
        GATEWAY_GROUP,
        "ReferenceGrant",
        Role::Referent,
        Trigger::Always,
    ),
];

/// Looks up the registry entry for a group and kind.
pub fn lookup(group: &str, kind: &str) -> Result<&'static KindInfo, Error> {
    KINDS
        .iter()
        .find(|k| k.is(group, kind))
        .ok_or_else(|| Error::UnknownKind(GroupKind::new(group, kind)))
}

// === impl KindInfo ===

impl KindInfo {
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group, self.kind)
    }

    pub fn is(&self, group: &str, kind: &str) -> bool {
        let group = if group == "core" { CORE_GROUP } else { group };
        self.group == group && self.kind == kind
    }

    pub fn is_namespaced(&self) -> bool {
        self.scope == Scope::Namespaced
    }

    /// Whether a policy of this kind may target the given kind.
    pub fn may_target(&self, group: &str, kind: &str) -> bool {
        let group = if group == "core" { CORE_GROUP } else { group };
        self.targets.iter().any(|&(g, k)| g == group && k == kind)
    }
}

/// Whether the kind is an anchor kind.
pub fn is_anchor(group: &str, kind: &str) -> bool {
    lookup(group, kind).is_ok_and(|k| k.role == Role::Anchor)
}

/// Whether the kind is a route kind.
pub fn is_route(group: &str, kind: &str) -> bool {
    lookup(group, kind).is_ok_and(|k| k.role == Role::Route)
}

/// Whether the kind is a Service or ServiceImport.
pub fn is_service(group: &str, kind: &str) -> bool {
    let group = if group == "core" { CORE_GROUP } else { group };
    (group == CORE_GROUP && kind == "Service")
        || (group == MULTICLUSTER_GROUP && kind == "ServiceImport")
}
