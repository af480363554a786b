use crate::{
    extension::{self, ListenerTargetRef},
    gateway,
    multicluster::ServiceImport,
    policy::{self, NamespacedTargetRef, RuleTargetRef},
    Condition, ConfigMap, EndpointSlice, Endpoints, Secret, Service,
};
use gateway_trigger_core::{
    classify::{
        self, Anchor, Conditions, Fields, Grant, GrantFrom, GrantTo, Listener, Policy, Referent,
        Route,
    },
    kind::{self, Scope},
    Classified, Error, Identity, ObjectRef, ParentRef, TargetRef,
};
use kube::Resource;

/// Generated Gateway API types make some lists optional and others required.
trait List {
    type Item;

    fn list(&self) -> &[Self::Item];
}

impl<T> List for Vec<T> {
    type Item = T;

    fn list(&self) -> &[T] {
        self
    }
}

impl<T> List for Option<Vec<T>> {
    type Item = T;

    fn list(&self) -> &[T] {
        self.as_deref().unwrap_or_default()
    }
}

/// Likewise for group and kind fields, which default when optional.
trait Text {
    fn text(&self) -> Option<&str>;
}

impl Text for String {
    fn text(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl Text for Option<String> {
    fn text(&self) -> Option<&str> {
        self.as_deref()
    }
}

// Each route kind generates its own ref types with the same field names, so
// the conversions are written once over the fields.

macro_rules! parent_refs {
    ($refs:expr) => {
        $refs
            .list()
            .iter()
            .map(|pr| {
                let port = opt_port(pr.port)
                    .map_err(|p| format!("parent ref {} has invalid port {p}", pr.name))?;
                Ok(ParentRef {
                    group: pr.group.text().unwrap_or(kind::GATEWAY_GROUP).to_string(),
                    kind: pr.kind.text().unwrap_or("Gateway").to_string(),
                    namespace: pr.namespace.clone(),
                    name: pr.name.clone(),
                    section_name: pr.section_name.clone(),
                    port,
                })
            })
            .collect::<Result<Vec<_>, String>>()
    };
}

macro_rules! backend_refs {
    ($refs:expr) => {
        $refs
            .map(|b| {
                let port = opt_port(b.port)
                    .map_err(|p| format!("backend ref {} has invalid port {p}", b.name))?;
                Ok(object_ref!(b, "Service").with_port(port))
            })
            .collect::<Result<Vec<_>, String>>()
    };
}

macro_rules! extension_refs {
    ($filters:expr) => {
        $filters.filter_map(|f| f.extension_ref.as_ref().map(|r| local_ref!(r)))
    };
}

macro_rules! object_ref {
    ($r:expr, $kind:expr) => {{
        let r = $r;
        ObjectRef::new(
            r.group.text().unwrap_or_default(),
            r.kind.text().unwrap_or($kind),
            r.name.clone(),
        )
        .with_namespace(r.namespace.clone())
    }};
}

macro_rules! local_ref {
    ($r:expr) => {{
        let r = $r;
        ObjectRef::new(
            r.group.text().unwrap_or_default(),
            r.kind.text().unwrap_or_default(),
            r.name.clone(),
        )
    }};
}

/// Extracts the role-specific fields of a typed resource.
///
/// Failures are reported as a human-readable reason; [`Classify`] wraps them
/// into [`Error::MalformedObject`].
pub trait Project: Resource<DynamicType = ()> {
    fn project(&self, namespace: &str) -> Result<Fields, String>;
}

/// Reduces an observed object to its identity, role and projected fields.
pub trait Classify {
    fn classify(&self) -> Result<Classified, Error>;
}

impl<T: Project> Classify for T {
    fn classify(&self) -> Result<Classified, Error> {
        let info = kind::lookup(&T::group(&()), &T::kind(&()))?;
        let meta = self.meta();

        let name = meta
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::malformed(info.group_kind(), "", "missing name"))?;
        let namespace = match info.scope {
            Scope::Cluster => String::new(),
            Scope::Namespaced => meta
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .ok_or_else(|| Error::malformed(info.group_kind(), &name, "missing namespace"))?,
        };

        let fields = self.project(&namespace).map_err(|reason| {
            Error::malformed(info.group_kind(), format!("{namespace}/{name}"), reason)
        })?;

        let labels = meta
            .labels
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Classified {
            info,
            id: Identity::new(info.group, info.kind, namespace, name),
            version: meta.resource_version.clone(),
            labels,
            fields,
        })
    }
}

// === Anchors ===

impl Project for gateway::GatewayClass {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let conditions = self
            .status
            .as_ref()
            .map(|s| summarize(s.conditions.list()))
            .unwrap_or_default();
        Ok(Fields::Anchor(Anchor {
            conditions,
            controller_name: Some(self.spec.controller_name.clone()),
            ..Anchor::default()
        }))
    }
}

impl Project for gateway::Gateway {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let conditions = self
            .status
            .as_ref()
            .map(|s| summarize(s.conditions.list()))
            .unwrap_or_default();

        let listeners = self
            .spec
            .listeners
            .list()
            .iter()
            .map(|l| {
                let port = port(l.port).ok_or_else(|| {
                    format!("listener {} has invalid port {}", l.name, l.port)
                })?;
                let tls = l.tls.as_ref();
                let certificates = tls.map(|t| t.certificate_refs.list()).unwrap_or_default();
                let cas = tls
                    .and_then(|t| t.frontend_validation.as_ref())
                    .map(|v| v.ca_certificate_refs.list())
                    .unwrap_or_default();
                Ok(Listener {
                    name: l.name.clone(),
                    port,
                    protocol: l.protocol.clone(),
                    hostname: l.hostname.clone(),
                    certificate_refs: certificates
                        .iter()
                        .map(|r| object_ref!(r, "Secret"))
                        .collect(),
                    ca_certificate_refs: cas.iter().map(|r| object_ref!(r, "ConfigMap")).collect(),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Fields::Anchor(Anchor {
            conditions,
            class_name: Some(self.spec.gateway_class_name.clone()),
            controller_name: None,
            listeners,
        }))
    }
}

fn summarize(conditions: &[Condition]) -> Conditions {
    Conditions {
        accepted: conditions
            .iter()
            .any(|c| c.type_ == "Accepted" && c.status == "True"),
    }
}

// === Routes ===

impl Project for gateway::HTTPRoute {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let rules = self.spec.rules.list();
        let filter_refs = rules
            .iter()
            .flat_map(|r| {
                let backends = r.backend_refs.list().iter();
                let backend_filters = backends.flat_map(|b| b.filters.list());
                extension_refs!(r.filters.list().iter()).chain(extension_refs!(backend_filters))
            })
            .collect();
        route(
            parent_refs!(self.spec.parent_refs)?,
            self.spec.hostnames.list(),
            backend_refs!(rules.iter().flat_map(|r| r.backend_refs.list()))?,
            filter_refs,
        )
    }
}

impl Project for gateway::GRPCRoute {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let rules = self.spec.rules.list();
        let filter_refs = rules
            .iter()
            .flat_map(|r| {
                let backends = r.backend_refs.list().iter();
                let backend_filters = backends.flat_map(|b| b.filters.list());
                extension_refs!(r.filters.list().iter()).chain(extension_refs!(backend_filters))
            })
            .collect();
        route(
            parent_refs!(self.spec.parent_refs)?,
            self.spec.hostnames.list(),
            backend_refs!(rules.iter().flat_map(|r| r.backend_refs.list()))?,
            filter_refs,
        )
    }
}

impl Project for gateway::TLSRoute {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let rules = self.spec.rules.list();
        route(
            parent_refs!(self.spec.parent_refs)?,
            self.spec.hostnames.list(),
            backend_refs!(rules.iter().flat_map(|r| r.backend_refs.list()))?,
            Vec::new(),
        )
    }
}

impl Project for gateway::TCPRoute {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let rules = self.spec.rules.list();
        route(
            parent_refs!(self.spec.parent_refs)?,
            &[],
            backend_refs!(rules.iter().flat_map(|r| r.backend_refs.list()))?,
            Vec::new(),
        )
    }
}

impl Project for gateway::UDPRoute {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let rules = self.spec.rules.list();
        route(
            parent_refs!(self.spec.parent_refs)?,
            &[],
            backend_refs!(rules.iter().flat_map(|r| r.backend_refs.list()))?,
            Vec::new(),
        )
    }
}

fn route(
    parent_refs: Vec<ParentRef>,
    hostnames: &[String],
    backend_refs: Vec<ObjectRef>,
    filter_refs: Vec<ObjectRef>,
) -> Result<Fields, String> {
    Ok(Fields::Route(Route {
        hostnames: hostnames.to_vec(),
        parent_refs,
        backend_refs,
        filter_refs,
    }))
}

// === Policies ===

macro_rules! namespaced_policies {
    ($( $ty:ty ),+ $(,)?) => {
        $(
            impl Project for $ty {
                fn project(&self, _: &str) -> Result<Fields, String> {
                    namespaced_policy(&self.spec.target_refs, Vec::new())
                }
            }
        )+
    };
}

namespaced_policies!(
    policy::AccessControlPolicy,
    policy::RateLimitPolicy,
    policy::FaultInjectionPolicy,
    policy::HealthCheckPolicy,
    policy::LoadBalancerPolicy,
    policy::SessionStickyPolicy,
    policy::RetryPolicy,
);

impl Project for policy::UpstreamTlsPolicy {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let referents = self
            .spec
            .certificate_refs()
            .map(|r| object_ref!(r, "Secret"))
            .collect();
        namespaced_policy(&self.spec.target_refs, referents)
    }
}

impl Project for policy::BackendLbPolicy {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let target_refs = self.spec.target_refs.iter().map(|t| t.to_target()).collect();
        policy_fields(target_refs, Vec::new(), Vec::new())
    }
}

impl Project for policy::RouteRuleFilterPolicy {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let target_refs = self
            .spec
            .target_refs
            .iter()
            .map(RuleTargetRef::to_target)
            .collect();
        let filter_refs = self.spec.filter_refs.iter().map(|f| local_ref!(f)).collect();
        policy_fields(target_refs, Vec::new(), filter_refs)
    }
}

impl Project for gateway::BackendTLSPolicy {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let target_refs = self
            .spec
            .target_refs
            .list()
            .iter()
            .map(|t| TargetRef {
                group: t.group.text().unwrap_or_default().to_string(),
                kind: t.kind.text().unwrap_or_default().to_string(),
                namespace: None,
                name: t.name.clone(),
                port: None,
            })
            .collect();
        let referents = self
            .spec
            .validation
            .ca_certificate_refs
            .list()
            .iter()
            .map(|r| local_ref!(r))
            .collect();
        policy_fields(target_refs, referents, Vec::new())
    }
}

fn namespaced_policy(
    target_refs: &[NamespacedTargetRef],
    referents: Vec<ObjectRef>,
) -> Result<Fields, String> {
    let target_refs = target_refs
        .iter()
        .map(NamespacedTargetRef::to_target)
        .collect::<Result<Vec<_>, String>>()?;
    policy_fields(target_refs, referents, Vec::new())
}

fn policy_fields(
    target_refs: Vec<TargetRef>,
    referents: Vec<ObjectRef>,
    filter_refs: Vec<ObjectRef>,
) -> Result<Fields, String> {
    if target_refs.is_empty() {
        return Err("policy has no target refs".to_string());
    }
    Ok(Fields::Policy(Policy {
        target_refs,
        referents,
        filter_refs,
    }))
}

// === Filters ===

impl Project for extension::Filter {
    fn project(&self, _: &str) -> Result<Fields, String> {
        Ok(Fields::Filter(classify::Filter {
            filter_type: Some(self.spec.filter_type.clone()),
            definition_ref: self.spec.definition_ref.as_ref().map(|r| local_ref!(r)),
            config_ref: self.spec.config_ref.as_ref().map(|r| local_ref!(r)),
            ..classify::Filter::default()
        }))
    }
}

impl Project for extension::ListenerFilter {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let target_refs = self
            .spec
            .target_refs
            .iter()
            .map(listener_target)
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Fields::Filter(classify::Filter {
            filter_type: Some(self.spec.filter_type.clone()),
            definition_ref: self.spec.definition_ref.as_ref().map(|r| local_ref!(r)),
            config_ref: self.spec.config_ref.as_ref().map(|r| local_ref!(r)),
            target_refs,
            priority: self.spec.priority,
        }))
    }
}

impl Project for extension::FilterDefinition {
    fn project(&self, _: &str) -> Result<Fields, String> {
        Ok(Fields::Filter(classify::Filter {
            filter_type: Some(self.spec.filter_type.clone()),
            ..classify::Filter::default()
        }))
    }
}

macro_rules! filter_configs {
    ($( $ty:ty ),+ $(,)?) => {
        $(
            impl Project for $ty {
                fn project(&self, _: &str) -> Result<Fields, String> {
                    Ok(Fields::Filter(classify::Filter::default()))
                }
            }
        )+
    };
}

filter_configs!(
    extension::FilterConfig,
    extension::CircuitBreaker,
    extension::ConcurrencyLimit,
    extension::DnsModifier,
    extension::ExternalRateLimit,
    extension::FaultInjection,
    extension::HttpLog,
    extension::IpRestriction,
    extension::Metrics,
    extension::ProxyTag,
    extension::RateLimit,
    extension::RequestTermination,
    extension::Zipkin,
);

fn listener_target(t: &ListenerTargetRef) -> Result<TargetRef, String> {
    let port = port(t.port).ok_or_else(|| format!("listener target has invalid port {}", t.port))?;
    Ok(TargetRef {
        group: t.group.clone(),
        kind: t.kind.clone(),
        namespace: None,
        name: t.name.clone(),
        port: Some(port),
    })
}

// === Referents ===

impl Project for Service {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let spec = self.spec.as_ref();
        let no_cluster_ip = spec
            .and_then(|s| s.cluster_ip.as_deref())
            .map_or(true, |ip| ip.is_empty() || ip == "None");
        let no_selector = spec
            .and_then(|s| s.selector.as_ref())
            .map_or(true, |s| s.is_empty());
        let ports = spec
            .and_then(|s| s.ports.as_ref())
            .iter()
            .flat_map(|ps| ps.iter())
            .map(|p| port(p.port).ok_or_else(|| format!("invalid service port {}", p.port)))
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Fields::Referent(Referent::Service(classify::Service {
            headless_without_selector: no_cluster_ip && no_selector,
            ports,
        })))
    }
}

impl Project for ServiceImport {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let ports = self
            .spec
            .ports
            .iter()
            .map(|p| port(p.port).ok_or_else(|| format!("invalid service port {}", p.port)))
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Fields::Referent(Referent::Service(classify::Service {
            headless_without_selector: false,
            ports,
        })))
    }
}

impl Project for EndpointSlice {
    fn project(&self, _: &str) -> Result<Fields, String> {
        let service_label = self
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(classify::SERVICE_NAME_LABEL))
            .cloned();
        let owner_service = self
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|o| o.controller == Some(true) && o.kind == "Service")
            .map(|o| o.name.clone());
        Ok(Fields::Referent(Referent::EndpointSlice(
            classify::EndpointSlice {
                service_label,
                owner_service,
            },
        )))
    }
}

impl Project for gateway::ReferenceGrant {
    fn project(&self, _: &str) -> Result<Fields, String> {
        Ok(Fields::Referent(Referent::Grant(Grant {
            from: self
                .spec
                .from
                .list()
                .iter()
                .map(|f| GrantFrom {
                    group: f.group.clone(),
                    kind: f.kind.clone(),
                    namespace: f.namespace.clone(),
                })
                .collect(),
            to: self
                .spec
                .to
                .list()
                .iter()
                .map(|t| GrantTo {
                    group: t.group.clone(),
                    kind: t.kind.clone(),
                    name: t.name.clone(),
                })
                .collect(),
        })))
    }
}

macro_rules! plain_referents {
    ($( $ty:ty ),+ $(,)?) => {
        $(
            impl Project for $ty {
                fn project(&self, _: &str) -> Result<Fields, String> {
                    Ok(Fields::Referent(Referent::Plain))
                }
            }
        )+
    };
}

plain_referents!(Endpoints, Secret, ConfigMap);

// === References ===

fn port(port: i32) -> Option<u16> {
    u16::try_from(port).ok().filter(|p| *p != 0)
}

fn opt_port(p: Option<i32>) -> Result<Option<u16>, i32> {
    p.map(|p| port(p).ok_or(p)).transpose()
}
