use super::*;
use crate::{
    oracle::OracleConfig,
    reference::{pair, Delta, IndexCommitter, References, Writer},
};
use gateway_trigger_core::{
    kind::{CORE_GROUP, EXTENSION_GROUP, GATEWAY_GROUP, MULTICLUSTER_GROUP, POLICY_GROUP},
    Identity,
};
use gateway_trigger_k8s_api::{
    extension::{ListenerFilter, ListenerFilterSpec, ListenerTargetRef},
    gateway::{Gateway, GatewayClass, HTTPRoute, ReferenceGrant, UDPRoute},
    policy::{
        BackendLbPolicy, HealthCheckPolicy, NamespacedTargetRef, RateLimitPolicy,
        RateLimitPolicySpec, RouteRuleFilterPolicy,
    },
    EndpointSlice, Endpoints, ObjectMeta, Secret, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use maplit::btreemap;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::Level;

#[derive(Clone, Debug, Default)]
struct Dirty(Arc<AtomicUsize>);

struct Test {
    dispatch: Dispatch<Dirty>,
    writer: Writer,
    metrics: DispatchMetrics,
    dirty: Dirty,
    refs: References,
}

impl DirtySignal for Dirty {
    fn mark_dirty(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl Dirty {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Test {
    fn new() -> Self {
        Self::with_config(OracleConfig::default())
    }

    fn with_config(config: OracleConfig) -> Self {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_test_writer()
            .try_init()
            .ok();

        let (writer, reader) = pair();
        let metrics = DispatchMetrics::default();
        let dirty = Dirty::default();
        let oracle = Oracle::new(reader, Store::default(), config);
        Self {
            dispatch: Dispatch::new(oracle, metrics.clone(), dirty.clone()),
            writer,
            metrics,
            dirty,
            refs: References::default(),
        }
    }

    /// Stands in for a generation that emitted `refs`.
    fn generated(&mut self, refs: References) {
        self.writer
            .commit(&Delta::between(&self.refs, &refs))
            .expect("delta must apply");
        self.refs = refs;
    }

    fn indexed(&self, id: &Identity) -> bool {
        self.dispatch.oracle.view().snapshot().contains(id)
    }
}

fn meta(ns: &str, name: &str, version: &str) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        resource_version: Some(version.to_string()),
        ..Default::default()
    }
}

fn gateway(ns: &str, name: &str, accepted: bool, version: &str) -> Gateway {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": { "namespace": ns, "name": name, "resourceVersion": version },
        "spec": { "gatewayClassName": "fsm", "listeners": [] },
        "status": {
            "conditions": [{
                "type": "Accepted",
                "status": if accepted { "True" } else { "False" },
                "reason": "Accepted",
                "message": "",
                "lastTransitionTime": "2024-01-01T00:00:00Z",
            }],
        },
    }))
    .expect("valid gateway")
}

fn gateway_class(name: &str, controller: &str) -> GatewayClass {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": { "name": name, "resourceVersion": "1" },
        "spec": { "controllerName": controller },
    }))
    .expect("valid gateway class")
}

fn http_route(ns: &str, name: &str, parent: Value, version: &str) -> HTTPRoute {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": { "namespace": ns, "name": name, "resourceVersion": version },
        "spec": { "parentRefs": [parent] },
    }))
    .expect("valid route")
}

fn udp_route(ns: &str, name: &str, parent: Value) -> UDPRoute {
    serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1alpha2",
        "kind": "UDPRoute",
        "metadata": { "namespace": ns, "name": name, "resourceVersion": "1" },
        "spec": {
            "parentRefs": [parent],
            "rules": [{ "backendRefs": [{ "name": "coredns", "port": 53 }] }],
        },
    }))
    .expect("valid route")
}

fn parent(ns: Option<&str>, name: &str) -> Value {
    json!({ "namespace": ns, "name": name })
}

fn route_rule_filter(ns: &str, name: &str, kind: &str, route: &str) -> RouteRuleFilterPolicy {
    serde_json::from_value(json!({
        "apiVersion": "gateway.flomesh.io/v1alpha2",
        "kind": "RouteRuleFilterPolicy",
        "metadata": { "namespace": ns, "name": name, "resourceVersion": "1" },
        "spec": {
            "targetRefs": [{ "group": GATEWAY_GROUP, "kind": kind, "name": route, "rule": "r" }],
            "filterRefs": [{ "group": EXTENSION_GROUP, "kind": "Filter", "name": "f1" }],
        },
    }))
    .expect("valid policy")
}

fn rate_limit(ns: &str, name: &str, target: NamespacedTargetRef) -> RateLimitPolicy {
    let mut p = RateLimitPolicy::new(
        name,
        RateLimitPolicySpec {
            target_refs: vec![target],
            config: Default::default(),
        },
    );
    p.metadata = meta(ns, name, "1");
    p
}

fn service_target(ns: &str, name: &str) -> NamespacedTargetRef {
    NamespacedTargetRef {
        group: None,
        kind: "Service".to_string(),
        name: name.to_string(),
        namespace: Some(ns.to_string()),
        port: None,
    }
}

fn secret(ns: &str, name: &str, version: &str) -> Secret {
    Secret {
        metadata: meta(ns, name, version),
        ..Default::default()
    }
}

fn service(ns: &str, name: &str, headless: bool) -> Service {
    Service {
        metadata: meta(ns, name, "1"),
        spec: Some(ServiceSpec {
            cluster_ip: headless.then(|| "None".to_string()),
            selector: (!headless).then(|| btreemap! { "app".to_string() => name.to_string() }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn endpoint_slice(ns: &str, name: &str, service: &str) -> EndpointSlice {
    EndpointSlice {
        metadata: ObjectMeta {
            labels: Some(btreemap! {
                "kubernetes.io/service-name".to_string() => service.to_string(),
            }),
            ..meta(ns, name, "1")
        },
        address_type: "IPv4".to_string(),
        ..Default::default()
    }
}

fn gateway_id(ns: &str, name: &str) -> Identity {
    Identity::new(GATEWAY_GROUP, "Gateway", ns, name)
}

fn route_id(ns: &str, name: &str) -> Identity {
    Identity::new(GATEWAY_GROUP, "HTTPRoute", ns, name)
}

fn service_id(ns: &str, name: &str) -> Identity {
    Identity::new(CORE_GROUP, "Service", ns, name)
}

fn secret_id(ns: &str, name: &str) -> Identity {
    Identity::new(CORE_GROUP, "Secret", ns, name)
}

#[test]
fn accepted_gateway_then_attached_route() {
    let mut test = Test::new();

    assert!(test.dispatch.insert(gateway("gw", "g1", true, "1")));
    let mut refs = References::default();
    refs.owner(&gateway_id("gw", "g1"));
    test.generated(refs.clone());
    assert!(test.indexed(&gateway_id("gw", "g1")));

    let route = http_route("app", "r1", parent(Some("gw"), "g1"), "1");
    assert!(test.dispatch.insert(route));
    refs.refer(&route_id("app", "r1"), gateway_id("gw", "g1"));
    refs.refer(&route_id("app", "r1"), service_id("app", "s1").with_port(8080));
    test.generated(refs);
    assert!(test.indexed(&route_id("app", "r1")));
    assert!(test.indexed(&service_id("app", "s1")));

    assert_eq!(test.dirty.count(), 2);
}

#[test]
fn unaccepted_gateway_is_ineffective() {
    let test = Test::new();
    assert!(!test.dispatch.insert(gateway("gw", "g1", false, "1")));
    assert_eq!(test.dirty.count(), 0);
}

#[test]
fn gateway_of_another_controller_is_ineffective() {
    let test = Test::new();
    assert!(test
        .dispatch
        .insert(gateway_class("fsm", "example.com/other-controller")));
    assert!(!test.dispatch.insert(gateway("gw", "g1", true, "1")));

    let test = Test::new();
    assert!(test
        .dispatch
        .insert(gateway_class("fsm", &OracleConfig::default().controller_name)));
    assert!(test.dispatch.insert(gateway("gw", "g1", true, "1")));
}

#[test]
fn gateway_losing_acceptance_is_effective_while_indexed() {
    let mut test = Test::new();
    assert!(test.dispatch.insert(gateway("gw", "g1", true, "1")));
    let mut refs = References::default();
    refs.owner(&gateway_id("gw", "g1"));
    test.generated(refs);

    assert!(test.dispatch.insert(gateway("gw", "g1", false, "2")));
}

#[test]
fn deleted_gateway_is_effective_only_when_indexed() {
    let mut test = Test::new();
    test.dispatch.insert(gateway("gw", "g1", true, "1"));
    test.dispatch.insert(gateway("gw", "g2", true, "1"));
    let mut refs = References::default();
    refs.owner(&gateway_id("gw", "g1"));
    test.generated(refs);

    let kind = gateway_id("", "").group_kind();
    assert!(test.dispatch.remove(kind.clone(), ObjectKey::new("gw", "g1")));
    assert!(!test.dispatch.remove(kind.clone(), ObjectKey::new("gw", "g3")));

    // g2 was observed but never emitted.
    assert!(!test.dispatch.remove(kind, ObjectKey::new("gw", "g2")));
}

#[test]
fn deleting_an_unobserved_indexed_object_is_effective() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&gateway_id("gw", "g1"), secret_id("gw", "tls1"));
    test.generated(refs);

    // The secret was emitted but its watch never delivered it.
    let kind = secret_id("", "").group_kind();
    assert!(test.dispatch.remove(kind.clone(), ObjectKey::new("gw", "tls1")));
    assert_eq!(test.dirty.count(), 1);

    assert!(!test.dispatch.remove(kind, ObjectKey::new("gw", "tls2")));
    assert_eq!(test.dirty.count(), 1);
}

#[test]
fn orphan_route_is_ineffective() {
    let test = Test::new();
    let route = http_route("app", "r1", parent(None, "missing"), "1");
    assert!(!test.dispatch.insert(route));
    assert!(test.dispatch.oracle.view().snapshot().is_empty());
    assert_eq!(test.dirty.count(), 0);
}

#[test]
fn route_detaching_from_an_anchor_is_effective() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.owner(&gateway_id("gw", "g1"));
    test.generated(refs);

    let attached = http_route("app", "r1", parent(Some("gw"), "g1"), "1");
    assert!(test.dispatch.insert(attached));

    // The update is judged as Delete(old); Insert(new). The old route was
    // effective, so the update is too.
    let detached = http_route("app", "r1", parent(Some("gw"), "missing"), "2");
    assert!(test.dispatch.insert(detached));

    let orphan = http_route("app", "r1", parent(Some("gw"), "other"), "3");
    assert!(!test.dispatch.insert(orphan));
}

#[test]
fn policy_targeting_a_routable_service() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    test.generated(refs);

    assert!(test
        .dispatch
        .insert(rate_limit("app", "rl1", service_target("app", "s1"))));
    assert!(!test
        .dispatch
        .insert(rate_limit("app", "rl2", service_target("app", "ghost"))));
}

#[test]
fn policy_with_empty_target_namespace_is_local() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    test.generated(refs);

    assert!(test
        .dispatch
        .insert(rate_limit("app", "rl1", service_target("", "s1"))));
    assert!(!test
        .dispatch
        .insert(rate_limit("other", "rl1", service_target("", "s1"))));
}

#[test]
fn policy_targeting_an_effective_route() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.owner(&gateway_id("gw", "g1"));
    test.generated(refs);

    // The route is observed but not yet emitted; its parent is.
    test.dispatch
        .insert(http_route("app", "r1", parent(Some("gw"), "g1"), "1"));
    let target = NamespacedTargetRef {
        group: Some(GATEWAY_GROUP.to_string()),
        kind: "HTTPRoute".to_string(),
        name: "r1".to_string(),
        namespace: None,
        port: None,
    };
    assert!(test.dispatch.insert(rate_limit("app", "rl1", target)));
}

#[test]
fn route_rule_filters_need_a_local_tcp_or_udp_route() {
    let test = Test::new();

    // Neither route is attached to anything; the policy only needs them to
    // exist.
    assert!(!test.dispatch.insert(udp_route("app", "dns", parent(None, "missing"))));
    assert!(!test
        .dispatch
        .insert(http_route("app", "web", parent(None, "missing"), "1")));

    assert!(test
        .dispatch
        .insert(route_rule_filter("app", "rrf1", "UDPRoute", "dns")));
    assert!(!test
        .dispatch
        .insert(route_rule_filter("app", "rrf2", "UDPRoute", "ghost")));
    assert!(!test
        .dispatch
        .insert(route_rule_filter("app", "rrf3", "HTTPRoute", "web")));
    assert!(!test
        .dispatch
        .insert(route_rule_filter("other", "rrf1", "UDPRoute", "dns")));
}

#[test]
fn route_rule_filter_targeting_an_indexed_route() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(
        &Identity::new(GATEWAY_GROUP, "TCPRoute", "app", "db"),
        gateway_id("gw", "g1"),
    );
    test.generated(refs);

    assert!(test
        .dispatch
        .insert(route_rule_filter("app", "rrf1", "TCPRoute", "db")));
}

#[test]
fn backend_policies_target_service_imports() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(
        &route_id("app", "r1"),
        Identity::new(MULTICLUSTER_GROUP, "ServiceImport", "app", "s1"),
    );
    test.generated(refs);

    let import = |ns: Option<&str>| {
        json!({ "group": MULTICLUSTER_GROUP, "kind": "ServiceImport", "name": "s1", "namespace": ns })
    };
    let lb = |ns: &str, name: &str| -> BackendLbPolicy {
        serde_json::from_value(json!({
            "apiVersion": "gateway.flomesh.io/v1alpha2",
            "kind": "BackendLBPolicy",
            "metadata": { "namespace": ns, "name": name, "resourceVersion": "1" },
            "spec": { "targetRefs": [import(None)] },
        }))
        .expect("valid policy")
    };
    assert!(test.dispatch.insert(lb("app", "lb1")));
    assert!(!test.dispatch.insert(lb("other", "lb1")));

    // Health checks may reach into other namespaces.
    let hc: HealthCheckPolicy = serde_json::from_value(json!({
        "apiVersion": "gateway.flomesh.io/v1alpha2",
        "kind": "HealthCheckPolicy",
        "metadata": { "namespace": "other", "name": "hc1", "resourceVersion": "1" },
        "spec": { "targetRefs": [import(Some("app"))] },
    }))
    .expect("valid policy");
    assert!(test.dispatch.insert(hc));
}

#[test]
fn referenced_secret_is_effective() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&gateway_id("app", "g1"), secret_id("app", "tls1"));
    test.generated(refs);

    assert!(test.dispatch.insert(secret("app", "tls1", "2")));
    assert!(!test.dispatch.insert(secret("app", "other", "1")));
}

#[test]
fn unrelated_secret_is_ineffective() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&gateway_id("app", "g1"), secret_id("app", "tls1"));
    test.generated(refs);

    let mut labelled = secret("elsewhere", "tls1", "1");
    labelled.metadata.labels = Some(btreemap! {
        "app.kubernetes.io/name".to_string() => "gateway".to_string(),
    });
    assert!(!test.dispatch.insert(labelled));
    assert_eq!(test.dirty.count(), 0);
}

#[test]
fn endpoint_slice_follows_its_service_label() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    test.generated(refs);

    assert!(test.dispatch.insert(endpoint_slice("app", "s1-abc", "s1")));
    assert!(!test.dispatch.insert(endpoint_slice("app", "s2-abc", "s2")));
}

#[test]
fn endpoint_slice_delete_follows_its_owner() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    test.generated(refs);

    // The label is stale but the controlling owner is routable.
    let mut slice = endpoint_slice("app", "s1-abc", "s2");
    slice.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "v1".to_string(),
        kind: "Service".to_string(),
        name: "s1".to_string(),
        uid: "uid".to_string(),
        controller: Some(true),
        ..Default::default()
    }]);
    assert!(!test.dispatch.insert(slice));

    let kind = GroupKind::new("discovery.k8s.io", "EndpointSlice");
    assert!(test.dispatch.remove(kind, ObjectKey::new("app", "s1-abc")));
}

#[test]
fn endpoints_require_a_headless_service_with_slices() {
    let config = OracleConfig {
        use_endpoint_slices: true,
        ..OracleConfig::default()
    };
    let mut test = Test::with_config(config);
    let mut refs = References::default();
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    refs.refer(&route_id("app", "r1"), service_id("app", "s2"));
    test.generated(refs.clone());

    test.dispatch.insert(service("app", "s1", false));
    test.dispatch.insert(service("app", "s2", true));

    let endpoints = |name: &str| Endpoints {
        metadata: meta("app", name, "1"),
        ..Default::default()
    };
    assert!(!test.dispatch.insert(endpoints("s1")));
    assert!(test.dispatch.insert(endpoints("s2")));

    // Without slices, routability alone decides.
    let mut test = Test::new();
    test.generated(refs);
    test.dispatch.insert(service("app", "s1", false));
    assert!(test.dispatch.insert(endpoints("s1")));
}

#[test]
fn listener_filter_attaches_to_indexed_gateways() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.owner(&gateway_id("gw", "g1"));
    test.generated(refs);

    let listener_filter = |name: &str, gateway: &str| {
        let mut lf = ListenerFilter::new(
            name,
            ListenerFilterSpec {
                filter_type: "RateLimit".to_string(),
                target_refs: vec![ListenerTargetRef {
                    group: GATEWAY_GROUP.to_string(),
                    kind: "Gateway".to_string(),
                    name: gateway.to_string(),
                    port: 80,
                }],
                definition_ref: None,
                config_ref: None,
                priority: None,
            },
        );
        lf.metadata = meta("gw", name, "1");
        lf
    };
    assert!(test.dispatch.insert(listener_filter("lf1", "g1")));
    assert!(!test.dispatch.insert(listener_filter("lf2", "g2")));
}

#[test]
fn listener_filter_ignores_undeclared_target_kinds() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&route_id("gw", "r1"), service_id("gw", "g1"));
    test.generated(refs);

    let mut lf = ListenerFilter::new(
        "lf1",
        ListenerFilterSpec {
            filter_type: "RateLimit".to_string(),
            target_refs: vec![ListenerTargetRef {
                group: CORE_GROUP.to_string(),
                kind: "Service".to_string(),
                name: "g1".to_string(),
                port: 80,
            }],
            definition_ref: None,
            config_ref: None,
            priority: None,
        },
    );
    lf.metadata = meta("gw", "lf1", "1");
    assert!(!test.dispatch.insert(lf));
    assert_eq!(test.dirty.count(), 0);
}

#[test]
fn reference_grants_are_always_effective() {
    let test = Test::new();
    let grant: ReferenceGrant = serde_json::from_value(json!({
        "apiVersion": "gateway.networking.k8s.io/v1beta1",
        "kind": "ReferenceGrant",
        "metadata": { "namespace": "app", "name": "allow-gw", "resourceVersion": "1" },
        "spec": { "from": [], "to": [] },
    }))
    .expect("valid grant");
    assert!(test.dispatch.insert(grant));
}

#[test]
fn every_indexed_identity_is_effective() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&gateway_id("gw", "g1"), secret_id("gw", "tls1"));
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    test.generated(refs);

    // Each object is effective by virtue of being indexed, even where its
    // kind's own rule would say otherwise.
    assert!(test.dispatch.insert(gateway("gw", "g1", false, "1")));
    assert!(test
        .dispatch
        .insert(http_route("app", "r1", parent(None, "missing"), "1")));
    assert!(test.dispatch.insert(secret("gw", "tls1", "1")));
    assert!(test.dispatch.insert(service("app", "s1", false)));

    let s = |id: &Identity| (id.group_kind(), id.key());
    for id in [
        gateway_id("gw", "g1"),
        route_id("app", "r1"),
        secret_id("gw", "tls1"),
        service_id("app", "s1"),
    ] {
        let (kind, key) = s(&id);
        assert!(test.dispatch.remove(kind, key), "{id} must be effective");
    }
}

#[test]
fn resyncs_are_ignored() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&gateway_id("app", "g1"), secret_id("app", "tls1"));
    test.generated(refs);

    assert!(test.dispatch.insert(secret("app", "tls1", "7")));
    assert!(!test.dispatch.insert(secret("app", "tls1", "7")));
    assert!(test.dispatch.insert(secret("app", "tls1", "8")));
    assert_eq!(test.dirty.count(), 2);
}

#[test]
fn malformed_objects_are_dropped() {
    let test = Test::new();
    let mut gw = gateway("gw", "g1", true, "1");
    gw.metadata.namespace = None;
    assert!(!test.dispatch.insert(gw));
    assert_eq!(test.dirty.count(), 0);
    assert_eq!(
        test.metrics
            .errors(&gateway_id("", "").group_kind(), "malformed"),
        1
    );
    assert_eq!(test.dispatch.store().len(&gateway_id("", "").group_kind()), 0);
}

#[test]
fn verdicts_are_counted() {
    let mut test = Test::new();
    let mut refs = References::default();
    refs.refer(&route_id("app", "r1"), service_id("app", "s1"));
    test.generated(refs);

    test.dispatch
        .insert(rate_limit("app", "rl1", service_target("app", "s1")));
    test.dispatch
        .insert(rate_limit("app", "rl2", service_target("app", "ghost")));

    let kind = GroupKind::new(POLICY_GROUP, "RateLimitPolicy");
    assert_eq!(test.metrics.verdicts(&kind, Event::Insert, true), 1);
    assert_eq!(test.metrics.verdicts(&kind, Event::Insert, false), 1);
    assert_eq!(test.metrics.verdicts(&kind, Event::Delete, true), 0);
}

/// Dispatch runs concurrently with commits and only ever sees whole
/// snapshots: a service and its secret are always indexed together.
#[test]
fn dispatch_races_commits() {
    const GENERATIONS: usize = 100;

    let mut test = Test::new();
    let dispatch = Arc::new(test.dispatch.clone());
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let threads = (0..4)
        .map(|_| {
            let dispatch = dispatch.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let view = dispatch.oracle.view();
                    let svc = view.is_routable_service(&ObjectKey::new("app", "s1"));
                    let sec = view.is_secret_referred(&secret_id("app", "tls1"));
                    assert_eq!(svc, sec, "partial commit observed");
                }
            })
        })
        .collect::<Vec<_>>();

    let mut both = References::default();
    both.refer(&route_id("app", "r1"), service_id("app", "s1"));
    both.refer(&route_id("app", "r1"), secret_id("app", "tls1"));
    for _ in 0..GENERATIONS {
        test.generated(both.clone());
        test.generated(References::default());
    }
    done.store(true, Ordering::Release);

    for t in threads {
        t.join().expect("dispatcher must not panic");
    }
}
