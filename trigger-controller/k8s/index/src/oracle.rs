//! Effectiveness predicates.
//!
//! Every predicate is answered from one index snapshot and the store, without
//! blocking on I/O.

use crate::{reference::Snapshot, store::Store, Reader};
use gateway_trigger_core::{
    kind::{self, CORE_GROUP, EXTENSION_GROUP, GATEWAY_GROUP, MULTICLUSTER_GROUP},
    Classified, GroupKind, Identity, ObjectKey, ParentRef, Role, TargetRef,
};
use std::sync::Arc;

/// Read-only questions asked by dispatch.
pub trait EffectivenessOracle {
    /// The gateway reports `Accepted=True` and is not owned by another
    /// controller's class.
    fn is_accepted_gateway(&self, gateway: &Classified) -> bool;

    /// At least one parent ref names an anchor in the index.
    fn is_effective_route(&self, route_ns: &str, parent_refs: &[ParentRef]) -> bool;

    /// The service is in the index as a Service or ServiceImport.
    fn is_routable_service(&self, service: &ObjectKey) -> bool;

    /// The observed Service has no cluster IP and no selector.
    fn is_headless_service(&self, service: &ObjectKey) -> bool;

    /// The target resolves to an effective anchor, an effective route, or a
    /// routable service.
    fn is_effective_target_ref(&self, policy: &Classified, target: &TargetRef) -> bool;

    /// The target is a Service or ServiceImport that is routable.
    fn is_routable_target_service(&self, policy: &Classified, target: &TargetRef) -> bool;

    /// Some target is a routable Service or ServiceImport in the policy's
    /// namespace.
    fn is_routable_local_target_services(&self, policy: &Classified, targets: &[TargetRef])
        -> bool;

    /// Some target is an observed or indexed TCPRoute or UDPRoute in the
    /// policy's namespace.
    fn is_valid_local_target_routes(&self, policy: &Classified, targets: &[TargetRef]) -> bool;

    fn is_filter_config_referred(&self, config: &Identity) -> bool;
    fn is_filter_referred(&self, filter: &Identity) -> bool;
    fn is_listener_filter_referred(&self, filter: &Identity) -> bool;
    fn is_filter_definition_referred(&self, definition: &Identity) -> bool;
    fn is_config_map_referred(&self, config_map: &Identity) -> bool;
    fn is_secret_referred(&self, secret: &Identity) -> bool;

    /// The deleted gateway was part of the last emission.
    fn on_delete_gateway(&self, gateway: &Identity) -> bool;

    /// The object is present in the index under its own kind.
    fn is_referred(&self, id: &Identity) -> bool;

    /// Whether the mesh reads EndpointSlices rather than Endpoints.
    fn uses_endpoint_slices(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// The GatewayClass `controllerName` this controller owns.
    pub controller_name: String,
    pub use_endpoint_slices: bool,
}

/// Hands out [`View`]s over the current index and store.
#[derive(Clone, Debug)]
pub struct Oracle {
    index: Reader,
    store: Store,
    config: Arc<OracleConfig>,
}

/// An oracle bound to a single index snapshot.
#[derive(Clone, Debug)]
pub struct View {
    index: Arc<Snapshot>,
    store: Store,
    config: Arc<OracleConfig>,
}

// === impl OracleConfig ===

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            controller_name: "flomesh.io/gateway-controller".to_string(),
            use_endpoint_slices: false,
        }
    }
}

// === impl Oracle ===

impl Oracle {
    pub fn new(index: Reader, store: Store, config: OracleConfig) -> Self {
        Self {
            index,
            store,
            config: Arc::new(config),
        }
    }

    pub fn view(&self) -> View {
        View {
            index: self.index.snapshot(),
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

// === impl View ===

impl View {
    pub fn snapshot(&self) -> &Snapshot {
        &self.index
    }

    fn is_routable_kind(&self, target: &Identity) -> bool {
        kind::is_service(&target.group, &target.kind) && self.is_routable_service(&target.key())
    }

    fn in_index_as(&self, group: &str, kind: &str, id: &Identity) -> bool {
        id.is_kind(group, kind) && self.index.is_referred(&id.group_kind(), &id.key())
    }
}

impl EffectivenessOracle for View {
    fn is_accepted_gateway(&self, gateway: &Classified) -> bool {
        if !gateway.is_anchor_accepted() {
            return false;
        }

        // A gateway whose class is known to belong to another controller is
        // not ours, whatever its status says.
        let Some(class) = gateway.anchor().and_then(|a| a.class_name.as_deref()) else {
            return true;
        };
        let class = ObjectKey::new("", class);
        match self
            .store
            .get(&GroupKind::new(GATEWAY_GROUP, "GatewayClass"), &class)
        {
            Some(class) => class
                .anchor()
                .and_then(|c| c.controller_name.as_deref())
                .is_some_and(|name| name == self.config.controller_name),
            None => true,
        }
    }

    fn is_effective_route(&self, route_ns: &str, parent_refs: &[ParentRef]) -> bool {
        parent_refs
            .iter()
            .filter(|pr| pr.is_anchor())
            .any(|pr| self.index.contains(&pr.resolve(route_ns)))
    }

    fn is_routable_service(&self, service: &ObjectKey) -> bool {
        self.index
            .is_referred(&GroupKind::new(CORE_GROUP, "Service"), service)
            || self
                .index
                .is_referred(&GroupKind::new(MULTICLUSTER_GROUP, "ServiceImport"), service)
    }

    fn is_headless_service(&self, service: &ObjectKey) -> bool {
        self.store
            .get(&GroupKind::new(CORE_GROUP, "Service"), service)
            .and_then(|svc| svc.service().map(|s| s.headless_without_selector))
            .unwrap_or(false)
    }

    fn is_effective_target_ref(&self, policy: &Classified, target: &TargetRef) -> bool {
        if !policy.info.may_target(&target.group, &target.kind) {
            return false;
        }

        let id = policy_target(policy, target);
        match kind::lookup(&id.group, &id.kind).map(|k| k.role) {
            Ok(Role::Anchor) => {
                self.index.contains(&id)
                    || self
                        .store
                        .get_id(&id)
                        .is_some_and(|gw| self.is_accepted_gateway(&gw))
            }
            Ok(Role::Route) => {
                self.index.contains(&id)
                    || self.store.get_id(&id).is_some_and(|route| {
                        route.route().is_some_and(|r| {
                            self.is_effective_route(&route.id.namespace, &r.parent_refs)
                        })
                    })
            }
            Ok(Role::Referent) => self.is_routable_kind(&id),
            _ => false,
        }
    }

    fn is_routable_target_service(&self, policy: &Classified, target: &TargetRef) -> bool {
        target.is_service()
            && policy.info.may_target(&target.group, &target.kind)
            && self.is_routable_kind(&policy_target(policy, target))
    }

    fn is_routable_local_target_services(
        &self,
        policy: &Classified,
        targets: &[TargetRef],
    ) -> bool {
        targets.iter().any(|t| {
            t.is_local(&policy.id.namespace)
                && t.is_service()
                && policy.info.may_target(&t.group, &t.kind)
                && self.is_routable_kind(&policy_target(policy, t))
        })
    }

    fn is_valid_local_target_routes(&self, policy: &Classified, targets: &[TargetRef]) -> bool {
        targets.iter().any(|t| {
            if !t.is_local(&policy.id.namespace) || !policy.info.may_target(&t.group, &t.kind) {
                return false;
            }
            let id = policy_target(policy, t);
            self.index.contains(&id) || self.store.get_id(&id).is_some()
        })
    }

    fn is_filter_config_referred(&self, config: &Identity) -> bool {
        config.group == EXTENSION_GROUP && self.is_referred(config)
    }

    fn is_filter_referred(&self, filter: &Identity) -> bool {
        self.in_index_as(EXTENSION_GROUP, "Filter", filter)
    }

    fn is_listener_filter_referred(&self, filter: &Identity) -> bool {
        self.in_index_as(EXTENSION_GROUP, "ListenerFilter", filter)
    }

    fn is_filter_definition_referred(&self, definition: &Identity) -> bool {
        self.in_index_as(EXTENSION_GROUP, "FilterDefinition", definition)
    }

    fn is_config_map_referred(&self, config_map: &Identity) -> bool {
        self.in_index_as(CORE_GROUP, "ConfigMap", config_map)
    }

    fn is_secret_referred(&self, secret: &Identity) -> bool {
        self.in_index_as(CORE_GROUP, "Secret", secret)
    }

    fn on_delete_gateway(&self, gateway: &Identity) -> bool {
        self.in_index_as(GATEWAY_GROUP, "Gateway", gateway)
    }

    fn is_referred(&self, id: &Identity) -> bool {
        self.index.is_referred(&id.group_kind(), &id.key())
    }

    fn uses_endpoint_slices(&self) -> bool {
        self.config.use_endpoint_slices
    }
}

/// Resolves a policy's target without its port: effectiveness is decided per
/// object.
fn policy_target(policy: &Classified, target: &TargetRef) -> Identity {
    target.resolve(&policy.id.namespace).without_port()
}
