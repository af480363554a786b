use crate::config::{
    BackendConfig, Configuration, FilterConfig, GatewayConfig, ListenerConfig, PolicyConfig,
    RouteConfig,
};
use ahash::AHashSet as HashSet;
use gateway_trigger_core::{
    kind::{self, GATEWAY_GROUP},
    Classified, GroupKind, Identity, ObjectRef, Role,
};
use gateway_trigger_k8s_index::{Objects, References};
use gateway_trigger_scheduler::Generation;
use std::hash::{Hash, Hasher};
use tracing::{debug, trace};

/// Walks the observed objects from each owned gateway outwards, recording
/// every object the emitted configuration depends on.
struct Emitter<'a> {
    objects: &'a Objects,
    controller_name: &'a str,
    refs: References,
}

/// Builds the configuration for all gateways owned by `controller_name`,
/// along with the references it was built from.
pub fn emit(
    objects: &Objects,
    controller_name: &str,
) -> anyhow::Result<Generation<Configuration>> {
    let mut emitter = Emitter {
        objects,
        controller_name,
        refs: References::default(),
    };
    let gateways = emitter.gateways();
    let version = version(&gateways)?;
    Ok(Generation {
        artifact: Configuration { version, gateways },
        references: emitter.refs,
    })
}

fn version(gateways: &[GatewayConfig]) -> anyhow::Result<String> {
    let json = serde_json::to_vec(gateways)?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    json.hash(&mut hasher);
    Ok(format!("{:016x}", hasher.finish()))
}

// === impl Emitter ===

impl<'a> Emitter<'a> {
    fn gateways(&mut self) -> Vec<GatewayConfig> {
        let objects = self.objects;
        let mut gateways = Vec::new();
        for gw in objects.list(&GroupKind::new(GATEWAY_GROUP, "Gateway")) {
            if self.is_owned(gw) {
                gateways.push(self.gateway(gw));
            }
        }
        gateways
    }

    fn is_owned(&self, gw: &Classified) -> bool {
        if !gw.is_anchor_accepted() {
            trace!(gateway = %gw.id, "not accepted");
            return false;
        }
        let class = gw.anchor().and_then(|a| a.class_name.as_ref()).and_then(|name| {
            self.objects
                .get_id(&Identity::new(GATEWAY_GROUP, "GatewayClass", "", name.clone()))
        });
        match class.and_then(|c| c.anchor()) {
            Some(class) => class.controller_name.as_deref() == Some(self.controller_name),
            None => true,
        }
    }

    fn gateway(&mut self, gw: &'a Classified) -> GatewayConfig {
        let id = &gw.id;
        self.refs.owner(id);

        let mut listeners = Vec::new();
        if let Some(anchor) = gw.anchor() {
            if let Some(class) = anchor.class_name.as_ref() {
                self.refs.refer(
                    id,
                    Identity::new(GATEWAY_GROUP, "GatewayClass", "", class.clone()),
                );
            }
            for l in &anchor.listeners {
                listeners.push(ListenerConfig {
                    name: l.name.clone(),
                    port: l.port,
                    protocol: l.protocol.clone(),
                    hostname: l.hostname.clone(),
                    certificates: self.referents(id, &l.certificate_refs),
                    ca_certificates: self.referents(id, &l.ca_certificate_refs),
                });
            }
        }

        let listener_filters = self.listener_filters(id);

        let mut attached = HashSet::new();
        attached.insert(id.clone());
        let routes = self.routes(id, &mut attached);
        let policies = self.policies(&attached);

        debug!(
            gateway = %id,
            routes = routes.len(),
            policies = policies.len(),
            "emitted gateway"
        );
        GatewayConfig {
            namespace: id.namespace.clone(),
            name: id.name.clone(),
            listeners,
            listener_filters,
            routes,
            policies,
        }
    }

    /// Routes of every kind with a parent ref naming the gateway. Each route
    /// and its backends are added to `attached`.
    fn routes(&mut self, gw: &Identity, attached: &mut HashSet<Identity>) -> Vec<RouteConfig> {
        let objects = self.objects;
        let mut routes = Vec::new();
        for info in kind::KINDS.iter().filter(|k| k.role == Role::Route) {
            for route in objects.list(&info.group_kind()) {
                let Some(fields) = route.route() else {
                    continue;
                };
                let parents = fields
                    .parent_refs
                    .iter()
                    .filter(|p| p.is_anchor())
                    .any(|p| p.resolve(&route.id.namespace) == *gw);
                if !parents {
                    continue;
                }

                let id = &route.id;
                self.refs.refer(id, gw.clone());
                attached.insert(id.clone());

                let mut backends = Vec::new();
                for backend in &fields.backend_refs {
                    let Some(target) = self.referent(id, backend) else {
                        continue;
                    };
                    let service = target.without_port();
                    backends.push(BackendConfig {
                        kind: target.kind.clone(),
                        namespace: target.namespace.clone(),
                        name: target.name.clone(),
                        port: target.port,
                        exists: objects.get_id(&service).is_some(),
                    });
                    attached.insert(service);
                }

                let mut filters = Vec::new();
                for f in &fields.filter_refs {
                    if let Some(target) = self.referent(id, f) {
                        filters.push(self.filter(&target));
                    }
                }

                routes.push(RouteConfig {
                    kind: id.kind.clone(),
                    namespace: id.namespace.clone(),
                    name: id.name.clone(),
                    hostnames: fields.hostnames.clone(),
                    backends,
                    filters,
                });
            }
        }
        routes
    }

    /// Listener filters in the gateway's namespace that target it, ordered
    /// by priority.
    fn listener_filters(&mut self, gw: &Identity) -> Vec<FilterConfig> {
        let objects = self.objects;
        let mut filters = objects
            .list_namespace(
                &GroupKind::new(kind::EXTENSION_GROUP, "ListenerFilter"),
                &gw.namespace,
            )
            .into_iter()
            .filter(|lf| {
                lf.filter().is_some_and(|f| {
                    f.target_refs
                        .iter()
                        .any(|t| t.resolve(&lf.id.namespace).without_port() == *gw)
                })
            })
            .map(|lf| {
                self.refs.refer(&lf.id, gw.clone());
                self.filter(&lf.id)
            })
            .collect::<Vec<_>>();
        filters.sort_by_key(|f| f.priority.unwrap_or(i32::MAX));
        filters
    }

    /// Emits a filter, pulling in its definition and config. A filter that
    /// has not been observed is emitted by name only.
    fn filter(&mut self, id: &Identity) -> FilterConfig {
        let mut config = FilterConfig {
            kind: id.kind.clone(),
            namespace: id.namespace.clone(),
            name: id.name.clone(),
            filter_type: None,
            definition: None,
            config: None,
            priority: None,
        };
        let objects = self.objects;
        let Some(fields) = objects.get_id(id).and_then(|f| f.filter()) else {
            return config;
        };

        config.filter_type = fields.filter_type.clone();
        config.priority = fields.priority;
        if let Some(def) = fields.definition_ref.as_ref() {
            let def = def.resolve(&id.namespace);
            config.definition = Some(def.name.clone());
            self.refs.refer(id, def);
        }
        if let Some(cfg) = fields.config_ref.as_ref() {
            let cfg = cfg.resolve(&id.namespace);
            config.config = Some(cfg.to_string());
            self.refs.refer(id, cfg);
        }
        config
    }

    /// Policies with at least one permitted target among `attached`.
    fn policies(&mut self, attached: &HashSet<Identity>) -> Vec<PolicyConfig> {
        let objects = self.objects;
        let mut policies = Vec::new();
        for info in kind::KINDS.iter().filter(|k| k.role == Role::Policy) {
            for policy in objects.list(&info.group_kind()) {
                let Some(fields) = policy.policy() else {
                    continue;
                };
                let id = &policy.id;
                let targets = fields
                    .target_refs
                    .iter()
                    .filter(|t| info.may_target(&t.group, &t.kind))
                    .map(|t| t.resolve(&id.namespace).without_port())
                    .filter(|t| attached.contains(t))
                    .collect::<Vec<_>>();
                if targets.is_empty() {
                    continue;
                }

                for target in &targets {
                    self.refs.refer(id, target.clone());
                }
                let referents = self.referents(id, &fields.referents);
                let filters = fields
                    .filter_refs
                    .iter()
                    .filter_map(|f| self.referent(id, f))
                    .collect::<Vec<_>>();
                let filters = filters.iter().map(|f| self.filter(f)).collect();
                policies.push(PolicyConfig {
                    kind: id.kind.clone(),
                    namespace: id.namespace.clone(),
                    name: id.name.clone(),
                    targets: targets.iter().map(ToString::to_string).collect(),
                    referents,
                    filters,
                });
            }
        }
        policies
    }

    fn referents(&mut self, owner: &Identity, refs: &[ObjectRef]) -> Vec<String> {
        refs.iter()
            .filter_map(|r| self.referent(owner, r))
            .map(|id| id.to_string())
            .collect()
    }

    /// Resolves and records a reference. Cross-namespace references need a
    /// ReferenceGrant in the referent's namespace; the grant is recorded too,
    /// so that revoking it triggers a rebuild.
    fn referent(&mut self, owner: &Identity, r: &ObjectRef) -> Option<Identity> {
        let target = r.resolve(&owner.namespace);
        if r.is_cross_namespace(&owner.namespace) {
            let Some(grant) = self.grant(owner, &target) else {
                debug!(%owner, referent = %target, "cross-namespace reference not permitted");
                return None;
            };
            self.refs.refer(owner, grant);
        }
        self.refs.refer(owner, target.clone());
        Some(target)
    }

    fn grant(&self, from: &Identity, to: &Identity) -> Option<Identity> {
        self.objects
            .list_namespace(
                &GroupKind::new(GATEWAY_GROUP, "ReferenceGrant"),
                &to.namespace,
            )
            .into_iter()
            .find(|g| g.grant().is_some_and(|g| g.permits(from, to)))
            .map(|g| g.id.clone())
    }
}
