//! Role-specific projections of observed objects.

use crate::{
    kind::{self, KindInfo},
    Identity, ObjectRef, ParentRef, Role, TargetRef,
};

/// An observed object reduced to its identity and the fields dispatch and
/// generation inspect.
#[derive(Clone, Debug, PartialEq)]
pub struct Classified {
    pub info: &'static KindInfo,
    pub id: Identity,
    /// The object's `resourceVersion`, when known.
    pub version: Option<String>,
    pub labels: Vec<(String, String)>,
    pub fields: Fields,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fields {
    Anchor(Anchor),
    Route(Route),
    Policy(Policy),
    Filter(Filter),
    Referent(Referent),
}

/// Gateways and gateway classes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Anchor {
    pub conditions: Conditions,
    /// For gateways, the `gatewayClassName`.
    pub class_name: Option<String>,
    /// For gateway classes, the `controllerName`.
    pub controller_name: Option<String>,
    pub listeners: Vec<Listener>,
}

/// A summary of an object's standard status conditions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Conditions {
    pub accepted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Listener {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub hostname: Option<String>,
    pub certificate_refs: Vec<ObjectRef>,
    pub ca_certificate_refs: Vec<ObjectRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub hostnames: Vec<String>,
    pub parent_refs: Vec<ParentRef>,
    pub backend_refs: Vec<ObjectRef>,
    /// `ExtensionRef` filters on rules and backends.
    pub filter_refs: Vec<ObjectRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Policy {
    pub target_refs: Vec<TargetRef>,
    /// Other objects the policy consumes, such as TLS secrets.
    pub referents: Vec<ObjectRef>,
    /// Filters the policy attaches to its targets.
    pub filter_refs: Vec<ObjectRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    /// The declared filter type, used to find its definition and config.
    pub filter_type: Option<String>,
    pub definition_ref: Option<ObjectRef>,
    pub config_ref: Option<ObjectRef>,
    pub target_refs: Vec<TargetRef>,
    /// Orders listener filters; lower runs first.
    pub priority: Option<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Referent {
    Plain,
    Service(Service),
    EndpointSlice(EndpointSlice),
    Grant(Grant),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Service {
    /// No cluster IP and no selector.
    pub headless_without_selector: bool,
    pub ports: Vec<u16>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndpointSlice {
    /// The `kubernetes.io/service-name` label.
    pub service_label: Option<String>,
    /// The name of the Service named by the controller owner reference.
    pub owner_service: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Grant {
    pub from: Vec<GrantFrom>,
    pub to: Vec<GrantTo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrantFrom {
    pub group: String,
    pub kind: String,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrantTo {
    pub group: String,
    pub kind: String,
    pub name: Option<String>,
}

pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

// === impl Classified ===

impl Classified {
    pub fn role(&self) -> Role {
        self.info.role
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        match &self.fields {
            Fields::Anchor(a) => Some(a),
            _ => None,
        }
    }

    pub fn route(&self) -> Option<&Route> {
        match &self.fields {
            Fields::Route(r) => Some(r),
            _ => None,
        }
    }

    pub fn policy(&self) -> Option<&Policy> {
        match &self.fields {
            Fields::Policy(p) => Some(p),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match &self.fields {
            Fields::Filter(f) => Some(f),
            _ => None,
        }
    }

    pub fn service(&self) -> Option<&Service> {
        match &self.fields {
            Fields::Referent(Referent::Service(s)) => Some(s),
            _ => None,
        }
    }

    pub fn endpoint_slice(&self) -> Option<&EndpointSlice> {
        match &self.fields {
            Fields::Referent(Referent::EndpointSlice(s)) => Some(s),
            _ => None,
        }
    }

    pub fn grant(&self) -> Option<&Grant> {
        match &self.fields {
            Fields::Referent(Referent::Grant(g)) => Some(g),
            _ => None,
        }
    }

    /// Evaluates the standard `Accepted` condition.
    pub fn is_anchor_accepted(&self) -> bool {
        self.anchor().is_some_and(|a| a.conditions.accepted)
    }
}

// === impl Grant ===

impl Grant {
    /// Whether a grant living in `to.namespace` permits `from` to refer to
    /// `to`.
    pub fn permits(&self, from: &Identity, to: &Identity) -> bool {
        let from_ok = self.from.iter().any(|f| {
            f.namespace == from.namespace && group_eq(&f.group, &from.group) && f.kind == from.kind
        });
        let to_ok = self.to.iter().any(|t| {
            group_eq(&t.group, &to.group)
                && t.kind == to.kind
                && t.name.as_deref().map_or(true, |n| n == to.name)
        });
        from_ok && to_ok
    }
}

fn group_eq(a: &str, b: &str) -> bool {
    let norm = |g: &str| if g == "core" { kind::CORE_GROUP } else { g }.to_string();
    norm(a) == norm(b)
}
