use gateway_trigger_core::TargetRef;

/// Targets a resource within the policy's namespace.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTargetRef {
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
}

/// Targets a resource, optionally in another namespace and on a single port.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedTargetRef {
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub port: Option<i32>,
}

/// Targets a named rule of a route in the policy's namespace.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub rule: String,
}

impl LocalTargetRef {
    pub fn to_target(&self) -> TargetRef {
        local(self.group.clone().unwrap_or_default(), &self.kind, &self.name)
    }
}

impl RuleTargetRef {
    /// Rules narrow the attachment but not which route is targeted.
    pub fn to_target(&self) -> TargetRef {
        local(self.group.clone(), &self.kind, &self.name)
    }
}

impl NamespacedTargetRef {
    /// Converts the ref, failing if its port is out of range.
    pub fn to_target(&self) -> Result<TargetRef, String> {
        let port = self
            .port
            .map(|p| u16::try_from(p).map_err(|_| format!("invalid target port {p}")))
            .transpose()?;
        Ok(TargetRef {
            group: self.group.clone().unwrap_or_default(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            port,
        })
    }
}

fn local(group: String, kind: &str, name: &str) -> TargetRef {
    TargetRef {
        group,
        kind: kind.to_string(),
        namespace: None,
        name: name.to_string(),
        port: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_port_range() {
        let t = NamespacedTargetRef {
            group: None,
            kind: "Service".to_string(),
            name: "s1".to_string(),
            namespace: Some("other".to_string()),
            port: Some(8080),
        };
        let target = t.to_target().unwrap();
        assert_eq!(target.port, Some(8080));
        assert_eq!(target.namespace.as_deref(), Some("other"));

        let t = NamespacedTargetRef {
            port: Some(70000),
            ..t
        };
        assert!(t.to_target().is_err());
    }

    #[test]
    fn rule_targets_are_local() {
        let t = RuleTargetRef {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "UDPRoute".to_string(),
            name: "udp-dns-1".to_string(),
            rule: "dns".to_string(),
        };
        let target = t.to_target();
        assert_eq!(target.kind, "UDPRoute");
        assert_eq!(target.namespace, None);
        assert!(target.is_local("app"));
    }
}
