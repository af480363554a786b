//! Gateway API resources.
//!
//! Routes and gateways come from the experimental channel, which is a
//! superset of the standard one and carries the listener fields (such as
//! frontend TLS validation) that pull in additional referents.

pub use gateway_api::apis::{
    experimental::{
        backendtlspolicies::{self, BackendTLSPolicy},
        gateways::{self, Gateway},
        grpcroutes::{self, GRPCRoute},
        httproutes::{self, HTTPRoute},
        tcproutes::{self, TCPRoute},
        tlsroutes::{self, TLSRoute},
        udproutes::{self, UDPRoute},
    },
    standard::{
        gatewayclasses::{self, GatewayClass},
        referencegrants::{self, ReferenceGrant},
    },
};
