//! Managed service catalog.

use anyhow::Result;
use tracing::debug;

use super::SystemService;
use crate::config::EngineConfig;
use crate::features::{Confine, FeatureSnapshot};
use crate::host::Host;

struct BuiltinService {
    name: &'static str,
    priority: u32,
    socket: Option<&'static str>,
    confine: fn() -> Confine,
}

const fn svc(name: &'static str, priority: u32, confine: fn() -> Confine) -> BuiltinService {
    BuiltinService {
        name,
        priority,
        socket: None,
        confine,
    }
}

fn katello() -> Confine {
    Confine::Katello
}

fn foreman() -> Confine {
    Confine::ForemanServer
}

fn capsule() -> Confine {
    Confine::Capsule
}

fn database() -> Confine {
    Confine::ForemanServer.or(Confine::Katello)
}

fn always() -> Confine {
    Confine::Always
}

const BUILTIN: &[BuiltinService] = &[
    svc("rh-mongodb34-mongod", 5, katello),
    svc("postgresql", 10, database),
    svc("qpidd", 10, katello),
    svc("qdrouterd", 10, katello),
    svc("squid", 10, katello),
    svc("tomcat", 20, katello),
    svc("pulp_celerybeat", 20, katello),
    svc("pulp_resource_manager", 20, katello),
    svc("pulp_streamer", 20, katello),
    svc("pulp_workers", 20, katello),
    svc("foreman-proxy", 20, always),
    svc("smart_proxy_dynflow_core", 20, always),
    svc("dynflowd", 30, foreman),
    svc("httpd", 30, always),
    svc("puppetserver", 30, always),
    svc("goferd", 30, capsule),
    BuiltinService {
        name: "foreman",
        priority: 30,
        socket: Some("foreman.socket"),
        confine: foreman,
    },
];

/// Services that may be managed on this host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: Vec<SystemService>,
}

impl ServiceCatalog {
    pub fn new(services: Vec<SystemService>) -> Self {
        Self { services }
    }

    /// Built-in services that apply to `features`, plus the configured extras.
    pub fn for_host(features: &FeatureSnapshot, config: &EngineConfig) -> Self {
        let mut services: Vec<SystemService> = BUILTIN
            .iter()
            .filter(|svc| (svc.confine)().evaluate(features))
            .map(|svc| {
                let service = SystemService::new(svc.name, svc.priority);
                match svc.socket {
                    Some(socket) => service.with_socket(socket),
                    None => service,
                }
            })
            .collect();
        services.extend(config.services.iter().map(|spec| SystemService {
            name: spec.name.clone(),
            priority: spec.priority,
            socket: spec.socket.clone(),
        }));
        Self { services }
    }

    pub fn services(&self) -> &[SystemService] {
        &self.services
    }

    /// Catalog services present on the host, ordered by priority then name,
    /// one entry per name (lowest priority wins).
    pub fn existing(&self, host: &dyn Host, config: &EngineConfig) -> Result<Vec<SystemService>> {
        let mut pool = self.services.clone();
        pool.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));

        let mut unique: Vec<SystemService> = Vec::with_capacity(pool.len());
        for service in pool {
            if !unique.iter().any(|seen| seen.name == service.name) {
                unique.push(service);
            }
        }

        let mut existing = Vec::with_capacity(unique.len());
        for service in unique {
            if service.exists(host, config)? {
                existing.push(service);
            } else {
                debug!(service = %service, "service not present on host");
            }
        }
        Ok(existing)
    }
}
