//! Applicability predicates.
//!
//! A [`Confine`] is a plain value describing when a step, scenario or
//! service applies. It is evaluated against a [`FeatureSnapshot`] and never
//! touches the host itself, so composition stays side-effect free.

use super::{FeatureSnapshot, ProductIdentity};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Confine {
    #[default]
    Always,
    Never,
    /// A downstream (subscribed product) installation
    Downstream,
    /// An upstream (community) installation
    Upstream,
    /// Downstream server product
    Server,
    /// Downstream capsule product
    Capsule,
    ForemanServer,
    Katello,
    /// Current product version has this `major.minor`
    ProductVersion(String),
    /// A persisted upgrade to this target is in progress
    UpgradeInProgress(String),
    All(Vec<Confine>),
    Any(Vec<Confine>),
    Not(Box<Confine>),
}

impl Confine {
    pub fn evaluate(&self, features: &FeatureSnapshot) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Downstream => features.is_downstream(),
            Self::Upstream => !features.is_downstream(),
            Self::Server => features.identity() == Some(ProductIdentity::Server),
            Self::Capsule => features.identity() == Some(ProductIdentity::Capsule),
            Self::ForemanServer => features.foreman_server,
            Self::Katello => features.katello.is_some(),
            Self::ProductVersion(major_minor) => features
                .product_version()
                .is_some_and(|v| v.major_minor() == *major_minor),
            Self::UpgradeInProgress(target) => {
                features.upgrade_in_progress.as_deref() == Some(target.as_str())
            }
            Self::All(all) => all.iter().all(|c| c.evaluate(features)),
            Self::Any(any) => any.iter().any(|c| c.evaluate(features)),
            Self::Not(inner) => !inner.evaluate(features),
        }
    }

    pub fn and(self, other: Confine) -> Confine {
        match self {
            Self::Always => other,
            Self::All(mut all) => {
                all.push(other);
                Self::All(all)
            }
            this => Self::All(vec![this, other]),
        }
    }

    pub fn or(self, other: Confine) -> Confine {
        match self {
            Self::Any(mut any) => {
                any.push(other);
                Self::Any(any)
            }
            this => Self::Any(vec![this, other]),
        }
    }

    pub fn negate(self) -> Confine {
        Self::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Downstream, Instance, Katello};
    use crate::version::Version;

    fn satellite(version: &str) -> FeatureSnapshot {
        FeatureSnapshot {
            instance: Instance {
                identity: Some(ProductIdentity::Server),
            },
            downstream: Some(Downstream {
                identity: ProductIdentity::Server,
                version: Version::parse(version).ok(),
                activation_key: false,
            }),
            foreman_server: true,
            katello: Some(Katello { version: None }),
            upgrade_in_progress: None,
        }
    }

    #[test]
    fn test_identity_predicates() {
        let sat = satellite("6.6.1");
        assert!(Confine::Downstream.evaluate(&sat));
        assert!(Confine::Server.evaluate(&sat));
        assert!(!Confine::Capsule.evaluate(&sat));
        assert!(!Confine::Upstream.evaluate(&sat));
        assert!(Confine::Upstream.evaluate(&FeatureSnapshot::default()));
    }

    #[test]
    fn test_version_and_progress() {
        let mut sat = satellite("6.6.1");
        let confine = Confine::Server.and(
            Confine::ProductVersion("6.5".into()).or(Confine::UpgradeInProgress("6.6".into())),
        );
        assert!(!confine.evaluate(&sat));

        sat.upgrade_in_progress = Some("6.6".into());
        assert!(confine.evaluate(&sat));

        let sat = satellite("6.5.3");
        assert!(confine.evaluate(&sat));
    }

    #[test]
    fn test_combinators() {
        let sat = satellite("6.6");
        assert_eq!(Confine::Always.and(Confine::Server), Confine::Server);
        assert!(Confine::Capsule.negate().evaluate(&sat));
        assert!(!Confine::Never.evaluate(&sat));
        assert!(Confine::All(vec![]).evaluate(&sat));
        assert!(!Confine::Any(vec![]).evaluate(&sat));
    }
}
