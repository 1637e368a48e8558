// src/availability.rs

//! Registry availability probing and the pre-flight gate
//!
//! Every operation against a registry that supports the `/availability`
//! probe runs through the gate first: a cached or freshly probed status
//! decides whether the request is issued at all. Registries that do not
//! support the probe bypass the gate entirely and never cost an HTTP
//! call.

use std::time::Duration;

use url::Url;

use crate::cache::{FreshnessPolicy, TtlCache};
use crate::error::{Error, Result};

/// Probe results are cached for five minutes.
pub const AVAILABILITY_TTL: Duration = Duration::from_secs(5 * 60);

/// Outcome of an availability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Available,
    /// The registry reported itself unavailable (404 or 501)
    Unavailable,
    /// The probe returned an unexpected status
    Error(String),
}

/// Map a probe response status onto an availability status.
pub(crate) fn status_from_response(status: u16) -> AvailabilityStatus {
    match status {
        200..=299 => AvailabilityStatus::Available,
        404 | 501 => AvailabilityStatus::Unavailable,
        other => AvailabilityStatus::Error(format!("unexpected status {other}")),
    }
}

/// TTL-cached availability per registry URL
pub(crate) struct AvailabilityGate {
    cache: TtlCache<Url, AvailabilityStatus>,
}

impl AvailabilityGate {
    pub fn new(policy: FreshnessPolicy) -> Self {
        Self {
            cache: TtlCache::new(AVAILABILITY_TTL, policy),
        }
    }

    pub fn cached(&self, registry_url: &Url) -> Option<AvailabilityStatus> {
        self.cache.get(registry_url)
    }

    pub fn record(&self, registry_url: Url, status: AvailabilityStatus) {
        self.cache.put(registry_url, status);
    }

    /// Turn a status into the gate verdict.
    pub fn verdict(registry_url: &Url, status: &AvailabilityStatus) -> Result<()> {
        match status {
            AvailabilityStatus::Available => Ok(()),
            AvailabilityStatus::Unavailable | AvailabilityStatus::Error(_) => {
                Err(Error::RegistryNotAvailable {
                    registry: registry_url.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from_response(200), AvailabilityStatus::Available);
        assert_eq!(status_from_response(204), AvailabilityStatus::Available);
        assert_eq!(status_from_response(404), AvailabilityStatus::Unavailable);
        assert_eq!(status_from_response(501), AvailabilityStatus::Unavailable);
        assert!(matches!(
            status_from_response(503),
            AvailabilityStatus::Error(_)
        ));
    }

    #[test]
    fn test_gate_verdict() {
        let url = Url::parse("https://packages.example.com").unwrap();
        assert!(AvailabilityGate::verdict(&url, &AvailabilityStatus::Available).is_ok());
        assert!(matches!(
            AvailabilityGate::verdict(&url, &AvailabilityStatus::Unavailable),
            Err(Error::RegistryNotAvailable { .. })
        ));
        assert!(matches!(
            AvailabilityGate::verdict(&url, &AvailabilityStatus::Error("boom".into())),
            Err(Error::RegistryNotAvailable { .. })
        ));
    }

    #[test]
    fn test_cache_round_trip() {
        let gate = AvailabilityGate::new(FreshnessPolicy::ServeFresh);
        let url = Url::parse("https://packages.example.com").unwrap();
        assert!(gate.cached(&url).is_none());
        gate.record(url.clone(), AvailabilityStatus::Available);
        assert_eq!(gate.cached(&url), Some(AvailabilityStatus::Available));
    }
}
