//! Redirection policy
//!
//! An endpoint returned by the coordinator is a claim check. When its app
//! metadata carries the redirect tag, redeeming the endpoint's own ticket
//! does not yield the payload: the data lives on the endpoint's locations
//! and must be requested there with a server-specific ticket.

use bytes::Bytes;
use fetch_core::{Endpoint, FetchError, Location, RedirectConfig, Result, Ticket};

/// A secondary fetch produced by a redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub location: Location,
    pub ticket: Ticket,
}

/// How one endpoint must be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Redeem the endpoint's own ticket at one of `locations`
    /// (alternatives, in order); empty means the coordinator
    Direct {
        locations: Vec<Location>,
        ticket: Ticket,
    },
    /// Fetch from every target with its derived ticket
    Redirect {
        /// Claim-check ticket to redeem on the coordinator first, if enabled
        claim_check: Option<Ticket>,
        targets: Vec<RedirectTarget>,
    },
}

impl Classification {
    pub fn route(&self) -> Route {
        match self {
            Classification::Direct { .. } => Route::Direct,
            Classification::Redirect { .. } => Route::Redirect,
        }
    }
}

/// Route label used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Redirect,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Direct => write!(f, "direct"),
            Route::Redirect => write!(f, "redirect"),
        }
    }
}

/// Decides between direct and redirected fetches
#[derive(Debug, Clone)]
pub struct RedirectionPolicy {
    tag: Bytes,
    config: RedirectConfig,
}

impl RedirectionPolicy {
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            tag: Bytes::from(config.tag.clone()),
            config,
        }
    }

    /// Whether the endpoint carries the redirect tag
    pub fn is_tagged(&self, endpoint: &Endpoint) -> bool {
        !self.tag.is_empty() && endpoint.app_metadata == self.tag
    }

    /// Classify `endpoint`, issued by the server at `origin`
    ///
    /// A redirect never targets `origin` itself.
    pub fn classify(&self, endpoint: &Endpoint, origin: &Location) -> Result<Classification> {
        if !self.is_tagged(endpoint) {
            return Ok(Classification::Direct {
                locations: endpoint.locations.clone(),
                ticket: endpoint.ticket.clone(),
            });
        }

        let targets = endpoint
            .secondary_locations(origin)
            .map(|location| {
                self.config
                    .ticket_for(location)
                    .map(|ticket| RedirectTarget {
                        location: location.clone(),
                        ticket,
                    })
                    .ok_or_else(|| {
                        FetchError::RedirectUnresolved(format!(
                            "no derived ticket configured for {}",
                            location
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if targets.is_empty() {
            return Err(FetchError::RedirectUnresolved(
                "tagged endpoint names no secondary location".to_string(),
            ));
        }

        Ok(Classification::Redirect {
            claim_check: self
                .config
                .redeem_claim_check
                .then(|| endpoint.ticket.clone()),
            targets,
        })
    }
}

impl Default for RedirectionPolicy {
    fn default() -> Self {
        Self::new(RedirectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetch_core::REUSE_CONNECTION_URI;

    const ORIGIN: &str = "grpc://coordinator:1";

    fn origin() -> Location {
        Location::new(ORIGIN)
    }

    fn policy() -> RedirectionPolicy {
        RedirectionPolicy::new(RedirectConfig::default().with_derived_ticket("example_data"))
    }

    #[test]
    fn test_untagged_is_direct() {
        let endpoint = Endpoint::new("claim").with_location("grpc://a:1");
        let classification = policy().classify(&endpoint, &origin()).unwrap();
        assert_eq!(
            classification,
            Classification::Direct {
                locations: vec![Location::new("grpc://a:1")],
                ticket: Ticket::from("claim"),
            }
        );
    }

    #[test]
    fn test_other_metadata_is_direct() {
        for metadata in ["", "table_data ", "TABLE_DATA", "other"] {
            let endpoint = Endpoint::new("t").with_app_metadata(metadata.to_string());
            assert_eq!(policy().classify(&endpoint, &origin()).unwrap().route(), Route::Direct);
        }
    }

    #[test]
    fn test_tagged_is_redirect_to_each_location() {
        let endpoint = Endpoint::new("claim")
            .with_location("grpc://b:9393")
            .with_location("grpc://c:9393")
            .with_app_metadata("table_data");

        let policy = RedirectionPolicy::new(
            RedirectConfig::default()
                .with_derived_ticket("example_data")
                .with_location_ticket("grpc://c:9393", "c_data"),
        );

        match policy.classify(&endpoint, &origin()).unwrap() {
            Classification::Redirect {
                claim_check,
                targets,
            } => {
                assert!(claim_check.is_none());
                assert_eq!(
                    targets,
                    vec![
                        RedirectTarget {
                            location: Location::new("grpc://b:9393"),
                            ticket: Ticket::from("example_data"),
                        },
                        RedirectTarget {
                            location: Location::new("grpc://c:9393"),
                            ticket: Ticket::from("c_data"),
                        },
                    ]
                );
                // the claim ticket itself is never presented to a secondary
                assert!(targets.iter().all(|t| t.ticket != endpoint.ticket));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_redirect_without_location_is_unresolved() {
        let endpoint = Endpoint::new("claim")
            .with_location(REUSE_CONNECTION_URI)
            .with_app_metadata("table_data");
        let err = policy().classify(&endpoint, &origin()).unwrap_err();
        assert!(matches!(err, FetchError::RedirectUnresolved(_)));
    }

    #[test]
    fn test_redirect_to_origin_is_unresolved() {
        for uri in [ORIGIN, "grpc+tcp://coordinator:1"] {
            let endpoint = Endpoint::new("claim")
                .with_location(uri)
                .with_app_metadata("table_data");
            let err = policy().classify(&endpoint, &origin()).unwrap_err();
            assert!(matches!(err, FetchError::RedirectUnresolved(_)));
        }
    }

    #[test]
    fn test_redirect_skips_origin_among_targets() {
        let endpoint = Endpoint::new("claim")
            .with_location(ORIGIN)
            .with_location("grpc://b:9393")
            .with_app_metadata("table_data");
        match policy().classify(&endpoint, &origin()).unwrap() {
            Classification::Redirect { targets, .. } => {
                assert_eq!(
                    targets,
                    vec![RedirectTarget {
                        location: Location::new("grpc://b:9393"),
                        ticket: Ticket::from("example_data"),
                    }]
                );
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_redirect_without_derived_ticket_is_unresolved() {
        let endpoint = Endpoint::new("claim")
            .with_location("grpc://b:9393")
            .with_app_metadata("table_data");
        let err = RedirectionPolicy::default().classify(&endpoint, &origin()).unwrap_err();
        assert!(matches!(err, FetchError::RedirectUnresolved(_)));
    }

    #[test]
    fn test_claim_check_redemption() {
        let policy = RedirectionPolicy::new(
            RedirectConfig::default()
                .with_derived_ticket("example_data")
                .with_redeem_claim_check(true),
        );
        let endpoint = Endpoint::new("claim")
            .with_location("grpc://b:9393")
            .with_app_metadata("table_data");

        match policy.classify(&endpoint, &origin()).unwrap() {
            Classification::Redirect { claim_check, .. } => {
                assert_eq!(claim_check, Some(Ticket::from("claim")))
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_tag() {
        let policy = RedirectionPolicy::new(
            RedirectConfig::default()
                .with_tag("elsewhere")
                .with_derived_ticket("x"),
        );
        let tagged = Endpoint::new("t")
            .with_location("grpc://b:1")
            .with_app_metadata("elsewhere");
        let default_tag = Endpoint::new("t")
            .with_location("grpc://b:1")
            .with_app_metadata("table_data");
        assert_eq!(policy.classify(&tagged, &origin()).unwrap().route(), Route::Redirect);
        assert_eq!(policy.classify(&default_tag, &origin()).unwrap().route(), Route::Direct);
    }
}
