//! Capability cache: the processes a server exposes and their schemas.
//!
//! Discovery fetches the capability listing once and validates requested
//! process names against it. Full process descriptions are fetched lazily,
//! one `DescribeProcess` round trip per process at bind time, and cached.

use std::collections::HashMap;

use super::errors::WpsError;
use crate::protocol::{Operation, ProcessDescriptor, ProcessSummary, WpsService};

// ─── Filtering ───────────────────────────────────────────────────────────────

/// Match `requested` names case-insensitively against `available`.
///
/// Returns `(found, missing)`: found names use the server's spelling, in the
/// order requested and without duplicates; missing names are returned as
/// given.
pub fn filter_case_insensitive(requested: &[String], available: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut found: Vec<String> = Vec::new();
    let mut missing = Vec::new();
    for name in requested {
        match available.iter().find(|a| a.eq_ignore_ascii_case(name)) {
            Some(identifier) => {
                if !found.iter().any(|f| f == identifier) {
                    found.push(identifier.to_string());
                }
            }
            None => missing.push(name.clone()),
        }
    }
    (found, missing)
}

// ─── CapabilityCache ─────────────────────────────────────────────────────────

/// Discovered processes for one endpoint.
#[derive(Debug, Clone)]
pub struct CapabilityCache {
    title: Option<String>,
    /// Retained processes, in server order.
    summaries: Vec<ProcessSummary>,
    /// Descriptions fetched so far, by identifier.
    descriptors: HashMap<String, ProcessDescriptor>,
}

impl CapabilityCache {
    /// Fetch the capability listing and retain the requested processes.
    ///
    /// `requested = None` retains every process on the server.
    pub async fn discover(
        service: &dyn WpsService,
        requested: Option<&[String]>,
    ) -> Result<Self, WpsError> {
        let capabilities = service
            .get_capabilities()
            .await
            .map_err(|e| WpsError::from_service(Operation::GetCapabilities, e))?;

        let summaries = match requested {
            None => capabilities.processes,
            Some(names) => {
                let available: Vec<&str> = capabilities
                    .processes
                    .iter()
                    .map(|p| p.identifier.as_str())
                    .collect();
                let (found, missing) = filter_case_insensitive(names, &available);
                if !missing.is_empty() {
                    return Err(WpsError::UnknownProcess { names: missing });
                }
                found
                    .iter()
                    .filter_map(|id| {
                        capabilities
                            .processes
                            .iter()
                            .find(|p| &p.identifier == id)
                            .cloned()
                    })
                    .collect()
            }
        };

        tracing::info!(
            url = service.url(),
            retained = summaries.len(),
            "discovered WPS processes"
        );

        Ok(Self {
            title: capabilities.title,
            summaries,
            descriptors: HashMap::new(),
        })
    }

    /// Fetch (once) and return the full description of a retained process.
    pub async fn describe(
        &mut self,
        service: &dyn WpsService,
        identifier: &str,
    ) -> Result<&ProcessDescriptor, WpsError> {
        if !self.descriptors.contains_key(identifier) {
            let descriptor = service
                .describe_process(identifier)
                .await
                .map_err(|e| WpsError::from_service(Operation::DescribeProcess, e))?;
            tracing::debug!(
                process = identifier,
                inputs = descriptor.inputs.len(),
                outputs = descriptor.outputs.len(),
                store = descriptor.supports_store,
                status = descriptor.supports_status,
                "described process"
            );
            self.descriptors.insert(identifier.to_string(), descriptor);
        }
        self.descriptors
            .get(identifier)
            .ok_or_else(|| WpsError::UnknownProcess {
                names: vec![identifier.to_string()],
            })
    }

    /// Service title from the capability listing.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Identifiers of retained processes, in server order.
    pub fn identifiers(&self) -> Vec<&str> {
        self.summaries.iter().map(|p| p.identifier.as_str()).collect()
    }

    pub fn summary(&self, identifier: &str) -> Option<&ProcessSummary> {
        self.summaries.iter().find(|p| p.identifier == identifier)
    }

    /// Description of a process, if already fetched.
    pub fn descriptor(&self, identifier: &str) -> Option<&ProcessDescriptor> {
        self.descriptors.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{hello_descriptor, MockService};
    use crate::protocol::ServiceError;

    #[test]
    fn test_filter_case_insensitive() {
        let available = ["Hello", "wordcounter", "inout"];
        let (found, missing) = filter_case_insensitive(
            &["hello".into(), "INOUT".into(), "nope".into(), "HELLO".into()],
            &available,
        );
        assert_eq!(found, vec!["Hello", "inout"]);
        assert_eq!(missing, vec!["nope"]);
    }

    #[tokio::test]
    async fn test_discover_all() {
        let service = MockService::new()
            .with_process(hello_descriptor())
            .with_process(ProcessDescriptor {
                identifier: "wordcounter".into(),
                ..hello_descriptor()
            });
        let cache = CapabilityCache::discover(&service, None).await.unwrap();
        assert_eq!(cache.identifiers(), vec!["hello", "wordcounter"]);
        // Discovery does not describe
        assert!(cache.descriptor("hello").is_none());
        assert_eq!(service.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_discover_unknown_process() {
        let service = MockService::new().with_process(hello_descriptor());
        let err = CapabilityCache::discover(&service, Some(&["HELLO".into(), "missing".into()]))
            .await
            .unwrap_err();
        match err {
            WpsError::UnknownProcess { names } => assert_eq!(names, vec!["missing"]),
            other => panic!("expected UnknownProcess, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discover_forbidden() {
        let service = MockService::new().fail_capabilities(ServiceError::Http {
            status: 403,
            body: String::new(),
        });
        let err = CapabilityCache::discover(&service, None).await.unwrap_err();
        assert!(matches!(
            err,
            WpsError::Unauthorized {
                operation: Operation::GetCapabilities
            }
        ));
    }

    #[tokio::test]
    async fn test_discover_propagates_other_errors() {
        let service = MockService::new().fail_capabilities(ServiceError::Parse {
            reason: "not xml".into(),
        });
        let err = CapabilityCache::discover(&service, None).await.unwrap_err();
        assert!(matches!(err, WpsError::Service(ServiceError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_describe_cached() {
        let service = MockService::new().with_process(hello_descriptor());
        let mut cache = CapabilityCache::discover(&service, None).await.unwrap();
        cache.describe(&service, "hello").await.unwrap();
        let descriptor = cache.describe(&service, "hello").await.unwrap();
        assert_eq!(descriptor.inputs[0].identifier, "name");
        assert_eq!(service.describe_calls(), 1);
    }

    #[tokio::test]
    async fn test_describe_forbidden() {
        let service = MockService::new()
            .with_process(hello_descriptor())
            .fail_describe(ServiceError::Exception {
                code: "AccessForbidden".into(),
                locator: None,
                text: "no".into(),
            });
        let mut cache = CapabilityCache::discover(&service, None).await.unwrap();
        let err = cache.describe(&service, "hello").await.unwrap_err();
        assert!(matches!(
            err,
            WpsError::Unauthorized {
                operation: Operation::DescribeProcess
            }
        ));
    }
}
