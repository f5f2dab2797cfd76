use chrono::{DateTime, Utc};
use console::style;
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::providers::{Category, ProviderDescriptor};
use crate::registry::ProviderRegistry;

/// Health of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub priority: i32,
    pub configured: bool,
    pub connected: bool,
}

/// Snapshot of every provider, grouped by category in try order
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub categories: BTreeMap<Category, Vec<ProviderStatus>>,
}

impl StatusReport {
    pub fn providers(&self, category: Category) -> &[ProviderStatus] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Produces diagnostic snapshots of the registry
#[derive(Debug, Clone)]
pub struct StatusReporter {
    registry: Arc<ProviderRegistry>,
}

impl StatusReporter {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Probe every provider; never fails
    ///
    /// Probes run concurrently but results keep registry order. A probe that
    /// errors or panics is reported as not connected.
    pub async fn get_status(&self) -> StatusReport {
        let mut categories = BTreeMap::new();

        for category in Category::ALL {
            let probes = self
                .registry
                .list_providers(category)
                .iter()
                .map(probe_provider);
            categories.insert(category, join_all(probes).await);
        }

        StatusReport {
            generated_at: Utc::now(),
            categories,
        }
    }
}

async fn probe_provider(provider: &ProviderDescriptor) -> ProviderStatus {
    let configured = provider.is_configured();

    let connected = if configured {
        match AssertUnwindSafe(provider.is_connected()).catch_unwind().await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                tracing::warn!(provider = %provider.name(), error = %e, "Connection probe failed");
                false
            }
            Err(_) => {
                tracing::error!(provider = %provider.name(), "Connection probe panicked");
                false
            }
        }
    } else {
        false
    };

    ProviderStatus {
        name: provider.name().to_string(),
        priority: provider.priority(),
        configured,
        connected,
    }
}

/// Render the report as the operator-facing status table
pub fn render_text(report: &StatusReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "PROVIDER STATUS");
    let _ = writeln!(out, "{rule}");

    for category in Category::ALL {
        let _ = writeln!(out, "\n{} providers:", capitalize(category.as_str()));

        let providers = report.providers(category);
        if providers.is_empty() {
            let _ = writeln!(out, "  (none registered)");
            continue;
        }

        for provider in providers {
            let symbol = if provider.connected {
                style("[OK]").green()
            } else if provider.configured {
                style("[WARN]").yellow()
            } else {
                style("[FAIL]").red()
            };
            let _ = writeln!(
                out,
                "  {} {} (Priority: {})",
                symbol, provider.name, provider.priority
            );
        }
    }

    let _ = write!(out, "\n{rule}");
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Artifact, GenerationRequest, MockProviderBackend, ProviderBackend};
    use crate::ProviderError;
    use async_trait::async_trait;

    fn backend(configured: bool, probe: Option<Result<bool, &'static str>>) -> MockProviderBackend {
        let mut backend = MockProviderBackend::new();
        backend.expect_is_configured().return_const(configured);
        backend.expect_invoke().never();
        match probe {
            Some(outcome) => {
                backend.expect_is_connected().times(1).returning(move || {
                    outcome.map_err(|message| ProviderError::Failed(message.to_string()))
                });
            }
            None => {
                backend.expect_is_connected().never();
            }
        }
        backend
    }

    fn reporter(providers: Vec<(&str, Category, i32, MockProviderBackend)>) -> StatusReporter {
        let mut registry = ProviderRegistry::new();
        for (name, category, priority, backend) in providers {
            registry
                .register(ProviderDescriptor::new(name, category, priority, Arc::new(backend)))
                .unwrap();
        }
        StatusReporter::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_status_flags() {
        let reporter = reporter(vec![
            ("Groq", Category::Script, 1, backend(true, Some(Ok(true)))),
            ("Gemini", Category::Script, 2, backend(true, Some(Ok(false)))),
            ("OpenAI", Category::Script, 3, backend(false, None)),
        ]);

        let report = reporter.get_status().await;

        assert_eq!(
            report.providers(Category::Script),
            [
                ProviderStatus {
                    name: "Groq".into(),
                    priority: 1,
                    configured: true,
                    connected: true,
                },
                ProviderStatus {
                    name: "Gemini".into(),
                    priority: 2,
                    configured: true,
                    connected: false,
                },
                ProviderStatus {
                    name: "OpenAI".into(),
                    priority: 3,
                    configured: false,
                    connected: false,
                },
            ]
        );
        assert!(report.providers(Category::Image).is_empty());
        assert_eq!(report.categories.len(), 3);
    }

    #[tokio::test]
    async fn test_probe_errors_never_propagate() {
        let reporter = reporter(vec![
            ("A", Category::Image, 1, backend(true, Some(Err("dns failure")))),
            ("B", Category::Voice, 1, backend(true, Some(Err("tls handshake")))),
        ]);

        let report = reporter.get_status().await;

        assert!(!report.providers(Category::Image)[0].connected);
        assert!(report.providers(Category::Voice)[0].configured);
        assert!(!report.providers(Category::Voice)[0].connected);
    }

    struct PanickingBackend;

    #[async_trait]
    impl ProviderBackend for PanickingBackend {
        fn is_configured(&self) -> bool {
            true
        }

        async fn is_connected(&self) -> Result<bool, ProviderError> {
            panic!("probe exploded")
        }

        async fn invoke(&self, _request: &GenerationRequest) -> Result<Artifact, ProviderError> {
            unreachable!("status never invokes providers")
        }
    }

    #[tokio::test]
    async fn test_panicking_probe_reported_as_disconnected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(ProviderDescriptor::new(
                "Boom",
                Category::Voice,
                1,
                Arc::new(PanickingBackend),
            ))
            .unwrap();
        let reporter = StatusReporter::new(Arc::new(registry));

        let report = reporter.get_status().await;

        assert!(report.providers(Category::Voice)[0].configured);
        assert!(!report.providers(Category::Voice)[0].connected);
    }

    #[test]
    fn test_status_is_repeatable() {
        let reporter = reporter(vec![("Groq", Category::Script, 1, {
            let mut backend = MockProviderBackend::new();
            backend.expect_is_configured().return_const(true);
            backend.expect_is_connected().times(2).returning(|| Ok(true));
            backend
        })]);

        let first = tokio_test::block_on(reporter.get_status());
        let second = tokio_test::block_on(reporter.get_status());

        assert_eq!(first.categories, second.categories);
    }

    #[test]
    fn test_render_text() {
        console::set_colors_enabled(false);
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::Script,
            vec![
                ProviderStatus {
                    name: "Groq".into(),
                    priority: 1,
                    configured: true,
                    connected: true,
                },
                ProviderStatus {
                    name: "Gemini".into(),
                    priority: 2,
                    configured: true,
                    connected: false,
                },
            ],
        );
        categories.insert(
            Category::Voice,
            vec![ProviderStatus {
                name: "ElevenLabs".into(),
                priority: 1,
                configured: false,
                connected: false,
            }],
        );
        let report = StatusReport {
            generated_at: Utc::now(),
            categories,
        };

        let text = render_text(&report);

        assert!(text.contains("Script providers:"));
        assert!(text.contains("  [OK] Groq (Priority: 1)"));
        assert!(text.contains("  [WARN] Gemini (Priority: 2)"));
        assert!(text.contains("  [FAIL] ElevenLabs (Priority: 1)"));
        assert!(text.contains("Image providers:\n  (none registered)"));
    }

    #[test]
    fn test_report_serializes_lowercase_categories() {
        let mut categories = BTreeMap::new();
        categories.insert(Category::Image, Vec::new());
        let report = StatusReport {
            generated_at: Utc::now(),
            categories,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["categories"]["image"].as_array().unwrap().is_empty());
    }
}
