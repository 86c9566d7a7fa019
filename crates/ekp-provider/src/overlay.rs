//! Everything that differs between Fargate and Auto Mode clusters.
//!
//! [`branch`] is the only place the compute mode is inspected; provisioners
//! receive the resulting [`ComputeOverlay`] and apply it without matching on
//! the mode themselves.

use std::{collections::BTreeMap, fmt::Write};

use ekp_config::{ComputeMode, ComputeSettings};
use ekp_openapi::{consts::LABEL_COMPUTE_TYPE, k8s};
use k8s_openapi::api::core::v1::{PodTemplateSpec, Toleration};
use maplit::btreemap;

use crate::consts::COMPUTE_TYPE_LABEL;

const FARGATE: &str = "fargate";
const ADAPTER_TAINT: &str = "prometheus-adapter";

pub const AUTO_MODE_NODE_POOLS: &[&str] = &["general-purpose", "system"];

#[derive(Clone, Debug, PartialEq)]
pub struct ComputeOverlay {
    pub mode: ComputeMode,
    pub cluster: ClusterCompute,
    pub placement: Placement,
    pub adapter_rules: AdapterRuleSet,
    /// Prefix of cluster add-on construct ids.
    pub addon_prefix: &'static str,
    pub adapter_toleration: Toleration,
}

/// How the cluster obtains compute capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterCompute {
    /// One Fargate profile per listed namespace.
    Fargate { profiles: Vec<String> },
    /// Auto Mode with the given built-in node pools.
    AutoMode { node_pools: Vec<String> },
}

/// Scheduling hints merged into every platform pod template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Placement {
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
    pub pod_labels: BTreeMap<String, String>,
}

impl Placement {
    pub fn is_empty(&self) -> bool {
        self.node_selector.is_empty() && self.tolerations.is_empty() && self.pod_labels.is_empty()
    }

    pub fn apply(&self, template: &mut PodTemplateSpec) {
        if self.is_empty() {
            return;
        }

        let metadata = template.metadata.get_or_insert_with(Default::default);
        metadata
            .labels
            .get_or_insert_with(Default::default)
            .extend(self.pod_labels.clone());

        let spec = template.spec.get_or_insert_with(Default::default);
        if !self.node_selector.is_empty() {
            spec.node_selector
                .get_or_insert_with(Default::default)
                .extend(self.node_selector.clone());
        }
        if !self.tolerations.is_empty() {
            spec.tolerations
                .get_or_insert_with(Default::default)
                .extend(self.tolerations.iter().cloned());
        }
    }
}

/// One custom metric the adapter derives from a Prometheus series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterRule {
    pub app: &'static str,
    pub series: &'static str,
    /// The metric name autoscalers ask for.
    pub metric: &'static str,
    /// Whether the series is a counter exposed as a per-minute rate.
    pub rate: bool,
}

impl AdapterRule {
    pub fn series_query(&self) -> String {
        format!("{}{{app=\"{}\"}}", self.series, self.app)
    }

    pub fn metrics_query(&self) -> String {
        let selector = format!("{}{{app=\"{}\",<<.LabelMatchers>>}}", self.series, self.app);
        if self.rate {
            format!("rate({selector}[1m]) * 60")
        } else {
            selector
        }
    }
}

/// The adapter's `config.yaml` for one compute mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterRuleSet {
    pub mode: ComputeMode,
    pub rules: Vec<AdapterRule>,
}

impl AdapterRuleSet {
    fn standard(mode: ComputeMode) -> Self {
        let rule = |app, series, metric, rate| AdapterRule {
            app,
            series,
            metric,
            rate,
        };

        Self {
            mode,
            rules: vec![
                rule("java-otel-sample-app", "http_requests_total", "java_app_requests_rate", true),
                rule("go-otel-sample-app", "http_requests_total", "go_app_requests_rate", true),
                rule(
                    "sample-metrics-app",
                    "sample_app_requests_total",
                    "sample_app_requests_rate",
                    true,
                ),
                rule("otel-sample-app", "pod_cpu_utilization", "pod_cpu_utilization", false),
            ],
        }
    }

    pub fn metric(&self, app: &str) -> Option<&AdapterRule> {
        self.rules.iter().find(|rule| rule.app == app)
    }

    pub fn render(&self) -> String {
        let mut config = format!("# prometheus-adapter rules for {} clusters\nrules:\n", self.mode);
        for rule in &self.rules {
            // Writing into a `String` cannot fail
            let _ = write!(
                config,
                "- seriesQuery: '{series}'\n  \
                   resources:\n    \
                     overrides:\n      \
                       kubernetes_namespace: {{resource: \"namespace\"}}\n      \
                       kubernetes_pod_name: {{resource: \"pod\"}}\n  \
                   name:\n    \
                     as: \"{metric}\"\n  \
                   metricsQuery: '{query}'\n",
                series = rule.series_query(),
                metric = rule.metric,
                query = rule.metrics_query(),
            );
        }
        config
    }
}

/// Derives the compute overlay for the given settings.
pub fn branch(settings: &ComputeSettings) -> ComputeOverlay {
    let mode = settings.mode;
    let fargate_toleration = || k8s::toleration(COMPUTE_TYPE_LABEL, FARGATE);

    match mode {
        ComputeMode::Fargate => ComputeOverlay {
            mode,
            cluster: ClusterCompute::Fargate {
                profiles: settings.fargate_profiles.clone(),
            },
            placement: Placement {
                node_selector: btreemap! {
                    COMPUTE_TYPE_LABEL.into() => FARGATE.into(),
                },
                tolerations: vec![fargate_toleration()],
                pod_labels: btreemap! {
                    LABEL_COMPUTE_TYPE.into() => FARGATE.into(),
                },
            },
            adapter_rules: AdapterRuleSet::standard(mode),
            addon_prefix: mode.id_prefix(),
            adapter_toleration: fargate_toleration(),
        },
        ComputeMode::AutoMode => ComputeOverlay {
            mode,
            cluster: ClusterCompute::AutoMode {
                node_pools: AUTO_MODE_NODE_POOLS.iter().map(|&pool| pool.into()).collect(),
            },
            placement: Placement::default(),
            adapter_rules: AdapterRuleSet::standard(mode),
            addon_prefix: mode.id_prefix(),
            adapter_toleration: k8s::toleration(COMPUTE_TYPE_LABEL, ADAPTER_TAINT),
        },
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::PodSpec;

    use super::*;

    #[test]
    fn modes_differ_in_placement_and_rules() {
        let auto_mode = branch(&ComputeSettings::default());
        let fargate = branch(&ComputeSettings::fargate());

        assert_ne!(auto_mode.placement, fargate.placement);
        assert_ne!(auto_mode.adapter_rules, fargate.adapter_rules);
        assert_ne!(auto_mode.adapter_rules.render(), fargate.adapter_rules.render());
        assert_ne!(auto_mode.adapter_toleration, fargate.adapter_toleration);
        assert!(auto_mode.placement.is_empty());
    }

    #[test]
    fn branch_is_deterministic() {
        for settings in [ComputeSettings::default(), ComputeSettings::fargate()] {
            assert_eq!(branch(&settings), branch(&settings));
        }
    }

    #[test]
    fn auto_mode_uses_builtin_node_pools() {
        assert_eq!(
            branch(&ComputeSettings::default()).cluster,
            ClusterCompute::AutoMode {
                node_pools: vec!["general-purpose".into(), "system".into()],
            },
        );
    }

    #[test]
    fn fargate_placement_pins_pods_to_fargate() {
        let overlay = branch(&ComputeSettings::fargate());
        let mut template = k8s::pod_template(
            k8s::app_labels("sample-metrics-app"),
            BTreeMap::default(),
            PodSpec::default(),
        );
        overlay.placement.apply(&mut template);

        let template = ::serde_json::to_value(&template).unwrap();
        assert_eq!(template["metadata"]["labels"]["app"], "sample-metrics-app");
        assert_eq!(template["metadata"]["labels"]["compute-type"], "fargate");
        assert_eq!(
            template["spec"]["nodeSelector"]["eks.amazonaws.com/compute-type"],
            "fargate",
        );
        assert_eq!(template["spec"]["tolerations"][0]["effect"], "NoSchedule");
    }

    #[test]
    fn rate_rules_scale_to_per_minute() {
        let rules = AdapterRuleSet::standard(ComputeMode::AutoMode);
        let go = rules.metric("go-otel-sample-app").unwrap();
        assert_eq!(
            go.metrics_query(),
            r#"rate(http_requests_total{app="go-otel-sample-app",<<.LabelMatchers>>}[1m]) * 60"#,
        );

        let otel = rules.metric("otel-sample-app").unwrap();
        assert_eq!(
            otel.metrics_query(),
            r#"pod_cpu_utilization{app="otel-sample-app",<<.LabelMatchers>>}"#,
        );
        assert!(rules.render().contains("as: \"go_app_requests_rate\""));
    }
}
