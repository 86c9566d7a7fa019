use ekp_config::MonitoringSettings;
use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{DeclaredResource, ResourceId, ResourceKind};
use serde_json::{json, Value};
use tracing::{instrument, Level};

use crate::{
    consts,
    provisioner::{allow, policy_document, service_trust},
    ProvisionError, Provisioner,
};

pub const WORKSPACE_ALIAS: &str = "eks-automode-platform";
pub const APPLICATION_LOG_GROUP: &str = "/aws/eks/automode-platform/applications";
pub const OTEL_LOG_GROUP: &str = "/aws/eks/automode-platform/otel";

/// Retention periods CloudWatch Logs accepts, in days.
const RETENTION_BUCKETS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1827, 3653,
];

/// Rounds `days` up to the nearest accepted retention period.
///
/// `None` keeps logs forever.
pub fn retention_bucket(days: u32) -> Option<u32> {
    RETENTION_BUCKETS.iter().copied().find(|&bucket| days <= bucket)
}

#[derive(Clone, Debug)]
pub struct Observability {
    pub workspace: ResourceId,
    pub application_log_group: ResourceId,
    pub otel_log_group: ResourceId,
    pub grafana: Option<ResourceId>,
}

impl Observability {
    /// Reference token for the managed Prometheus workspace id.
    pub fn workspace_id(&self) -> String {
        self.workspace.attr("WorkspaceId")
    }

    /// Remote-write URL of the managed Prometheus workspace.
    pub fn remote_write_url(&self, region: &str) -> String {
        format!(
            "https://aps-workspaces.{region}.amazonaws.com/workspaces/{}/api/v1/remote_write",
            self.workspace_id(),
        )
    }
}

pub struct ObservabilityProvisioner<'a> {
    pub settings: &'a MonitoringSettings,
    pub account: &'a str,
    pub region: &'a str,
}

impl ObservabilityProvisioner<'_> {
    fn log_group(
        &self,
        graph: &mut GraphBuilder,
        stack: &ResourceId,
        construct: &str,
        name: &str,
    ) -> Result<ResourceId, ProvisionError> {
        let mut spec = json!({ "LogGroupName": name });
        if let Some(days) = retention_bucket(self.settings.retention_days) {
            spec["RetentionInDays"] = days.into();
        }
        graph
            .add(DeclaredResource::new(stack.child(construct), ResourceKind::LogGroup, name, spec))
            .map_err(Into::into)
    }

    fn grafana(
        &self,
        graph: &mut GraphBuilder,
        stack: &ResourceId,
    ) -> Result<ResourceId, ProvisionError> {
        let service_role = graph.add(DeclaredResource::new(
            stack.child("GrafanaServiceRole"),
            ResourceKind::IamRole,
            "grafana-service-role",
            json!({ "AssumeRolePolicyDocument": service_trust("grafana.amazonaws.com") }),
        ))?;

        let data_sources: &[(&str, &str, &str, &[&str])] = &[
            (
                "GrafanaPrometheusRole",
                "grafana-prometheus-assume-role",
                "Prometheus",
                &[
                    "aps:QueryMetrics",
                    "aps:GetLabels",
                    "aps:GetSeries",
                    "aps:GetMetricMetadata",
                    "aps:ListWorkspaces",
                    "aps:DescribeWorkspace",
                ],
            ),
            (
                "GrafanaCloudWatchRole",
                "grafana-cloudwatch-assume-role",
                "CloudWatch",
                &[
                    "cloudwatch:DescribeAlarmsForMetric",
                    "cloudwatch:DescribeAlarmHistory",
                    "cloudwatch:DescribeAlarms",
                    "cloudwatch:ListMetrics",
                    "cloudwatch:GetMetricStatistics",
                    "cloudwatch:GetMetricData",
                    "logs:StartQuery",
                    "logs:GetQueryResults",
                    "logs:GetLogEvents",
                    "logs:DescribeLogGroups",
                    "logs:DescribeLogStreams",
                ],
            ),
            (
                "GrafanaXRayRole",
                "grafana-xray-assume-role",
                "X-Ray",
                &[
                    "xray:GetServiceGraph",
                    "xray:GetTraceSummaries",
                    "xray:GetTraceGraph",
                    "xray:GetGroups",
                    "xray:GetTimeSeriesServiceStatistics",
                    "xray:GetInsightSummaries",
                    "xray:GetInsight",
                    "xray:BatchGetTraces",
                ],
            ),
        ];

        for &(construct, role_name, source, actions) in data_sources {
            let role = graph.add(DeclaredResource::new(
                stack.child(construct),
                ResourceKind::IamRole,
                role_name,
                json!({
                    "RoleName": role_name,
                    "AssumeRolePolicyDocument": assumed_by_role(&service_role),
                    "Policies": [{
                        "PolicyName": format!("{construct}Policy"),
                        "PolicyDocument": policy_document(vec![allow(actions, &["*"])]),
                    }],
                }),
            ))?;
            graph.output(StackOutput::new(
                consts::STACK_OBSERVABILITY,
                &format!("{construct}Arn"),
                role.attr("Arn"),
                format!("ARN of the Grafana assume role for {source} data source"),
            ));
        }

        let workspace = graph.add(DeclaredResource::new(
            stack.child("GrafanaWorkspace"),
            ResourceKind::GrafanaWorkspace,
            WORKSPACE_ALIAS,
            json!({
                "AccountAccessType": "CURRENT_ACCOUNT",
                "AuthenticationProviders": ["AWS_SSO"],
                "PermissionType": "SERVICE_MANAGED",
                "RoleArn": service_role.attr("Arn"),
                "DataSources": ["PROMETHEUS", "CLOUDWATCH", "XRAY"],
                "Name": WORKSPACE_ALIAS,
            }),
        ))?;

        for (name, value, description) in [
            (
                "GrafanaWorkspaceUrl",
                format!("https://{}", workspace.attr("Endpoint")),
                "URL for the Grafana workspace".to_string(),
            ),
            (
                "GrafanaWorkspaceId",
                workspace.attr("Id"),
                "ID of the Amazon Managed Grafana workspace".to_string(),
            ),
            (
                "GrafanaServiceRoleArn",
                format!(
                    "arn:aws:iam::{}:role/service-role/AmazonGrafanaServiceRole",
                    self.account,
                ),
                "ARN of the Grafana service role for data source access".to_string(),
            ),
        ] {
            graph.output(StackOutput::new(
                consts::STACK_OBSERVABILITY,
                name,
                value,
                description,
            ));
        }
        Ok(workspace)
    }
}

impl Provisioner for ObservabilityProvisioner<'_> {
    type Output = Observability;

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let stack = ResourceId::new(consts::STACK_OBSERVABILITY);

        let workspace = graph.add(DeclaredResource::new(
            stack.child("AmpWorkspace"),
            ResourceKind::PrometheusWorkspace,
            WORKSPACE_ALIAS,
            json!({ "Alias": WORKSPACE_ALIAS }),
        ))?;
        let application_log_group =
            self.log_group(graph, &stack, "ApplicationLogGroup", APPLICATION_LOG_GROUP)?;
        let otel_log_group = self.log_group(graph, &stack, "OtelAppLogGroup", OTEL_LOG_GROUP)?;

        let grafana = if self.settings.grafana_enabled {
            Some(self.grafana(graph, &stack)?)
        } else {
            None
        };

        let observability = Observability {
            workspace,
            application_log_group,
            otel_log_group,
            grafana,
        };

        for (name, value, description) in [
            (
                "PrometheusWorkspaceId",
                observability.workspace_id(),
                "ID of the Amazon Managed Prometheus workspace",
            ),
            (
                "PrometheusWorkspaceUrl",
                format!(
                    "https://aps-workspaces.{}.amazonaws.com/workspaces/{}",
                    self.region,
                    observability.workspace_id(),
                ),
                "URL of the Amazon Managed Prometheus workspace",
            ),
            (
                "LogGroupName",
                observability.application_log_group.attr("Ref"),
                "Name of the CloudWatch Log Group for application logs",
            ),
            (
                "OtelLogGroupName",
                observability.otel_log_group.attr("Ref"),
                "Name of the CloudWatch Log Group for OpenTelemetry logs",
            ),
        ] {
            graph.output(StackOutput::new(
                consts::STACK_OBSERVABILITY,
                name,
                value,
                description,
            ));
        }
        Ok(observability)
    }
}

fn assumed_by_role(role: &ResourceId) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "AWS": role.attr("Arn") },
            "Action": "sts:AssumeRole",
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_rounds_up_to_accepted_periods() {
        assert_eq!(retention_bucket(0), Some(1));
        assert_eq!(retention_bucket(7), Some(7));
        assert_eq!(retention_bucket(8), Some(14));
        assert_eq!(retention_bucket(31), Some(60));
        assert_eq!(retention_bucket(3653), Some(3653));
        assert_eq!(retention_bucket(4000), None);
    }

    #[test]
    fn grafana_is_optional() {
        let settings = MonitoringSettings {
            grafana_enabled: false,
            ..Default::default()
        };
        let mut graph = GraphBuilder::new();
        let observability = ObservabilityProvisioner {
            settings: &settings,
            account: "123456789012",
            region: "us-west-2",
        }
        .declare(&mut graph)
        .unwrap();

        assert!(observability.grafana.is_none());
        assert_eq!(graph.len(), 3);
        assert_eq!(
            graph
                .get(&observability.application_log_group)
                .and_then(|group| group.spec_str("/LogGroupName")),
            Some(APPLICATION_LOG_GROUP),
        );
    }
}
