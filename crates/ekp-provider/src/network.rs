use ekp_config::NetworkSettings;
use ekp_graph::{GraphBuilder, StackOutput};
use ekp_openapi::{DeclaredResource, ResourceId, ResourceKind};
use serde_json::json;
use tracing::{instrument, warn, Level};

use crate::{
    consts,
    provisioner::{allow, policy_document, service_trust},
    ProvisionError, Provisioner,
};

/// Gateway endpoints: `(construct, service)`.
const GATEWAY_ENDPOINTS: &[(&str, &str)] = &[
    ("S3GatewayEndpoint", "s3"),
    ("DynamoDBGatewayEndpoint", "dynamodb"),
];

/// Interface endpoints: `(construct, service)`.
const INTERFACE_ENDPOINTS: &[(&str, &str)] = &[
    ("EcrDockerEndpoint", "ecr.dkr"),
    ("EcrEndpoint", "ecr.api"),
    ("CloudWatchLogsEndpoint", "logs"),
    ("CloudWatchEndpoint", "monitoring"),
    ("StsEndpoint", "sts"),
    ("EksEndpoint", "eks"),
    ("Ec2Endpoint", "ec2"),
];

/// Subnet mask bits carved out of the VPC block per subnet (`/20` in a `/16`).
const SUBNET_BITS: u8 = 12;

const PUBLIC: &str = "Public";
const PRIVATE: &str = "Private";
const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Clone, Debug)]
pub struct Network {
    pub vpc: ResourceId,
    pub internet_gateway: ResourceId,
    pub public_subnets: Vec<ResourceId>,
    pub private_subnets: Vec<ResourceId>,
    pub public_route_tables: Vec<ResourceId>,
    pub private_route_tables: Vec<ResourceId>,
    pub nat_gateways: Vec<ResourceId>,
    pub endpoints: Vec<ResourceId>,
}

impl Network {
    pub fn subnets(&self) -> impl Iterator<Item = &ResourceId> {
        self.private_subnets.iter().chain(&self.public_subnets)
    }

    pub fn route_tables(&self) -> impl Iterator<Item = &ResourceId> {
        self.private_route_tables.iter().chain(&self.public_route_tables)
    }
}

pub struct NetworkProvisioner<'a> {
    pub settings: &'a NetworkSettings,
    pub region: &'a str,
}

impl NetworkProvisioner<'_> {
    fn subnet(
        &self,
        graph: &mut GraphBuilder,
        vpc: &ResourceId,
        tier: &str,
        az: u8,
        index: usize,
    ) -> Result<ResourceId, ProvisionError> {
        let subnet_count = usize::from(self.settings.max_azs) * 2;
        graph
            .add(DeclaredResource::new(
                vpc.child(&format!("{tier}Subnet{}", az + 1)),
                ResourceKind::Subnet,
                format!("{tier}-{}", az + 1),
                json!({
                    "VpcId": vpc.attr("Ref"),
                    "AvailabilityZone": { "Fn::Select": [az, { "Fn::GetAZs": self.region }] },
                    "CidrBlock": {
                        "Fn::Select": [
                            index,
                            { "Fn::Cidr": [vpc.attr("CidrBlock"), subnet_count, SUBNET_BITS] },
                        ],
                    },
                    "MapPublicIpOnLaunch": tier == PUBLIC,
                    "Tags": [{ "Key": "aws-cdk:subnet-type", "Value": tier }],
                }),
            ))
            .map_err(Into::into)
    }

    /// A route table associated with `subnet` and its default route.
    fn route_table(
        &self,
        graph: &mut GraphBuilder,
        vpc: &ResourceId,
        subnet: &ResourceId,
        target: Option<(&str, &ResourceId)>,
    ) -> Result<(ResourceId, Option<ResourceId>), ProvisionError> {
        let table = graph.add(DeclaredResource::new(
            subnet.child("RouteTable"),
            ResourceKind::RouteTable,
            "route-table",
            json!({ "VpcId": vpc.attr("Ref") }),
        ))?;
        graph.add(DeclaredResource::new(
            subnet.child("RouteTableAssociation"),
            ResourceKind::SubnetRouteTableAssociation,
            "route-table-association",
            json!({
                "RouteTableId": table.attr("Ref"),
                "SubnetId": subnet.attr("Ref"),
            }),
        ))?;

        let route = target
            .map(|(property, target)| {
                graph.add(DeclaredResource::new(
                    subnet.child("DefaultRoute"),
                    ResourceKind::Route,
                    "default-route",
                    json!({
                        "RouteTableId": table.attr("Ref"),
                        "DestinationCidrBlock": ANY_IPV4,
                        property: target.attr("Ref"),
                    }),
                ))
            })
            .transpose()?;
        Ok((table, route))
    }
}

impl Provisioner for NetworkProvisioner<'_> {
    type Output = Network;

    #[instrument(level = Level::INFO, skip_all, err(Display))]
    fn declare(&self, graph: &mut GraphBuilder) -> Result<Self::Output, ProvisionError> {
        let stack = ResourceId::new(consts::STACK_NETWORK);
        let vpc_id = stack.child("EksVpc");

        let vpc = graph.add(DeclaredResource::new(
            vpc_id.clone(),
            ResourceKind::Vpc,
            format!("{}-vpc", consts::STACK_NETWORK),
            json!({
                "CidrBlock": self.settings.vpc_cidr,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "Tags": [{ "Key": "Name", "Value": format!("{}-vpc", consts::STACK_NETWORK) }],
            }),
        ))?;

        let internet_gateway = graph.add(DeclaredResource::new(
            vpc.child("IGW"),
            ResourceKind::InternetGateway,
            "igw",
            json!({}),
        ))?;
        let attachment = graph.add(DeclaredResource::new(
            vpc.child("VPCGW"),
            ResourceKind::VpcGatewayAttachment,
            "igw-attachment",
            json!({
                "VpcId": vpc.attr("Ref"),
                "InternetGatewayId": internet_gateway.attr("Ref"),
            }),
        ))?;

        let mut public_subnets = Vec::default();
        let mut private_subnets = Vec::default();
        for az in 0..self.settings.max_azs {
            let index = usize::from(az) * 2;
            public_subnets.push(self.subnet(graph, &vpc, PUBLIC, az, index)?);
            private_subnets.push(self.subnet(graph, &vpc, PRIVATE, az, index + 1)?);
        }

        let mut public_route_tables = Vec::default();
        for subnet in &public_subnets {
            let (table, route) =
                self.route_table(graph, &vpc, subnet, Some(("GatewayId", &internet_gateway)))?;
            if let Some(route) = route {
                // The route is rejected until the gateway is attached
                graph.depends_on(&route, &attachment);
            }
            public_route_tables.push(table);
        }

        let nat_count = self.settings.nat_gateways.min(self.settings.max_azs);
        let mut nat_gateways = Vec::default();
        for subnet in public_subnets.iter().take(usize::from(nat_count)) {
            let eip = graph.add(DeclaredResource::new(
                subnet.child("EIP"),
                ResourceKind::Eip,
                "nat-eip",
                json!({ "Domain": "vpc" }),
            ))?;
            let nat = graph.add(DeclaredResource::new(
                subnet.child("NATGateway"),
                ResourceKind::NatGateway,
                "nat-gateway",
                json!({
                    "SubnetId": subnet.attr("Ref"),
                    "AllocationId": eip.attr("AllocationId"),
                }),
            ))?;
            graph.depends_on(&nat, &attachment);
            nat_gateways.push(nat);
        }
        if nat_gateways.is_empty() {
            warn!("no NAT gateway declared; private subnets have no egress");
        }

        let mut private_route_tables = Vec::default();
        for (index, subnet) in private_subnets.iter().enumerate() {
            // Subnets share gateways round-robin when there are fewer gateways than zones
            let nat = (!nat_gateways.is_empty())
                .then(|| ("NatGatewayId", &nat_gateways[index % nat_gateways.len()]));
            let (table, _) = self.route_table(graph, &vpc, subnet, nat)?;
            private_route_tables.push(table);
        }

        let mut endpoints = Vec::default();
        let route_table_ids: Vec<_> = private_route_tables
            .iter()
            .chain(&public_route_tables)
            .map(|id| id.attr("Ref"))
            .collect();
        for &(name, service) in GATEWAY_ENDPOINTS {
            endpoints.push(graph.add(DeclaredResource::new(
                vpc_id.child(name),
                ResourceKind::VpcEndpoint,
                service,
                json!({
                    "ServiceName": format!("com.amazonaws.{}.{service}", self.region),
                    "VpcEndpointType": "Gateway",
                    "VpcId": vpc.attr("Ref"),
                    "RouteTableIds": route_table_ids,
                }),
            ))?);
        }
        let subnet_ids: Vec<_> = private_subnets.iter().map(|id| id.attr("Ref")).collect();
        for &(name, service) in INTERFACE_ENDPOINTS {
            endpoints.push(graph.add(DeclaredResource::new(
                vpc_id.child(name),
                ResourceKind::VpcEndpoint,
                service,
                json!({
                    "ServiceName": format!("com.amazonaws.{}.{service}", self.region),
                    "VpcEndpointType": "Interface",
                    "VpcId": vpc.attr("Ref"),
                    "SubnetIds": subnet_ids,
                    "PrivateDnsEnabled": true,
                }),
            ))?);
        }

        if self.settings.enable_flow_logs {
            declare_flow_logs(graph, &vpc)?;
        }

        graph.output(StackOutput::new(
            consts::STACK_NETWORK,
            "VpcId",
            vpc.attr("Ref"),
            "ID of the VPC hosting the EKS cluster",
        ));

        Ok(Network {
            vpc,
            internet_gateway,
            public_subnets,
            private_subnets,
            public_route_tables,
            private_route_tables,
            nat_gateways,
            endpoints,
        })
    }
}

fn declare_flow_logs(graph: &mut GraphBuilder, vpc: &ResourceId) -> Result<(), ProvisionError> {
    let log_group = graph.add(DeclaredResource::new(
        vpc.child("FlowLogsLogGroup"),
        ResourceKind::LogGroup,
        "flow-logs",
        json!({ "RetentionInDays": 731 }),
    ))?;
    let role = graph.add(DeclaredResource::new(
        vpc.child("FlowLogsRole"),
        ResourceKind::IamRole,
        "flow-logs",
        json!({
            "AssumeRolePolicyDocument": service_trust("vpc-flow-logs.amazonaws.com"),
            "Policies": [{
                "PolicyName": "FlowLogs",
                "PolicyDocument": policy_document(vec![allow(
                    &["logs:CreateLogStream", "logs:PutLogEvents", "logs:DescribeLogStreams"],
                    &[log_group.attr("Arn").as_str()],
                )]),
            }],
        }),
    ))?;
    graph.add(DeclaredResource::new(
        vpc.child("FlowLogs"),
        ResourceKind::FlowLog,
        "flow-logs",
        json!({
            "ResourceId": vpc.attr("Ref"),
            "ResourceType": "VPC",
            "TrafficType": "ALL",
            "LogDestinationType": "cloud-watch-logs",
            "LogGroupName": log_group.attr("Ref"),
            "DeliverLogsPermissionArn": role.attr("Arn"),
        }),
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(settings: &NetworkSettings) -> (GraphBuilder, Network) {
        let mut graph = GraphBuilder::new();
        let network = NetworkProvisioner {
            settings,
            region: "us-west-2",
        }
        .declare(&mut graph)
        .unwrap();
        (graph, network)
    }

    fn default_route<'a>(
        graph: &'a GraphBuilder,
        subnet: &ResourceId,
    ) -> Option<&'a DeclaredResource> {
        graph.get(&subnet.child("DefaultRoute"))
    }

    #[test]
    fn private_subnets_egress_through_the_nat_gateway() {
        let (graph, network) = declare(&NetworkSettings::default());
        let [nat] = network.nat_gateways.as_slice() else {
            panic!("expected one NAT gateway: {:?}", network.nat_gateways);
        };
        assert_eq!(network.private_route_tables.len(), 2);

        for subnet in &network.private_subnets {
            let route = default_route(&graph, subnet).unwrap();
            assert_eq!(route.spec_str("/DestinationCidrBlock"), Some("0.0.0.0/0"));
            assert_eq!(route.spec_str("/NatGatewayId"), Some(nat.attr("Ref").as_str()));
        }
        for subnet in &network.public_subnets {
            let route = default_route(&graph, subnet).unwrap();
            assert_eq!(
                route.spec_str("/GatewayId"),
                Some(network.internet_gateway.attr("Ref").as_str()),
            );
            assert_eq!(
                graph.get(subnet).unwrap().spec.pointer("/MapPublicIpOnLaunch"),
                Some(&json!(true)),
            );
        }

        let graph = graph.finalize().unwrap();
        let attachment = network.vpc.child("VPCGW");
        assert!(graph.has_edge(&attachment, nat));
        assert!(graph.has_edge(&attachment, &network.public_subnets[0].child("DefaultRoute")));
    }

    #[test]
    fn gateway_endpoints_attach_to_every_route_table() {
        let (graph, network) = declare(&NetworkSettings::default());
        let route_tables: Vec<_> = network.route_tables().map(|id| json!(id.attr("Ref"))).collect();
        assert_eq!(route_tables.len(), 4);

        let gateways: Vec<_> = network
            .endpoints
            .iter()
            .filter_map(|id| graph.get(id))
            .filter(|endpoint| endpoint.spec_str("/VpcEndpointType") == Some("Gateway"))
            .collect();
        assert_eq!(gateways.len(), GATEWAY_ENDPOINTS.len());
        for endpoint in gateways {
            assert_eq!(endpoint.spec["RouteTableIds"], json!(route_tables));
        }
    }

    #[test]
    fn nat_gateways_are_capped_by_availability_zones() {
        let (graph, network) = declare(&NetworkSettings {
            nat_gateways: 5,
            ..Default::default()
        });
        assert_eq!(network.nat_gateways.len(), 2);
        for (subnet, nat) in network.private_subnets.iter().zip(&network.nat_gateways) {
            assert_eq!(
                default_route(&graph, subnet).unwrap().spec_str("/NatGatewayId"),
                Some(nat.attr("Ref").as_str()),
            );
        }

        let (graph, network) = declare(&NetworkSettings {
            nat_gateways: 0,
            ..Default::default()
        });
        assert!(network.nat_gateways.is_empty());
        assert!(network
            .private_subnets
            .iter()
            .all(|subnet| default_route(&graph, subnet).is_none()));
    }
}
