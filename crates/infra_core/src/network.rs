//! Isolated network for batch workloads.
//!
//! One public and one private subnet per availability zone. Public subnets
//! route through an internet gateway and each hosts a NAT gateway that the
//! private subnet of the same zone uses for egress.

use serde_json::{json, Value};

use crate::template::intrinsic::{get_att, get_azs, reference, select};
use crate::template::{Resource, StackScope, SynthError};

pub const VPC_CIDR: &str = "10.0.0.0/16";
pub const AVAILABILITY_ZONES: usize = 2;
const SUBNET_PREFIX_LEN: u32 = 18;
const ANY_IPV4: &str = "0.0.0.0/0";

/// Handles to the network resources other constructs attach to.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub vpc_logical_id: String,
    pub public_subnets: Vec<Value>,
    pub private_subnets: Vec<Value>,
    /// Private subnets only have egress once these routes exist.
    pub private_route_ids: Vec<String>,
}

impl Network {
    pub fn vpc_id(&self) -> Value {
        reference(&self.vpc_logical_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    pub logical_id: String,
}

impl SecurityGroup {
    pub fn group_id(&self) -> Value {
        get_att(&self.logical_id, "GroupId")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubnetKind {
    Public,
    Private,
}

impl SubnetKind {
    fn label(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
        }
    }
}

/// Carves the `index`-th /18 block out of [`VPC_CIDR`].
fn subnet_cidr(index: usize) -> String {
    let block = 1u32 << (32 - SUBNET_PREFIX_LEN);
    let offset = block * index as u32;
    let third_octet = offset >> 8;
    format!("10.0.{third_octet}.0/{SUBNET_PREFIX_LEN}")
}

pub fn build_network(scope: &mut StackScope, id: &str) -> Result<Network, SynthError> {
    let vpc = scope.add(
        &[id, "Resource"],
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": VPC_CIDR,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": [scope.name_tag(&[id])],
            }),
        ),
    )?;

    let igw = scope.add(
        &[id, "IGW"],
        Resource::new(
            "AWS::EC2::InternetGateway",
            json!({ "Tags": [scope.name_tag(&[id])] }),
        ),
    )?;
    let attachment = scope.add(
        &[id, "VPCGW"],
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": reference(&vpc),
                "InternetGatewayId": reference(&igw),
            }),
        ),
    )?;

    let mut network = Network {
        vpc_logical_id: vpc.clone(),
        public_subnets: Vec::with_capacity(AVAILABILITY_ZONES),
        private_subnets: Vec::with_capacity(AVAILABILITY_ZONES),
        private_route_ids: Vec::with_capacity(AVAILABILITY_ZONES),
    };

    let mut nat_gateways = Vec::with_capacity(AVAILABILITY_ZONES);
    for zone in 0..AVAILABILITY_ZONES {
        let subnet = format!("PublicSubnet{}", zone + 1);
        let ids = add_subnet(scope, id, &subnet, &vpc, zone, SubnetKind::Public)?;

        let route = scope.add(
            &[id, &subnet, "DefaultRoute"],
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference(&ids.route_table),
                    "DestinationCidrBlock": ANY_IPV4,
                    "GatewayId": reference(&igw),
                }),
            )
            .depends_on(attachment.clone()),
        )?;
        let eip = scope.add(
            &[id, &subnet, "EIP"],
            Resource::new(
                "AWS::EC2::EIP",
                json!({ "Domain": "vpc", "Tags": [scope.name_tag(&[id, &subnet])] }),
            ),
        )?;
        let nat = scope.add(
            &[id, &subnet, "NATGateway"],
            Resource::new(
                "AWS::EC2::NatGateway",
                json!({
                    "SubnetId": reference(&ids.subnet),
                    "AllocationId": get_att(&eip, "AllocationId"),
                    "Tags": [scope.name_tag(&[id, &subnet])],
                }),
            )
            .depends_on(route)
            .depends_on(ids.association),
        )?;

        network.public_subnets.push(reference(&ids.subnet));
        nat_gateways.push(nat);
    }

    for (zone, nat) in nat_gateways.iter().enumerate() {
        let subnet = format!("PrivateSubnet{}", zone + 1);
        let ids = add_subnet(scope, id, &subnet, &vpc, zone, SubnetKind::Private)?;

        let route = scope.add(
            &[id, &subnet, "DefaultRoute"],
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference(&ids.route_table),
                    "DestinationCidrBlock": ANY_IPV4,
                    "NatGatewayId": reference(nat),
                }),
            ),
        )?;

        network.private_subnets.push(reference(&ids.subnet));
        network.private_route_ids.push(route);
    }

    Ok(network)
}

struct SubnetIds {
    subnet: String,
    route_table: String,
    association: String,
}

fn add_subnet(
    scope: &mut StackScope,
    id: &str,
    subnet: &str,
    vpc: &str,
    zone: usize,
    kind: SubnetKind,
) -> Result<SubnetIds, SynthError> {
    // Public blocks come first, private blocks follow.
    let block_index = match kind {
        SubnetKind::Public => zone,
        SubnetKind::Private => AVAILABILITY_ZONES + zone,
    };

    let subnet_id = scope.add(
        &[id, subnet, "Subnet"],
        Resource::new(
            "AWS::EC2::Subnet",
            json!({
                "VpcId": reference(vpc),
                "AvailabilityZone": select(zone, get_azs()),
                "CidrBlock": subnet_cidr(block_index),
                "MapPublicIpOnLaunch": kind == SubnetKind::Public,
                "Tags": [
                    { "Key": "subnet-type", "Value": kind.label() },
                    scope.name_tag(&[id, subnet]),
                ],
            }),
        ),
    )?;
    let route_table = scope.add(
        &[id, subnet, "RouteTable"],
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({
                "VpcId": reference(vpc),
                "Tags": [scope.name_tag(&[id, subnet])],
            }),
        ),
    )?;
    let association = scope.add(
        &[id, subnet, "RouteTableAssociation"],
        Resource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": reference(&route_table),
                "SubnetId": reference(&subnet_id),
            }),
        ),
    )?;

    Ok(SubnetIds {
        subnet: subnet_id,
        route_table,
        association,
    })
}

/// Security group with no ingress and unrestricted egress.
pub fn outbound_only_security_group(
    scope: &mut StackScope,
    id: &str,
    network: &Network,
    description: &str,
) -> Result<SecurityGroup, SynthError> {
    let logical_id = scope.add(
        &[id, "Resource"],
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": description,
                "VpcId": network.vpc_id(),
                "SecurityGroupEgress": [{
                    "CidrIp": ANY_IPV4,
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1",
                }],
            }),
        ),
    )?;
    Ok(SecurityGroup { logical_id })
}
