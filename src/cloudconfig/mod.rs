//! Cloud-config derivation.
//!
//! Once the infrastructure shape is known, a resource-allocation policy is
//! derived from it (AZs, network/subnetwork names, instance tags) and
//! uploaded to the running director.

use anyhow::{anyhow, Result};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudConfigInput {
    pub azs: Vec<String>,
    pub tags: Vec<String>,
    pub network_name: String,
    pub subnetwork_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Az {
    pub name: String,
    pub cloud_properties: AzCloudProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AzCloudProperties {
    pub zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubnetCloudProperties {
    pub network_name: String,
    pub subnetwork_name: String,
    pub ephemeral_external_ip: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Subnet {
    pub az: String,
    pub gateway: String,
    pub range: String,
    pub reserved: Vec<String>,
    pub cloud_properties: SubnetCloudProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Network {
    pub name: String,
    #[serde(rename = "type")]
    pub network_type: String,
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VmType {
    pub name: String,
    pub cloud_properties: VmTypeCloudProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VmTypeCloudProperties {
    pub machine_type: String,
    pub root_disk_size_gb: u32,
    pub root_disk_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Compilation {
    pub workers: u32,
    pub network: String,
    pub az: String,
    pub vm_type: String,
}

/// The derived resource-allocation policy uploaded to the director.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CloudConfig {
    pub azs: Vec<Az>,
    pub networks: Vec<Network>,
    pub vm_types: Vec<VmType>,
    pub compilation: Compilation,
}

pub trait Generator: Send + Sync {
    fn generate(&self, input: CloudConfigInput) -> Result<CloudConfig>;
}

const VM_TYPES: &[(&str, &str, u32)] = &[
    ("default", "n1-standard-1", 10),
    ("small", "n1-standard-2", 10),
    ("medium", "n1-standard-4", 50),
    ("large", "n1-standard-8", 100),
];

/// Spreads one subnet per availability zone across successive /20
/// ranges under 10.0.0.0/8, tagging instances so the provisioned
/// firewall rules apply to them.
pub struct GcpCloudConfigGenerator;

impl Generator for GcpCloudConfigGenerator {
    fn generate(&self, input: CloudConfigInput) -> Result<CloudConfig> {
        if input.azs.is_empty() {
            return Err(anyhow!("cloud config requires at least one availability zone"));
        }

        let azs: Vec<Az> = input
            .azs
            .iter()
            .enumerate()
            .map(|(i, zone)| Az {
                name: format!("z{}", i + 1),
                cloud_properties: AzCloudProperties { zone: zone.clone() },
            })
            .collect();

        let subnets: Vec<Subnet> = azs
            .iter()
            .enumerate()
            .map(|(i, az)| {
                // /20 blocks span 16 third-octet values, so step by 16
                let octet = 16 * (i + 1);
                Subnet {
                    az: az.name.clone(),
                    gateway: format!("10.0.{octet}.1"),
                    range: format!("10.0.{octet}.0/20"),
                    reserved: vec![format!("10.0.{octet}.2-10.0.{octet}.3")],
                    cloud_properties: SubnetCloudProperties {
                        network_name: input.network_name.clone(),
                        subnetwork_name: input.subnetwork_name.clone(),
                        ephemeral_external_ip: true,
                        tags: input.tags.clone(),
                    },
                }
            })
            .collect();

        Ok(CloudConfig {
            azs,
            networks: vec![Network {
                name: "private".to_string(),
                network_type: "manual".to_string(),
                subnets,
            }],
            vm_types: VM_TYPES
                .iter()
                .map(|(name, machine_type, disk)| VmType {
                    name: name.to_string(),
                    cloud_properties: VmTypeCloudProperties {
                        machine_type: machine_type.to_string(),
                        root_disk_size_gb: *disk,
                        root_disk_type: "pd-ssd".to_string(),
                    },
                })
                .collect(),
            compilation: Compilation {
                workers: 3,
                network: "private".to_string(),
                az: "z1".to_string(),
                vm_type: "default".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CloudConfigInput {
        CloudConfigInput {
            azs: vec![
                "zone-1".to_string(),
                "zone-2".to_string(),
                "zone-3".to_string(),
            ],
            tags: vec!["some-internal-tag".to_string()],
            network_name: "some-network".to_string(),
            subnetwork_name: "some-subnet".to_string(),
        }
    }

    #[test]
    fn maps_each_zone_to_an_az_and_subnet() {
        let config = GcpCloudConfigGenerator.generate(input()).unwrap();

        assert_eq!(config.azs.len(), 3);
        assert_eq!(config.azs[0].name, "z1");
        assert_eq!(config.azs[2].cloud_properties.zone, "zone-3");

        let subnets = &config.networks[0].subnets;
        assert_eq!(subnets.len(), 3);
        assert_eq!(subnets[0].range, "10.0.16.0/20");
        assert_eq!(subnets[1].range, "10.0.32.0/20");
        assert_eq!(subnets[0].cloud_properties.network_name, "some-network");
        assert_eq!(subnets[0].cloud_properties.tags, vec!["some-internal-tag"]);
    }

    #[test]
    fn compilation_lands_in_first_az() {
        let config = GcpCloudConfigGenerator.generate(input()).unwrap();
        assert_eq!(config.compilation.az, "z1");
        assert_eq!(config.compilation.network, "private");
    }

    #[test]
    fn rejects_empty_zone_list() {
        let empty = CloudConfigInput::default();
        assert!(GcpCloudConfigGenerator.generate(empty).is_err());
    }

    #[test]
    fn serializes_to_yaml() {
        let config = GcpCloudConfigGenerator.generate(input()).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("azs:"));
        assert!(yaml.contains("type: manual"));
        assert!(yaml.contains("machine_type: n1-standard-1"));
    }
}
