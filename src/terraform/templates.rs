//! Terraform template selection and parameterization.
//!
//! Pure mapping from the requested load-balancer type to a template body
//! plus the variable subset the executor needs. Unknown types fall back to
//! the no-load-balancer template.

use crate::storage::Lb;

pub const VARS_TEMPLATE: &str = r#"variable "project_id" {
  type = string
}

variable "region" {
  type = string
}

variable "zone" {
  type = string
}

variable "env_id" {
  type = string
}

variable "credentials" {
  type = string
}

provider "google" {
  credentials = file(var.credentials)
  project     = var.project_id
  region      = var.region
}
"#;

pub const DIRECTOR_TEMPLATE: &str = r#"
resource "google_compute_network" "plinth-network" {
  name = "${var.env_id}-network"
}

resource "google_compute_subnetwork" "plinth-subnet" {
  name          = "${var.env_id}-subnet"
  ip_cidr_range = "10.0.0.0/16"
  network       = google_compute_network.plinth-network.self_link
}

resource "google_compute_address" "bosh-external-ip" {
  name = "${var.env_id}-bosh-external-ip"
}

resource "google_compute_firewall" "bosh-open" {
  name    = "${var.env_id}-bosh-open"
  network = google_compute_network.plinth-network.name

  source_ranges = ["0.0.0.0/0"]

  allow {
    ports    = ["22", "6868", "25555"]
    protocol = "tcp"
  }

  target_tags = ["${var.env_id}-bosh-open"]
}

resource "google_compute_firewall" "internal" {
  name    = "${var.env_id}-internal"
  network = google_compute_network.plinth-network.name

  source_tags = ["${var.env_id}-internal", "${var.env_id}-bosh-open"]

  allow {
    protocol = "icmp"
  }

  allow {
    protocol = "tcp"
  }

  allow {
    protocol = "udp"
  }

  target_tags = ["${var.env_id}-internal"]
}

output "external_ip" {
  value = google_compute_address.bosh-external-ip.address
}

output "network_name" {
  value = google_compute_network.plinth-network.name
}

output "subnetwork_name" {
  value = google_compute_subnetwork.plinth-subnet.name
}

output "bosh_open_tag_name" {
  value = "${var.env_id}-bosh-open"
}

output "internal_tag_name" {
  value = "${var.env_id}-internal"
}

output "director_address" {
  value = "https://${google_compute_address.bosh-external-ip.address}:25555"
}
"#;

pub const CONCOURSE_LB_TEMPLATE: &str = r#"
resource "google_compute_address" "concourse-address" {
  name = "${var.env_id}-concourse"
}

resource "google_compute_firewall" "firewall-concourse" {
  name    = "${var.env_id}-concourse-open"
  network = google_compute_network.plinth-network.name

  source_ranges = ["0.0.0.0/0"]

  allow {
    ports    = ["443", "2222"]
    protocol = "tcp"
  }

  target_tags = ["concourse"]
}

resource "google_compute_target_pool" "concourse-target-pool" {
  name = "${var.env_id}-concourse"
}

resource "google_compute_forwarding_rule" "concourse-forwarding-rule" {
  name       = "${var.env_id}-concourse"
  target     = google_compute_target_pool.concourse-target-pool.self_link
  port_range = "443"
  ip_address = google_compute_address.concourse-address.address
}

output "concourse_target_pool" {
  value = google_compute_target_pool.concourse-target-pool.name
}
"#;

pub const CF_LB_TEMPLATE: &str = r#"
variable "ssl_certificate" {
  type = string
}

variable "ssl_certificate_private_key" {
  type = string
}

variable "system_domain" {
  type = string
}

resource "google_compute_address" "cf-address" {
  name = "${var.env_id}-cf"
}

resource "google_compute_ssl_certificate" "cf-cert" {
  name_prefix = "${var.env_id}-"
  certificate = var.ssl_certificate
  private_key = var.ssl_certificate_private_key

  lifecycle {
    create_before_destroy = true
  }
}

resource "google_compute_firewall" "firewall-cf" {
  name    = "${var.env_id}-cf-open"
  network = google_compute_network.plinth-network.name

  source_ranges = ["0.0.0.0/0"]

  allow {
    ports    = ["80", "443"]
    protocol = "tcp"
  }

  target_tags = ["${var.env_id}-cf-ws"]
}

resource "google_compute_target_pool" "router-lb" {
  name = "${var.env_id}-router-lb"
}

resource "google_compute_forwarding_rule" "router-forwarding-rule" {
  name       = "${var.env_id}-router"
  target     = google_compute_target_pool.router-lb.self_link
  port_range = "443"
  ip_address = google_compute_address.cf-address.address
}

output "router_lb_ip" {
  value = google_compute_address.cf-address.address
}

output "system_domain" {
  value = var.system_domain
}
"#;

/// A selected template body plus the subset of variables the executor
/// needs beyond the identity set. Certificate material is only populated
/// when the load-balancer type requires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSelection {
    pub body: String,
    pub cert: String,
    pub key: String,
    pub domain: String,
}

pub fn select(lb: &Lb) -> TemplateSelection {
    match lb.lb_type.as_str() {
        "cf" => TemplateSelection {
            body: format!("{VARS_TEMPLATE}{DIRECTOR_TEMPLATE}{CF_LB_TEMPLATE}"),
            cert: lb.cert.clone(),
            key: lb.key.clone(),
            domain: lb.domain.clone(),
        },
        "concourse" => TemplateSelection {
            body: format!("{VARS_TEMPLATE}{DIRECTOR_TEMPLATE}{CONCOURSE_LB_TEMPLATE}"),
            cert: String::new(),
            key: String::new(),
            domain: String::new(),
        },
        _ => TemplateSelection {
            body: format!("{VARS_TEMPLATE}{DIRECTOR_TEMPLATE}"),
            cert: String::new(),
            key: String::new(),
            domain: String::new(),
        },
    }
}
