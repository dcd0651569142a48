//! Test doubles for the provisioning workflow's collaborators.

pub mod mocks;
