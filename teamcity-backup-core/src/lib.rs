#![doc = "teamcity-backup-core: core workflow library for teamcity-backup."]

//! This crate holds the data model, the remote clients and the orchestration for
//! backing up a TeamCity server into an Artifactory repository.
//! CLI parsing, configuration files and logging setup live in the `teamcity-backup` crate.
//!
//! # Usage
//! Build a [`config::BackupConfig`], construct a [`teamcity::TeamCityClient`] and an
//! [`artifactory::ArtifactoryClient`] from it, and hand all three to [`backup::run_backup`].

pub mod artifactory;
pub mod backup;
pub mod checksum;
pub mod config;
pub mod contract;
pub mod error;
pub mod http;
pub mod teamcity;
