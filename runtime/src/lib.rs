// Copyright 2026 Funnelscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Funnelscope runtime library: the audit workflow engine behind the
//! `funnelscope` binary.
//!
//! An audit moves through five phases: crawl a bounded part of the site,
//! score page priority, ask the owner clarifying questions, analyze the
//! priority pages, and synthesize findings. [`workflow::Conductor`] drives
//! the phases and [`store::AuditStore`] persists every step.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod analysis;
pub mod capture;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod llm;
pub mod model;
pub mod questions;
pub mod scoring;
pub mod store;
pub mod synthesis;
pub mod workflow;

pub use error::{AuditError, AuditResult};
