// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvest runtime library: sitemap-driven product harvesting for a set of
//! furniture and home retailers, plus the BBB variant lookup, the Google
//! Shopping seller check and the workflow dashboard.
//!
//! This library crate exposes the core modules for the `harvest` binary and
//! for integration testing.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod cartography;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod extraction;
pub mod jobs;
pub mod output;
pub mod pipeline;
pub mod rest;
pub mod sites;
