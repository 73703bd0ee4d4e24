// Copyright 2025 Genmux Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Genmux CLI
//!
//! Command-line interface for the genmux dispatcher.
//!
//! The `genmux` binary either runs a dispatcher behind its HTTP API or talks
//! to a running one:
//!
//! - `genmux serve`: start a dispatcher, registering the nodes listed in a
//!   JSON manifest
//! - `genmux generate`: submit one prompt and print the JSON reply
//! - `genmux status`: print the cluster status as JSON
//!
//! ## Architecture
//!
//! Argument parsing lives in the binary (`argh`). This library holds the
//! pieces worth testing on their own: manifest loading and the small HTTP
//! client used by the client commands.

pub mod client;
pub mod manifest;

pub use client::GenmuxClient;
pub use manifest::{load_manifest, manifest_path, parse_manifest};
