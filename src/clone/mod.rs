// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Clone specification generation: field projection, metadata filtering and
//! PITR validation.

pub mod generator;
pub mod metadata;
pub mod pitr;
pub mod projector;

pub use generator::{clone_name, generate, RecoveryMode};
