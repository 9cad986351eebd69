// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Materializing a clone: dependency replication, network rules, the clone
//! saga and label-based cleanup.

pub mod cleanup;
pub mod dependencies;
pub mod network;
pub mod saga;

pub use cleanup::purge_replicated;
pub use saga::{CloneRequest, CloneSaga, ReplicationLedger, SagaState};
