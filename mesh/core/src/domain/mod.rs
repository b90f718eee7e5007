// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod message;
pub mod user;
pub mod health;
pub mod workflow;
pub mod registry;
pub mod errors;
pub mod clock;
pub mod events;
pub mod mesh_config;
