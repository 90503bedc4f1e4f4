// Copyright (c) 2025 - Cowboy AI, LLC.

//! Generated schema-described binary types.
//!
//! These are the wire types compiled from `proto/agent_runtime.proto` by
//! `build.rs`. Nothing in this module is hand-written; application code
//! should go through [`crate::envelope`], [`crate::event_store`], and
//! [`crate::snapshot`], which wrap these generated types in an ergonomic,
//! invariant-checked API.

#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/agent_kernel.v1.rs"));
