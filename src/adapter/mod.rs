//! Protocol adapters: thin projections of [`crate::core_api::CoreApi`]
//! onto the wire (spec §6). Neither adapter holds business logic — every
//! branch here is either request parsing/response shaping or a single
//! call into the Core API.

pub mod mcp;
pub mod rest;
