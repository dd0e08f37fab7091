//! HTTP surface for job submission and observability, plus the worker
//! runtime shared with the `meridian` CLI.

pub mod auth;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod workers;
