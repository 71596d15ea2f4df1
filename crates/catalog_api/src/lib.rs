//! Album catalog request handlers.
//!
//! Handlers are plain synchronous functions over the [`store::ItemStore`]
//! seam so that they can be exercised without AWS. The Lambda binaries wire
//! them to DynamoDB through [`adapters::dynamo`].

pub mod adapters;
pub mod config;
pub mod error;
pub mod event;
pub mod expressions;
pub mod handlers;
pub mod item;
pub mod responses;
pub mod store;
pub mod telemetry;
