//! Infrastructure layer: event store, dispatcher, projections, fulfillment
//! services, config, external collaborators.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod external;
pub mod fulfillment;
pub mod projections;
pub mod read_model;

#[cfg(test)]
mod integration_tests;
