// Package dispatch routes lifecycle calls to drivers and reconciles what they report.

pub mod dispatcher;
pub mod reconcile;

#[cfg(test)]
mod reconcile_test;

pub use dispatcher::{DispatcherBuilder, InstanceInfo, ResourceDispatcher};
pub use reconcile::{
    reconcile, reconcile_attributes, ResourceState, CREATED_DESCRIPTION, CREATING_DESCRIPTION,
};
