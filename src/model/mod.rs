// Package model provides the broker's catalog, instance and request types.

pub mod catalog;
pub mod instance;
pub mod request;


// Re-export main types
pub use catalog::{Manifest, ManifestQuery, Plan, ServiceType};
pub use instance::{
    Attributes, BindingResponse, LastOperation, LifecycleState, ServiceInstance, ID_KEY,
    MANIFEST_ID_KEY,
};
pub use request::{BindingRequest, Parameters, ServiceRequest, UnbindRequest, UpdateRequest};
