//! Resource model layer
//!
//! Structure:
//! - `resource.rs` - Normalized, immutable cluster object
//! - `owner_type.rs` - Closed owner enumeration
//! - `kinds.rs` - Scope and pod-template knowledge for built-in kinds
//! - `status.rs` - Readiness summary extraction

pub mod kinds;
mod owner_type;
mod resource;
mod status;

pub use owner_type::OwnerType;
pub use resource::{OwnerRef, RecordError, ResourceKey, ResourceRecord, resource_key};
pub use status::{ResourceStatus, extract_status, find_condition};
