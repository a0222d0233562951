pub mod extractor;
pub mod gate;
pub mod jwt;
pub mod test_utils;

pub use extractor::auth_middleware;
pub use gate::{GateAction, PermissionGate, RolePermissionGate};
