pub mod data;
pub mod endpoint;
pub mod state;

pub use data::Reading;
pub use endpoint::{Endpoint, EndpointOrigin};
pub use state::ConnectionState;
