pub mod error;
pub mod filter;
pub mod request;
pub mod route;
pub mod score;

pub use error::RoutingError;
pub use request::RoutingRequest;
pub use route::route;
pub use score::{W_GPU, W_LATENCY, W_PRICE, W_REGION, W_RESOURCE};
