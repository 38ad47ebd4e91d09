//! Generation gateway adapters

mod http;

pub use http::HttpGenerationGateway;
