pub mod backend;
pub mod catalog;
pub mod controller;
mod deadline;
pub mod decode;
pub mod generate;
mod http;

#[cfg(test)]
mod test_server;

pub use backend::{CatalogBackend, GenerationBackend};
pub use catalog::{CatalogClient, ProgressStream};
pub use controller::ChatController;
pub use generate::{GenerateRequest, GenerationClient, TextStream};
