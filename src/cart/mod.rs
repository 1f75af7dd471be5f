pub mod handlers;
pub mod models;
pub mod service;

pub use models::{AddItemRequest, UpdateQuantityRequest};
pub use service::CartService;
