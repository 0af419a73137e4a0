pub mod entities;
pub mod error_codes;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use error_codes::*;
pub use errors::*;
pub use events::*;
pub use gateways::*;
pub use services::*;
pub use value_objects::*;
