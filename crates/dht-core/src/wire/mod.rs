mod envelope;
pub mod error;
pub mod message;
pub mod token;

pub use error::WireError;
pub use message::{Message, Query, ResponsePayload, TransactionId};
pub use token::TokenAuthority;
