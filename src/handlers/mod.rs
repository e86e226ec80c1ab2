pub mod clients;
pub mod session;
pub mod token;

pub use clients::register_client;
pub use session::{login, revoke_all_sessions};
pub use token::token;
