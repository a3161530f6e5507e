pub mod gate;
pub mod service;
pub mod storage;
pub mod store;
pub mod token;

pub use gate::{AuthGate, GateState};
pub use service::AuthService;
pub use storage::CredentialFile;
pub use store::TokenStore;
pub use token::{AuthEvent, Credentials, LogoutReason, Principal, Role};
