pub mod background;
pub mod events;
pub mod manager;
pub mod source;
pub mod state;

pub use events::{TokenEvent, TokenEvents};
pub use manager::{TokenManager, TokenSettings, TokenStatus};
pub use source::{ClientCredentialsSource, IssuedToken, TokenSource};
pub use state::{CachedToken, TokenHealth};
