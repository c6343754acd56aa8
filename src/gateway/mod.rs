//! Gateway server implementation

pub mod middleware;
mod router;
mod server;

pub use middleware::{DirectoryPrincipal, directory_middleware, token_middleware};
pub use router::{AppState, create_router};
pub use server::Gateway;
