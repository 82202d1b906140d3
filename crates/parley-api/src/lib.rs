pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod reactions;
pub mod routes;
pub mod typing;
pub mod users;
