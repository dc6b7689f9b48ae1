mod status;
mod user;

pub use status::ServiceStatus;
pub use user::User;
