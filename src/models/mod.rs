pub mod user;
pub mod alert;

pub use user::UserRef;
pub use alert::{Alert, AlertCondition};
