pub mod models;
pub mod profile;
pub mod store;

pub use models::{Member, MemberMatch};
pub use store::{MemberStore, PgMemberStore, StoreError};
