// Account table model

pub mod id;
pub mod record;
pub mod status;

pub use id::{AccountId, AccountIdError};
pub use record::{AccountRecord, AccountType};
pub use status::{AccountStatus, DecommissionState, MigrationState, StatusError};
