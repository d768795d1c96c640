// Remote cloud services the migration steps talk to

pub mod errors;
pub mod sandbox;
pub mod traits;
pub mod types;

pub use errors::{ApiError, ApiErrorKind, ApiResult};
pub use sandbox::{SandboxCloud, SandboxFinding, SandboxState};
pub use traits::{
    AccessAnalyzerApi, BillingApi, CloudClients, IamApi, OrganizationsApi, RegionDirectory,
    SessionProvider, SupportApi,
};
pub use types::*;
