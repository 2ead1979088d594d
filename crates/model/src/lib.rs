pub mod agent;
pub mod challenge;
pub mod enrollment;
pub mod error;
pub mod file;
pub mod permission;
pub mod recording;
pub mod session;
pub mod system_state;
pub mod transmission;
pub mod user;

pub use agent::{Agent, AgentStatus, AgentType, Device, FrequencyLimit};
pub use challenge::{
    Challenge, ChallengeConfig, ChallengeStatus, FrequencySpec, ManualRange, ModulationParams,
    PublicChallengeView, PublicVisibility,
};
pub use enrollment::{EnrollmentToken, ProvisioningKey};
pub use error::ModelError;
pub use file::FileRecord;
pub use permission::Permission;
pub use recording::Recording;
pub use session::Session;
pub use system_state::SystemStateKey;
pub use transmission::{Transmission, TransmissionStatus};
pub use user::User;
