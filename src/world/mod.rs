pub mod avatar;
pub mod events;

pub use avatar::{AvatarModel, AvatarOutcome, AvatarPhase};
pub use events::*;
