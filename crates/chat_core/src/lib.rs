pub mod domain;
pub mod ports;
pub mod transcript;

pub use domain::{
    ChatRole, ChatSessionLog, ChatTurn, PublicProfile, SessionSummary, TurnPart, User,
    UserCredentials,
};
pub use ports::{CompletionService, DatabaseService, FragmentStream, PortError, PortResult};
