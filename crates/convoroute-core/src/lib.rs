//! Core types and traits for the Convoroute conversation framework

pub mod error;
pub mod message;
pub mod mock;
pub mod record;
pub mod session;
pub mod traits;

pub use error::{FlowError, Result};
pub use message::{ChatMessage, Role};
pub use mock::MockProvider;
pub use record::{CollectedData, SessionRecord};
pub use session::{
    value_present, PendingTransition, RoutePointer, RouteVisit, SessionMetadata, SessionState,
    StepPointer,
};
pub use traits::provider::{GenerateRequest, Provider, ProviderResponse, ToolCallRequest};
pub use traits::store::SessionStore;
