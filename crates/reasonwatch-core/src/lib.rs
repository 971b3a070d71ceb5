//! Reasonwatch core library
//!
//! Observes streaming chat responses and infers whether the backend is idle,
//! reasoning, or emitting visible output. Hosts wrap their fetch capability
//! with [`intercept`] and subscribe to the shared [`StateMachine`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod session;
pub mod sse;
pub mod state_machine;
pub mod status;

pub use config::DetectorConfig;
pub use error::FetchError;
pub use fetch::interceptor::{intercept, InterceptedFetch, QualifyingPredicate};
pub use fetch::reqwest_fetch::ReqwestFetch;
pub use fetch::{BodyStream, Fetch, FetchRequest, FetchResponse};
pub use session::Session;
pub use state_machine::{StateMachine, Subscription};
pub use status::Status;
