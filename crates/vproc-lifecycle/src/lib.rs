pub mod callback;
pub mod engine;
pub mod error;

pub use callback::LifecycleCallback;
pub use engine::{LifecycleEngine, TerminalSignal};
pub use error::LifecycleError;
