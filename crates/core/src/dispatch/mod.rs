pub mod engine;
pub mod states;

pub use engine::{DispatchDefinition, DispatchEngine, DispatchTransitionError, TripSearchDispatch};
pub use states::{
    DispatchAction, DispatchContext, DispatchEvent, DispatchState, TransitionOutcome,
};
