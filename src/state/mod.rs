// Entity lifecycles, sensor readings and the per-tick state engine

mod engine;
mod entity;
mod machine;
mod reading;

pub use engine::{OverrideOutcome, StateEngine, TickOutcome};
pub use entity::{Entity, Phase, Transition};
pub use machine::{
    CounterRule, CounterTrigger, Degradation, Edge, EntityStateMachine, KindDefinition, LongDwell,
    ManualAction, OverrideError, PhaseLabels,
};
pub use reading::Reading;
