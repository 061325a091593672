//! Forward model: parameter vector → predicted magnitudes → objective.

pub mod forward;
pub mod layout;

pub use forward::{ForwardModel, MIN_DISTANCE, ModelSurfaces};
pub use layout::{
    DISTANCE_LABEL, DistanceSlot, LoggSlot, ParamLayout, Point, distance_modulus, distance_modulus_error,
};
