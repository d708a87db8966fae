mod stage;

pub use stage::{Drained, FilterOutput, FilterStage};
