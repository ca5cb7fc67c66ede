pub mod evaluate;
pub mod gradient;
pub mod graph;
pub mod validate;
