pub mod consumer;
pub mod producer;
pub mod queue;
pub mod storage;
pub mod transform;
