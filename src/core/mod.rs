// Error modeling shared by every layer.
pub mod error;
