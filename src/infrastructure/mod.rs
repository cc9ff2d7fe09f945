//! Infrastructure layer - Store implementations and key management

pub mod api_key;
pub mod logging;
pub mod secrets;
pub mod storage;
