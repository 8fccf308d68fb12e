//! Typed records shared by the SMTP, storage and HTTP layers.

pub mod attachment;
pub mod email;
pub mod response;
