//! Chat-turn business rules: daily quotas, memory extraction, canned
//! persona replies and opening greetings. Nothing in here touches storage;
//! callers pass in what they loaded and persist what comes back.

pub mod extractor;
pub mod opener;
pub mod policy;
pub mod responder;
