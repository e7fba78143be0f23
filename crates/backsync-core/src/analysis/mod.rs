pub mod components;
pub mod deletion_plan;
pub mod dir_fingerprint;
pub mod duplicates;
pub mod sync_plan;
