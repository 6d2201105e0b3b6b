// Draft editing and reconciliation.
// One controller per document kind; resume and cover letter never share state.

pub mod buffer;
pub mod controller;
pub mod export;
