// Generation task tracking.
// The service runs generation out of band; this module observes it by polling.

pub mod poller;
