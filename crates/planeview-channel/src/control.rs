//! Reserved correlation ids and error-reply kinds.

/// Correlation id of the display's bootstrap frame. Never answered.
pub const INITIALIZE_ID: &str = "initialize";

/// Error-reply kind: no handler is registered for the request's id.
pub const FAULT_UNREGISTERED_HANDLER: &str = "unregistered_handler";
/// Error-reply kind: the handler ran and reported a failure.
pub const FAULT_HANDLER_FAILED: &str = "handler_failed";
/// Error-reply kind: the request payload was not what the handler expects.
pub const FAULT_BAD_REQUEST: &str = "bad_request";

/// Returns true for ids the engine handles itself.
pub fn is_reserved(id: &str) -> bool {
    id == INITIALIZE_ID
}
