//! Protocol-wide constants for the Juno module runtime.
//!
//! This module centralizes the wire vocabulary shared with the host: field
//! names, numeric message kind tags, reserved hook names and size limits.
//! Constants are grouped by domain with documentation explaining their
//! purpose.
//!
//! # Categories
//!
//! - **Wire keys**: field names inside every frame
//! - **Message kinds**: numeric `type` tags
//! - **Reserved hooks**: activation signals sent by the host
//! - **Limits**: framing and read buffer sizes

// ============================================================================
// Wire keys
// ============================================================================

/// Field names used in the textual frame record.
pub mod keys {
    /// Numeric message kind tag.
    pub const TYPE: &str = "type";
    /// Correlation identifier of the request.
    pub const REQUEST_ID: &str = "requestId";
    /// Module identifier (registration only).
    pub const MODULE_ID: &str = "moduleId";
    /// Module version (registration only).
    pub const VERSION: &str = "version";
    /// Declared module dependencies (registration only).
    pub const DEPENDENCIES: &str = "dependencies";
    /// Error code carried by error messages.
    pub const ERROR: &str = "error";
    /// Function name.
    pub const FUNCTION: &str = "function";
    /// Hook name.
    pub const HOOK: &str = "hook";
    /// Function call arguments.
    pub const ARGUMENTS: &str = "arguments";
    /// Function result or hook payload.
    pub const DATA: &str = "data";
}

// ============================================================================
// Message kinds
// ============================================================================

/// Numeric `type` tags for each message kind.
pub mod kinds {
    /// Error reply for any request.
    pub const ERROR: u64 = 0;

    /// Module registration request.
    pub const REGISTER_MODULE_REQUEST: u64 = 1;
    /// Module registration acknowledgement.
    pub const REGISTER_MODULE_RESPONSE: u64 = 2;

    /// Function call request.
    pub const FUNCTION_CALL_REQUEST: u64 = 3;
    /// Function call result.
    pub const FUNCTION_CALL_RESPONSE: u64 = 4;

    /// Hook listener registration request.
    pub const REGISTER_HOOK_REQUEST: u64 = 5;
    /// Hook listener registration acknowledgement.
    pub const REGISTER_HOOK_RESPONSE: u64 = 6;

    /// Hook trigger request.
    pub const TRIGGER_HOOK_REQUEST: u64 = 7;
    /// Hook trigger acknowledgement.
    pub const TRIGGER_HOOK_RESPONSE: u64 = 8;

    /// Function declaration request.
    pub const DECLARE_FUNCTION_REQUEST: u64 = 9;
    /// Function declaration acknowledgement.
    pub const DECLARE_FUNCTION_RESPONSE: u64 = 10;
}

// ============================================================================
// Reserved hooks
// ============================================================================

/// Hook the host triggers once it has admitted the module.
///
/// Until this arrives every module-initiated request is held in the
/// outbound buffer.
pub const ACTIVATION_HOOK: &str = "juno.activated";

/// Hook the host triggers to suspend the module's outbound traffic.
pub const DEACTIVATION_HOOK: &str = "juno.deactivated";

// ============================================================================
// Transport & limits
// ============================================================================

/// Default path of the host's Unix domain socket, relative to the module's
/// working directory.
pub const DEFAULT_SOCKET_PATH: &str = "../juno.sock";

/// Frame terminator.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Maximum size of a single inbound frame (16 MB).
///
/// Larger frames are dropped by the line decoder rather than buffered.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the buffer used for each transport read (64 KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;
