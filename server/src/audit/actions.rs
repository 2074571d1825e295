//! Audit action and resource names.

pub const ADMIN_LOGIN: &str = "ADMIN_LOGIN";
pub const ADMIN_LOGOUT: &str = "ADMIN_LOGOUT";
pub const ADMIN_PROFILE_VIEW: &str = "ADMIN_PROFILE_VIEW";
pub const ADMIN_FORCE_LOGOUT: &str = "ADMIN_FORCE_LOGOUT";

pub const TWO_FA_SETUP: &str = "2FA_SETUP";
pub const TWO_FA_ENABLE: &str = "2FA_ENABLE";
pub const TWO_FA_DISABLE: &str = "2FA_DISABLE";
pub const TWO_FA_CHECK: &str = "2FA_CHECK";
pub const TWO_FA_LOGIN_VERIFY: &str = "2FA_LOGIN_VERIFY";
pub const TWO_FA_LOCKOUT: &str = "2FA_LOCKOUT";

/// Role gate denial.
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
/// Second-factor gate denial.
pub const TWO_FA_REQUIRED: &str = "2FA_REQUIRED";

pub const AUDIT_LOG_VIEW: &str = "AUDIT_LOG_VIEW";
pub const SETTINGS_VIEW: &str = "SETTINGS_VIEW";
pub const SETTINGS_UPDATE: &str = "SETTINGS_UPDATE";

pub const RESOURCE_SESSION: &str = "admin_session";
pub const RESOURCE_PROFILE: &str = "admin_profile";
pub const RESOURCE_ROUTE: &str = "route";
pub const RESOURCE_AUDIT_LOG: &str = "audit_log";
pub const RESOURCE_SETTINGS: &str = "platform_settings";
