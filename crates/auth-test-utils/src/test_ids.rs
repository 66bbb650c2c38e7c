//! Fixed test IDs for deterministic tests
//!
//! All test IDs are deterministic to ensure reproducible test results.

// User IDs
pub const TEST_USER_ALICE: &str = "user-alice-0001";
pub const TEST_USER_BOB: &str = "user-bob-0002";
pub const TEST_USER_ADMIN: &str = "user-admin-0003";

// Zone IDs
pub const TEST_ZONE_NORTH: &str = "zone-north";
pub const TEST_ZONE_SOUTH: &str = "zone-south";

// Device IDs
pub const TEST_DEVICE_TABLET: &str = "device-tablet-01";

// Signing key IDs
pub const TEST_KEY_ID_1: &str = "test-key-2025-01";
pub const TEST_KEY_ID_2: &str = "test-key-2025-02";
pub const TEST_KEY_ID_3: &str = "test-key-2025-03";

// Secret source
pub const TEST_SECRET_ID: &str = "test/jwt-signing-keys";
pub const TEST_SECRET_SOURCE_TOKEN: &str = "test-secret-source-token-do-not-use";

// Client addresses for rate limiting
pub const TEST_CLIENT_IP_1: &str = "203.0.113.10";
pub const TEST_CLIENT_IP_2: &str = "203.0.113.20";
