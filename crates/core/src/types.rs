/// All record identifiers are 64-bit integers.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque identifier for one live transport connection.
///
/// Distinct from the user identity: one user editing from two browser
/// tabs holds two peer ids. Created when a connection opens, never
/// persisted, invalid after the connection closes.
pub type PeerId = String;
