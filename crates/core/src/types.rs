/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// ThingSpeak channel entry ids are monotonically increasing per channel.
pub type EntryId = u64;
