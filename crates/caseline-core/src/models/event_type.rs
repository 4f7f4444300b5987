use serde::{Deserialize, Serialize};

/// Top level of the fixed event-type hierarchy. The ordinal is persisted in
/// the `base_type` column and must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseType {
    FileSystem,
    WebActivity,
    Miscellaneous,
}

impl BaseType {
    pub const ALL: [BaseType; 3] = [
        BaseType::FileSystem,
        BaseType::WebActivity,
        BaseType::Miscellaneous,
    ];

    pub fn code(self) -> i64 {
        match self {
            BaseType::FileSystem => 0,
            BaseType::WebActivity => 1,
            BaseType::Miscellaneous => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<BaseType> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BaseType::FileSystem => "File System",
            BaseType::WebActivity => "Web Activity",
            BaseType::Miscellaneous => "Misc Types",
        }
    }
}

/// Leaf of the type hierarchy. The code is persisted in the `sub_type` column
/// and must stay stable across releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    // file-system timestamps
    FileModified,
    FileAccessed,
    FileCreated,
    FileChanged,
    // web activity, derived from artifacts
    WebDownload,
    WebCookie,
    WebBookmark,
    WebHistory,
    WebSearch,
    // miscellaneous artifact-derived types
    Message,
    CallLog,
    Email,
    RecentDocument,
    InstalledProgram,
    ExifMetadata,
    DeviceAttached,
}

impl EventType {
    pub const ALL: [EventType; 16] = [
        EventType::FileModified,
        EventType::FileAccessed,
        EventType::FileCreated,
        EventType::FileChanged,
        EventType::WebDownload,
        EventType::WebCookie,
        EventType::WebBookmark,
        EventType::WebHistory,
        EventType::WebSearch,
        EventType::Message,
        EventType::CallLog,
        EventType::Email,
        EventType::RecentDocument,
        EventType::InstalledProgram,
        EventType::ExifMetadata,
        EventType::DeviceAttached,
    ];

    pub const FILE_SYSTEM: [EventType; 4] = [
        EventType::FileModified,
        EventType::FileAccessed,
        EventType::FileCreated,
        EventType::FileChanged,
    ];

    pub fn code(self) -> i64 {
        match self {
            EventType::FileModified => 0,
            EventType::FileAccessed => 1,
            EventType::FileCreated => 2,
            EventType::FileChanged => 3,
            EventType::WebDownload => 4,
            EventType::WebCookie => 5,
            EventType::WebBookmark => 6,
            EventType::WebHistory => 7,
            EventType::WebSearch => 8,
            EventType::Message => 9,
            EventType::CallLog => 10,
            EventType::Email => 11,
            EventType::RecentDocument => 12,
            EventType::InstalledProgram => 13,
            EventType::ExifMetadata => 14,
            EventType::DeviceAttached => 15,
        }
    }

    pub fn from_code(code: i64) -> Option<EventType> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn base(self) -> BaseType {
        match self {
            EventType::FileModified
            | EventType::FileAccessed
            | EventType::FileCreated
            | EventType::FileChanged => BaseType::FileSystem,
            EventType::WebDownload
            | EventType::WebCookie
            | EventType::WebBookmark
            | EventType::WebHistory
            | EventType::WebSearch => BaseType::WebActivity,
            EventType::Message
            | EventType::CallLog
            | EventType::Email
            | EventType::RecentDocument
            | EventType::InstalledProgram
            | EventType::ExifMetadata
            | EventType::DeviceAttached => BaseType::Miscellaneous,
        }
    }

    /// True for types populated from case artifacts rather than raw
    /// file-system timestamps.
    pub fn is_artifact_backed(self) -> bool {
        !Self::FILE_SYSTEM.contains(&self)
    }

    pub fn artifact_backed() -> impl Iterator<Item = EventType> {
        Self::ALL.into_iter().filter(|t| t.is_artifact_backed())
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EventType::FileModified => "File Modified",
            EventType::FileAccessed => "File Accessed",
            EventType::FileCreated => "File Created",
            EventType::FileChanged => "File Changed",
            EventType::WebDownload => "Web Downloads",
            EventType::WebCookie => "Web Cookies",
            EventType::WebBookmark => "Web Bookmarks",
            EventType::WebHistory => "Web History",
            EventType::WebSearch => "Web Searches",
            EventType::Message => "Messages",
            EventType::CallLog => "Call Log",
            EventType::Email => "Email",
            EventType::RecentDocument => "Recent Documents",
            EventType::InstalledProgram => "Installed Programs",
            EventType::ExifMetadata => "Exif Metadata",
            EventType::DeviceAttached => "Devices Attached",
        }
    }
}

/// Grouping key of counts and clusters: a base type or a sub type, picked by
/// the zoom's type detail level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeEntry {
    Base(BaseType),
    Sub(EventType),
}

impl TypeEntry {
    pub fn display_name(self) -> &'static str {
        match self {
            TypeEntry::Base(base) => base.display_name(),
            TypeEntry::Sub(sub) => sub.display_name(),
        }
    }
}
