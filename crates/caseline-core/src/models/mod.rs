pub mod cluster;
pub mod event;
pub mod event_type;
pub mod interval;
pub mod tag;
pub mod zoom;

pub use cluster::{EventCluster, EventStripe};
pub use event::{CombinedEvent, EventDescriptions, KnownStatus, TimelineEvent};
pub use event_type::{BaseType, EventType, TypeEntry};
pub use interval::TimeInterval;
pub use tag::TagRecord;
pub use zoom::{DescriptionLevel, TypeDetail, ZoomGranularity, ZoomParams};
