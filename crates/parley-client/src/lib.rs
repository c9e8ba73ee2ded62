//! Client side of Parley: paginated feeds kept live by gateway events, day
//! grouping for display, and mutation coordinators over the REST API.

pub mod coordinator;
pub mod feed;
pub mod flow;
pub mod http;
pub mod live;
pub mod mutations;
pub mod pagination;

pub use coordinator::{Coordinator, MutateOptions, MutationStatus};
pub use feed::{DayGroup, FeedEntry, group_by_day};
pub use flow::{ImageUpload, SendWithImage, upload_and_send};
pub use http::HttpBackend;
pub use live::LiveFeed;
pub use mutations::ChatBackend;
pub use pagination::{FeedSource, PageStatus, PaginatedFeed};
