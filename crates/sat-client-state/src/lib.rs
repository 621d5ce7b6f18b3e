//! State collaborators of the sat peer manager.
//!
//! - [`audio`]: mute/deafen/volume reducer
//! - [`permissions`]: media device discovery and permission requests
//! - [`search`]: search command vocabulary, query parsing, request params

pub mod audio;
pub mod permissions;
pub mod search;

pub use audio::{AudioAction, AudioState, MAX_VOLUME};
pub use permissions::{
    device_report, format_devices, request_permission, Device, DeviceReport, MediaEnvironment,
    MediaProbe, PermissionError, PermissionKind, RawDevice,
};
pub use search::{
    item_at_cursor, parse_query, recommend, SearchCommand, SearchCommandType, SearchError,
    SearchFilter, SearchOption, SearchOrderType, SearchParam, SearchQueryItem, SearchRecommend,
    SearchResult, SearchResultGroupType, SearchValueHas,
};
